//! Class space resolution of a web application unit: fragment discovery, fragment ordering,
//! annotated component discovery, descriptor merging and startup hook resolution.

pub mod cache;
pub mod components;
pub mod fragment;
pub mod hooks;
pub mod ordering;
pub mod scanner;

use crate::config::ClassSpaceConfig;
use crate::domain::model::{ModuleRef, Registration, WebDescriptor};
use crate::domain::ports::{ClassInspector, DescriptorEngine, ModuleSystem};
use crate::utils::error::Result;
use std::sync::Arc;
use tracing::{debug, info, trace};

pub use fragment::{Fragment, FragmentKind, FragmentOrigin, FragmentSet};
pub use hooks::{HookInterest, HookInterestMap, HookResolver, StartupHook};
pub use ordering::{order_fragments, OrderedFragments, OrderingDirective};
pub use scanner::FragmentScanner;

/// 一次解析的結果
#[derive(Debug, Clone)]
pub struct ResolvedClassSpace {
    pub descriptor: WebDescriptor,
    /// 最終片段順序 (名稱)
    pub fragment_order: Vec<String>,
    pub ordered_libs: Option<Vec<String>>,
    pub hooks: HookInterestMap,
}

impl ResolvedClassSpace {
    pub fn registration(&self, unit: &ModuleRef, context_path: &str) -> Registration {
        Registration {
            unit: unit.clone(),
            context_path: context_path.to_string(),
            descriptor: self.descriptor.clone(),
            hooks: self.hooks.bindings(),
            ordered_libs: self.ordered_libs.clone(),
        }
    }
}

pub struct ClassSpaceResolver {
    modules: Arc<dyn ModuleSystem>,
    engine: Arc<dyn DescriptorEngine>,
    inspector: Arc<dyn ClassInspector>,
    config: ClassSpaceConfig,
}

impl ClassSpaceResolver {
    pub fn new(
        modules: Arc<dyn ModuleSystem>,
        engine: Arc<dyn DescriptorEngine>,
        inspector: Arc<dyn ClassInspector>,
        config: ClassSpaceConfig,
    ) -> Self {
        Self {
            modules,
            engine,
            inspector,
            config,
        }
    }

    pub fn config(&self) -> &ClassSpaceConfig {
        &self.config
    }

    /// 讀取主描述檔; 不存在時使用空描述檔
    pub fn primary_descriptor(&self, unit: &ModuleRef) -> Result<WebDescriptor> {
        let root = self.modules.root(unit);
        match self
            .modules
            .read_entry(&root, &self.config.primary_descriptor)?
        {
            Some(bytes) => self.engine.parse(&self.config.primary_descriptor, &bytes),
            None => {
                debug!("{} has no {}", unit, self.config.primary_descriptor);
                Ok(WebDescriptor::default())
            }
        }
    }

    pub fn resolve(&self, unit: &ModuleRef) -> Result<ResolvedClassSpace> {
        let mut main = self.primary_descriptor(unit)?;
        let directive = OrderingDirective::from_descriptor(&main);
        trace!("Ordering directive of {}: {:?}", unit, directive);

        let scanner = FragmentScanner::new(
            self.modules.as_ref(),
            self.engine.as_ref(),
            &self.config,
        );
        let fragments = scanner.scan(unit, &directive)?;
        let mut ordered = order_fragments(&directive, fragments)?;
        debug!("Ordered fragments of {}: {:?}", unit, ordered.names());

        let resolver = HookResolver::new(
            self.modules.as_ref(),
            self.inspector.as_ref(),
            &self.config,
        );
        let hooks = resolver.discover(unit, &ordered.fragments);
        // 註解元件要先併入各描述檔才能合併
        let hooks = resolver.scan_classes(unit, &mut main, &mut ordered.fragments, hooks);

        let descriptor = self.merge(&main, &ordered.fragments)?;
        info!(
            "Resolved class space of {}: {} fragment(s), {} startup hook(s)",
            unit,
            ordered.fragments.len(),
            hooks.hooks().len()
        );

        Ok(ResolvedClassSpace {
            descriptor,
            fragment_order: ordered.names().into_iter().map(str::to_string).collect(),
            ordered_libs: ordered.ordered_libs,
            hooks,
        })
    }

    /// 前面的片段優先於後面的片段, 主描述檔最後套用且優先
    fn merge(&self, main: &WebDescriptor, fragments: &[Fragment]) -> Result<WebDescriptor> {
        if main.metadata_complete {
            debug!("Primary descriptor is metadata complete, fragment descriptors are not merged");
            return Ok(main.clone());
        }

        let mut merged = WebDescriptor {
            metadata_complete: main.metadata_complete,
            absolute_ordering: main.absolute_ordering.clone(),
            ordering: main.ordering.clone(),
            ..Default::default()
        };
        for fragment in fragments.iter().rev().filter(|f| !f.is_container()) {
            trace!("  Merging fragment {}", fragment.name);
            // 片段自己的名稱與排序不進入合併結果
            let contribution = WebDescriptor {
                name: None,
                absolute_ordering: None,
                ordering: Default::default(),
                ..fragment.descriptor.clone()
            };
            merged = self.engine.merge(&merged, &contribution)?;
        }
        self.engine.merge(&merged, main)
    }
}
