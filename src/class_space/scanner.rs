use crate::class_space::fragment::{Fragment, FragmentOrigin, FragmentSet};
use crate::class_space::ordering::OrderingDirective;
use crate::config::ClassSpaceConfig;
use crate::domain::model::{CodeLocation, ModuleId, ModuleRef, WebDescriptor};
use crate::domain::ports::{DescriptorEngine, ModuleSystem};
use crate::utils::error::Result;
use std::collections::{HashSet, VecDeque};
use tracing::{trace, warn};

/// 走訪單元的所有程式碼來源, 產生片段
pub struct FragmentScanner<'a> {
    modules: &'a dyn ModuleSystem,
    engine: &'a dyn DescriptorEngine,
    config: &'a ClassSpaceConfig,
}

impl<'a> FragmentScanner<'a> {
    pub fn new(
        modules: &'a dyn ModuleSystem,
        engine: &'a dyn DescriptorEngine,
        config: &'a ClassSpaceConfig,
    ) -> Self {
        Self {
            modules,
            engine,
            config,
        }
    }

    /// 依發現順序回傳片段: 內嵌函式庫、附掛 fragment、可達模組
    pub fn scan(&self, unit: &ModuleRef, directive: &OrderingDirective) -> Result<Vec<Fragment>> {
        let parse_required = directive.parse_required();
        let mut fragments = FragmentSet::new();

        // 1) 內嵌函式庫
        trace!("Searching for web fragments in embedded libraries of {}", unit);
        for location in self.modules.embedded_libraries(unit) {
            let source_name = location
                .last_segment()
                .map(str::to_string)
                .unwrap_or_else(|| location.to_string());
            trace!("  Scanning embedded library {}", location);
            if let Some(fragment) = self.process_location(
                location,
                source_name,
                FragmentOrigin::OwnPackage,
                parse_required,
            ) {
                fragments.add(fragment)?;
            }
        }

        // 2) 附掛在單元上的 fragment 模組
        trace!("Searching for web fragments in attached modules of {}", unit);
        for attached in self.modules.attached_fragments(unit) {
            if !self.modules.is_fragment_of(&attached, unit) {
                warn!("  Module {} is not attached to {}, skipping", attached, unit);
                continue;
            }
            trace!("  Scanning attached module {}", attached);
            let source_name = attached.source_name(&self.config.unit_fragment_name_suffix);
            let location = self.modules.root(&attached);
            if let Some(fragment) = self.process_location(
                location,
                source_name,
                FragmentOrigin::OwnPackage,
                parse_required,
            ) {
                fragments.add(fragment)?;
            }
        }

        // 3) 可達模組 (不含單元本身)
        trace!("Searching for web fragments in modules reachable from {}", unit);
        let mut processed: HashSet<ModuleId> = HashSet::new();
        processed.insert(unit.id);
        let mut queue: VecDeque<ModuleRef> = VecDeque::new();
        queue.push_back(unit.clone());

        while let Some(module) = queue.pop_front() {
            if module.is_system() || self.config.is_ignored_module(&module.symbolic_name) {
                trace!("  Skipping platform module {}", module);
                continue;
            }

            for next in self.modules.reachable_modules(&module) {
                if !processed.contains(&next.id) && self.modules.fragment_host(&next).is_none() {
                    queue.push_back(next);
                }
            }

            if !processed.insert(module.id) {
                continue;
            }

            trace!("  Scanning reachable module {}", module);
            if let Some(fragment) = self.process_module(&module, parse_required) {
                fragments.add(fragment)?;
            }
        }

        Ok(fragments.into_vec())
    }

    /// 內嵌函式庫或附掛模組; 沒有描述檔時仍是 application 片段
    fn process_location(
        &self,
        location: CodeLocation,
        source_name: String,
        origin: FragmentOrigin,
        parse_required: bool,
    ) -> Option<Fragment> {
        if !parse_required {
            return Some(Fragment::synthetic(source_name, origin, location));
        }

        match self.read_descriptor(&location, &source_name) {
            Ok(Some(descriptor)) => {
                let fragment = Fragment::with_descriptor(source_name, origin, location, descriptor);
                trace!(
                    "    Found web fragment with descriptor, name: {}, source: {}",
                    fragment.name,
                    fragment.source_name
                );
                Some(fragment)
            }
            Ok(None) => {
                trace!("    Found web fragment without descriptor, source: {}", source_name);
                Some(Fragment::synthetic(source_name, origin, location))
            }
            Err(e) => {
                warn!("  Problem scanning {}: {}", location, e);
                None
            }
        }
    }

    /// 可達模組: 有描述檔為 application 片段, 否則為 container 片段
    fn process_module(&self, module: &ModuleRef, parse_required: bool) -> Option<Fragment> {
        let source_name = module.source_name(&self.config.unit_fragment_name_suffix);
        let location = self.modules.root(module);

        let descriptor = if parse_required {
            match self.read_descriptor(&location, &source_name) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!("  Problem scanning reachable module {}: {}", module, e);
                    return None;
                }
            }
        } else {
            None
        };

        match descriptor {
            Some(descriptor) => Some(Fragment::with_descriptor(
                source_name,
                FragmentOrigin::ReachableModule,
                location,
                descriptor,
            )),
            None => {
                trace!("    Found container fragment {}", source_name);
                Some(Fragment::synthetic(
                    source_name,
                    FragmentOrigin::ReachableModule,
                    location,
                ))
            }
        }
    }

    fn read_descriptor(
        &self,
        location: &CodeLocation,
        source_name: &str,
    ) -> Result<Option<WebDescriptor>> {
        match self
            .modules
            .read_entry(location, &self.config.fragment_descriptor)?
        {
            Some(bytes) => Ok(Some(self.engine.parse(source_name, &bytes)?)),
            None => Ok(None),
        }
    }
}
