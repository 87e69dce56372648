use crate::class_space::cache::{ClassCache, SignatureSource};
use crate::class_space::components::collect_component;
use crate::class_space::fragment::Fragment;
use crate::config::ClassSpaceConfig;
use crate::domain::model::{
    ClassInfo, CodeLocation, HookBinding, ModuleId, ModuleRef, TypeHandle, WebDescriptor,
};
use crate::domain::ports::{ClassInspector, ModuleSystem};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, error, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInterest {
    pub type_name: String,
    pub is_annotation: bool,
}

/// 啟動 hook 及其宣告的 types of interest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupHook {
    pub handle: TypeHandle,
    pub interests: Vec<HookInterest>,
}

impl StartupHook {
    pub fn name(&self) -> &str {
        &self.handle.name
    }
}

/// hook 與具體型別的雙向對應
#[derive(Debug, Clone, Default)]
pub struct HookInterestMap {
    hooks: Vec<StartupHook>,
    types_by_hook: BTreeMap<String, BTreeSet<TypeHandle>>,
    hooks_by_type: BTreeMap<String, BTreeSet<String>>,
}

impl HookInterestMap {
    pub fn new(hooks: Vec<StartupHook>) -> Self {
        Self {
            hooks,
            ..Default::default()
        }
    }

    pub fn bind(&mut self, hook: &str, handle: TypeHandle) {
        self.hooks_by_type
            .entry(handle.name.clone())
            .or_default()
            .insert(hook.to_string());
        self.types_by_hook
            .entry(hook.to_string())
            .or_default()
            .insert(handle);
    }

    /// 依發現順序
    pub fn hooks(&self) -> &[StartupHook] {
        &self.hooks
    }

    pub fn types_for(&self, hook: &str) -> Vec<&TypeHandle> {
        self.types_by_hook
            .get(hook)
            .map(|types| types.iter().collect())
            .unwrap_or_default()
    }

    pub fn type_names_for(&self, hook: &str) -> Vec<&str> {
        self.types_for(hook)
            .into_iter()
            .map(|t| t.name.as_str())
            .collect()
    }

    pub fn hooks_for(&self, type_name: &str) -> Vec<&str> {
        self.hooks_by_type
            .get(type_name)
            .map(|hooks| hooks.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn bindings(&self) -> Vec<HookBinding> {
        self.hooks
            .iter()
            .map(|hook| HookBinding {
                hook: hook.handle.clone(),
                types: self.types_for(hook.name()).into_iter().cloned().collect(),
            })
            .collect()
    }

    /// (結構性 interest, annotation interest): interest 型別名稱 -> hook 名稱
    fn interest_index(
        &self,
    ) -> (
        BTreeMap<String, BTreeSet<String>>,
        BTreeMap<String, BTreeSet<String>>,
    ) {
        let mut structural: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut annotations: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for hook in &self.hooks {
            for interest in &hook.interests {
                let index = if interest.is_annotation {
                    &mut annotations
                } else {
                    &mut structural
                };
                index
                    .entry(interest.type_name.clone())
                    .or_default()
                    .insert(hook.name().to_string());
            }
        }
        (structural, annotations)
    }
}

/// hook 註冊檔內容: 每行一個型別名稱, `#` 之後為註解
pub fn registration_names(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter_map(|line| {
            let name = line.split('#').next().unwrap_or("").trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// 依搜尋順序 (單元、application 模組、container 模組) 讀取祖先型別
struct ClassSpaceSignatures<'a> {
    modules: &'a dyn ModuleSystem,
    inspector: &'a dyn ClassInspector,
    search: Vec<ModuleRef>,
}

impl SignatureSource for ClassSpaceSignatures<'_> {
    fn signature(&self, type_name: &str) -> Option<ClassInfo> {
        for module in &self.search {
            match self.modules.find_class(module, type_name) {
                Ok(Some((owner, bytes))) => {
                    return match self.inspector.inspect(&bytes) {
                        Ok(class) => Some(class),
                        Err(e) => {
                            warn!("Can't read class {} from {}: {}", type_name, owner, e);
                            None
                        }
                    };
                }
                Ok(None) => continue,
                Err(e) => warn!("Can't look up class {} through {}: {}", type_name, module, e),
            }
        }
        None
    }
}

struct ScanRoot {
    location: CodeLocation,
    /// None: 主描述檔
    fragment: Option<usize>,
    components: bool,
}

pub struct HookResolver<'a> {
    modules: &'a dyn ModuleSystem,
    inspector: &'a dyn ClassInspector,
    config: &'a ClassSpaceConfig,
}

impl<'a> HookResolver<'a> {
    pub fn new(
        modules: &'a dyn ModuleSystem,
        inspector: &'a dyn ClassInspector,
        config: &'a ClassSpaceConfig,
    ) -> Self {
        Self {
            modules,
            inspector,
            config,
        }
    }

    /// 找出 hook: 先單元自己的目錄, 再依片段順序; 同名 hook 只載入第一次
    pub fn discover(&self, unit: &ModuleRef, fragments: &[Fragment]) -> Vec<StartupHook> {
        let mut seen_locations = HashSet::new();
        let mut loaded: HashSet<String> = HashSet::new();
        let mut hooks = Vec::new();

        trace!("Searching for startup hooks in {}", unit);
        for location in self.scan_roots(unit, fragments) {
            if !seen_locations.insert(location.clone()) {
                continue;
            }
            let bytes = match self
                .modules
                .read_entry(&location, &self.config.hook_registration)
            {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    warn!("  Problem reading hook registration from {}: {}", location, e);
                    continue;
                }
            };

            trace!("  Found hook registration in {}", location);
            for name in registration_names(&bytes) {
                if loaded.contains(&name) {
                    trace!("    Hook {} already loaded, skipping {}", name, location);
                    continue;
                }
                match self.modules.load_type(&location.module, &name) {
                    Ok(handle) => {
                        let interests = self.read_interests(&location.module, &name);
                        debug!(
                            "    Loaded hook {} from {} with {} type(s) of interest",
                            name,
                            handle.module,
                            interests.len()
                        );
                        loaded.insert(name);
                        hooks.push(StartupHook { handle, interests });
                    }
                    Err(e) => error!("    Problem loading hook {} from {}: {}", name, location, e),
                }
            }
        }

        hooks
    }

    /// 掃描所有片段的類別: 求出每個 hook 對應的具體型別, 並把註解宣告的
    /// servlet / filter / listener 併入所屬的描述檔
    pub fn scan_classes(
        &self,
        unit: &ModuleRef,
        main: &mut WebDescriptor,
        fragments: &mut [Fragment],
        hooks: Vec<StartupHook>,
    ) -> HookInterestMap {
        let mut map = HookInterestMap::new(hooks);
        let (structural, annotations) = map.interest_index();
        let roots = self.class_roots(unit, main, fragments);
        let components = roots.iter().any(|r| r.components);
        if structural.is_empty() && annotations.is_empty() && !components {
            debug!("No startup hook declares types of interest and no annotations are scanned, skipping class scan");
            return map;
        }

        let signatures = ClassSpaceSignatures {
            modules: self.modules,
            inspector: self.inspector,
            search: search_modules(unit, fragments),
        };
        let mut cache = ClassCache::new(&self.config.root_type, &structural, &signatures);
        let mut processed: HashSet<(ModuleId, String)> = HashSet::new();
        let mut seen_locations = HashSet::new();

        trace!("Scanning classes of {}", unit);
        for root in &roots {
            let location = &root.location;
            if !seen_locations.insert(location.clone()) {
                trace!("  Skipping {} (already scanned)", location);
                continue;
            }
            let entries = match self.modules.list_entries(location) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("  Problem listing {}: {}", location, e);
                    continue;
                }
            };

            trace!(
                "  Scanning {} ({})",
                location,
                if root.components { "annotations" } else { "hook types only" }
            );
            for entry in entries {
                if !entry.ends_with(&self.config.class_suffix) {
                    continue;
                }
                let full_path = location.entry_path(&entry);
                if !processed.insert((location.module.id, full_path.clone())) {
                    trace!("    Skipping {} (already scanned)", full_path);
                    continue;
                }
                let class = match self.read_class(location, &entry) {
                    Some(class) => class,
                    None => continue,
                };
                if !structural.is_empty() || !annotations.is_empty() {
                    self.check_class(
                        &class,
                        &location.module,
                        &mut cache,
                        !structural.is_empty(),
                        &annotations,
                        &mut map,
                    );
                }
                if root.components {
                    let descriptor = match root.fragment {
                        Some(i) => &mut fragments[i].descriptor,
                        None => &mut *main,
                    };
                    collect_component(&class, descriptor, &mut cache);
                }
            }
        }

        map
    }

    /// 單元自己的目錄寫入主描述檔, 其餘依片段順序寫入片段描述檔.
    /// metadata complete 的描述檔與 container 片段只掃描 hook 型別
    fn class_roots(
        &self,
        unit: &ModuleRef,
        main: &WebDescriptor,
        fragments: &[Fragment],
    ) -> Vec<ScanRoot> {
        let own = self
            .modules
            .class_directories(unit)
            .into_iter()
            .map(|location| ScanRoot {
                location,
                fragment: None,
                components: !main.metadata_complete,
            });
        let contributed = fragments.iter().enumerate().map(|(i, f)| ScanRoot {
            location: f.location.clone(),
            fragment: Some(i),
            components: !main.metadata_complete
                && !f.descriptor.metadata_complete
                && !f.is_container(),
        });
        own.chain(contributed).collect()
    }

    fn scan_roots(&self, unit: &ModuleRef, fragments: &[Fragment]) -> Vec<CodeLocation> {
        self.modules
            .class_directories(unit)
            .into_iter()
            .chain(fragments.iter().map(|f| f.location.clone()))
            .collect()
    }

    fn read_class(&self, location: &CodeLocation, entry: &str) -> Option<ClassInfo> {
        let bytes = match self.modules.read_entry(location, entry) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("    Can't read {}: {}", location.entry_path(entry), e);
                return None;
            }
        };
        match self.inspector.inspect(&bytes) {
            Ok(class) => {
                trace!("    Scanning {}", class.name);
                Some(class)
            }
            Err(e) => {
                warn!("    Can't read {}: {}", location.entry_path(entry), e);
                None
            }
        }
    }

    fn check_class(
        &self,
        class: &ClassInfo,
        module: &ModuleRef,
        cache: &mut ClassCache<'_>,
        structural: bool,
        annotations: &BTreeMap<String, BTreeSet<String>>,
        map: &mut HookInterestMap,
    ) {
        if class.is_annotation {
            return;
        }

        let mut loaded: Option<TypeHandle> = None;

        if structural {
            let hooks = cache.hooks_for(class);
            if !hooks.is_empty() {
                // 確定相關才載入
                let handle = match self.modules.load_type(module, &class.name) {
                    Ok(handle) => handle,
                    Err(e) => {
                        trace!("      Can't load {}: {}. Skipping", class.name, e);
                        return;
                    }
                };
                for hook in &hooks {
                    map.bind(hook, handle.clone());
                }
                loaded = Some(handle);
            }
        }

        for annotation in &class.annotations {
            let hooks = match annotations.get(&annotation.type_name) {
                Some(hooks) => hooks,
                None => continue,
            };
            let handle = match &loaded {
                Some(handle) => handle.clone(),
                None => match self.modules.load_type(module, &class.name) {
                    Ok(handle) => {
                        loaded = Some(handle.clone());
                        handle
                    }
                    Err(e) => {
                        trace!(
                            "      Can't load {} annotated with {}: {}. Skipping",
                            class.name,
                            annotation.type_name,
                            e
                        );
                        return;
                    }
                },
            };
            for hook in hooks {
                map.bind(hook, handle.clone());
            }
        }
    }

    fn read_interests(&self, module: &ModuleRef, hook_name: &str) -> Vec<HookInterest> {
        let signatures = ClassSpaceSignatures {
            modules: self.modules,
            inspector: self.inspector,
            search: vec![module.clone()],
        };
        let hook_class = match signatures.signature(hook_name) {
            Some(class) => class,
            None => return Vec::new(),
        };
        let annotation = match hook_class
            .annotations
            .iter()
            .find(|a| a.type_name == self.config.interest_annotation)
        {
            Some(annotation) => annotation,
            None => return Vec::new(),
        };

        annotation
            .values
            .iter()
            .map(|value| {
                let is_annotation = match signatures.signature(value) {
                    Some(class) => class.is_annotation,
                    None => {
                        debug!(
                            "      Type {} of interest to {} is not visible, no type can match it",
                            value, hook_name
                        );
                        false
                    }
                };
                HookInterest {
                    type_name: value.clone(),
                    is_annotation,
                }
            })
            .collect()
    }
}

/// 單元優先, 其後依片段順序 (application 在 container 之前)
fn search_modules(unit: &ModuleRef, fragments: &[Fragment]) -> Vec<ModuleRef> {
    let mut seen = HashSet::new();
    seen.insert(unit.id);
    let mut modules = vec![unit.clone()];
    for fragment in fragments {
        if seen.insert(fragment.location.module.id) {
            modules.push(fragment.location.module.clone());
        }
    }
    modules
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(name: &str) -> TypeHandle {
        TypeHandle {
            name: name.to_string(),
            module: ModuleRef::new(10, "com.example.shop", "1.0.0"),
        }
    }

    #[test]
    fn test_registration_names_strip_comments() {
        let content = b"# hooks\ncom.example.FirstHook\n  com.example.SecondHook # trailing\n\n#com.example.Disabled\n";
        assert_eq!(
            registration_names(content),
            vec!["com.example.FirstHook", "com.example.SecondHook"]
        );
    }

    #[test]
    fn test_interest_map_is_bidirectional() {
        let hooks = vec![
            StartupHook {
                handle: handle("HookA"),
                interests: vec![HookInterest {
                    type_name: "A".to_string(),
                    is_annotation: false,
                }],
            },
            StartupHook {
                handle: handle("HookB"),
                interests: vec![HookInterest {
                    type_name: "Marker".to_string(),
                    is_annotation: true,
                }],
            },
        ];
        let mut map = HookInterestMap::new(hooks);
        map.bind("HookA", handle("B"));
        map.bind("HookA", handle("C"));
        map.bind("HookB", handle("C"));

        assert_eq!(map.type_names_for("HookA"), vec!["B", "C"]);
        assert_eq!(map.hooks_for("C"), vec!["HookA", "HookB"]);
        assert!(map.types_for("Unknown").is_empty());

        let bindings = map.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[1].types, vec![handle("C")]);

        let (structural, annotations) = map.interest_index();
        assert!(structural.contains_key("A"));
        assert!(annotations.contains_key("Marker"));
    }
}
