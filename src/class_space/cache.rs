use crate::domain::model::ClassInfo;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::trace;

/// 依型別名稱取得型別結構 (找不到時回傳 None)
pub trait SignatureSource {
    fn signature(&self, type_name: &str) -> Option<ClassInfo>;
}

/// 單一型別的快取: 祖先名稱與遞移相關的 hook
#[derive(Debug, Clone)]
pub struct ClassCacheEntry {
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    /// None 代表尚未計算; 計算後即凍結
    pub hooks: Option<BTreeSet<String>>,
}

impl ClassCacheEntry {
    fn ancestors(&self) -> Vec<String> {
        self.superclass
            .iter()
            .chain(self.interfaces.iter())
            .cloned()
            .collect()
    }
}

/// 一次解析期間的型別階層快取, 以根型別 (預先放入) 終止遞迴
pub struct ClassCache<'a> {
    entries: HashMap<String, ClassCacheEntry>,
    /// 結構性 interest: 型別名稱 -> 對其有興趣的 hook
    interests: &'a BTreeMap<String, BTreeSet<String>>,
    source: &'a dyn SignatureSource,
}

impl<'a> ClassCache<'a> {
    pub fn new(
        root_type: &str,
        interests: &'a BTreeMap<String, BTreeSet<String>>,
        source: &'a dyn SignatureSource,
    ) -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            root_type.to_string(),
            ClassCacheEntry {
                superclass: None,
                interfaces: Vec::new(),
                hooks: Some(BTreeSet::new()),
            },
        );
        Self {
            entries,
            interests,
            source,
        }
    }

    /// 掃描到的型別: 放入快取並回傳遞移相關的 hook
    pub fn hooks_for(&mut self, class: &ClassInfo) -> BTreeSet<String> {
        self.add_class(class);
        self.configure(&class.name)
    }

    /// 放入快取 (連同可見的祖先), 不計算 hook
    pub fn add(&mut self, class: &ClassInfo) {
        self.add_class(class);
    }

    /// 沿快取中的 superclass 鏈尋找; 鏈在不可見的型別處中斷
    pub fn extends(&self, type_name: &str, superclass: &str) -> bool {
        let mut current = self
            .entries
            .get(type_name)
            .and_then(|e| e.superclass.as_deref());
        // 最多走過所有快取項目, 階層有環時也能結束
        for _ in 0..=self.entries.len() {
            match current {
                Some(name) if name == superclass => return true,
                Some(name) => {
                    current = self.entries.get(name).and_then(|e| e.superclass.as_deref())
                }
                None => return false,
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn add_class(&mut self, class: &ClassInfo) {
        if self.entries.contains_key(&class.name) {
            return;
        }
        let entry = ClassCacheEntry {
            superclass: class.superclass.clone(),
            interfaces: class.interfaces.clone(),
            hooks: None,
        };
        let ancestors = entry.ancestors();
        self.entries.insert(class.name.clone(), entry);

        for name in &ancestors {
            self.add_by_name(name);
        }
    }

    fn add_by_name(&mut self, type_name: &str) {
        if self.entries.contains_key(type_name) {
            return;
        }
        match self.source.signature(type_name) {
            Some(class) => {
                trace!("      Caching ancestor {}", type_name);
                self.add_class(&class);
            }
            None => trace!("      Ancestor {} is not visible", type_name),
        }
    }

    fn configure(&mut self, type_name: &str) -> BTreeSet<String> {
        let ancestors = match self.entries.get_mut(type_name) {
            Some(entry) => {
                if let Some(hooks) = &entry.hooks {
                    return hooks.clone();
                }
                // 先放空集合, 階層若有環也能終止
                entry.hooks = Some(BTreeSet::new());
                entry.ancestors()
            }
            None => return BTreeSet::new(),
        };

        // 只有可見 (已放入快取) 的祖先才算數
        let mut result = BTreeSet::new();
        for ancestor in &ancestors {
            if !self.entries.contains_key(ancestor) {
                continue;
            }
            result.extend(self.configure(ancestor));
            if let Some(hooks) = self.interests.get(ancestor) {
                result.extend(hooks.iter().cloned());
            }
        }

        if let Some(entry) = self.entries.get_mut(type_name) {
            entry.hooks = Some(result.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct MapSource {
        classes: HashMap<String, ClassInfo>,
        requests: RefCell<Vec<String>>,
    }

    impl MapSource {
        fn with_class(mut self, class: ClassInfo) -> Self {
            self.classes.insert(class.name.clone(), class);
            self
        }
    }

    impl SignatureSource for MapSource {
        fn signature(&self, type_name: &str) -> Option<ClassInfo> {
            self.requests.borrow_mut().push(type_name.to_string());
            self.classes.get(type_name).cloned()
        }
    }

    fn interests(pairs: &[(&str, &str)]) -> BTreeMap<String, BTreeSet<String>> {
        let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (interest, hook) in pairs {
            map.entry(interest.to_string())
                .or_default()
                .insert(hook.to_string());
        }
        map
    }

    #[test]
    fn test_transitive_superclass_closure() {
        let source = MapSource::default().with_class(ClassInfo::new("A").extends("java.lang.Object"));
        let interests = interests(&[("A", "HookA")]);
        let mut cache = ClassCache::new("java.lang.Object", &interests, &source);

        let b = ClassInfo::new("B").extends("A");
        let hooks = cache.hooks_for(&b);

        assert_eq!(hooks.into_iter().collect::<Vec<_>>(), vec!["HookA"]);
        // 根型別已預先放入, 不再向外載入
        assert_eq!(*source.requests.borrow(), vec!["A".to_string()]);
    }

    #[test]
    fn test_interfaces_of_ancestors() {
        let source = MapSource::default()
            .with_class(ClassInfo::new("Impl1").extends("java.lang.Object").implements("Iface1"))
            .with_class(ClassInfo::new("Iface1"))
            .with_class(ClassInfo::new("Iface2"));
        let interests = interests(&[("Iface1", "Hook1"), ("Iface2", "Hook2")]);
        let mut cache = ClassCache::new("java.lang.Object", &interests, &source);

        let impl2 = ClassInfo::new("Impl2").extends("Impl1").implements("Iface2");
        let hooks: Vec<String> = cache.hooks_for(&impl2).into_iter().collect();
        assert_eq!(hooks, vec!["Hook1", "Hook2"]);

        let impl1 = source.classes["Impl1"].clone();
        let hooks: Vec<String> = cache.hooks_for(&impl1).into_iter().collect();
        assert_eq!(hooks, vec!["Hook1"]);
    }

    #[test]
    fn test_invisible_ancestor_is_not_matched() {
        let source = MapSource::default().with_class(ClassInfo::new("javax.servlet.Filter"));
        let interests = interests(&[
            ("javax.servlet.Servlet", "ServletHook"),
            ("javax.servlet.Filter", "FilterHook"),
        ]);
        let mut cache = ClassCache::new("java.lang.Object", &interests, &source);

        let class = ClassInfo::new("com.example.MyComponent")
            .extends("java.lang.Object")
            .implements("javax.servlet.Servlet")
            .implements("javax.servlet.Filter");
        let hooks: Vec<String> = cache.hooks_for(&class).into_iter().collect();
        assert_eq!(hooks, vec!["FilterHook"]);
    }

    #[test]
    fn test_extends_walks_cached_superclasses() {
        let source = MapSource::default()
            .with_class(ClassInfo::new("com.example.BaseServlet").extends("javax.servlet.http.HttpServlet"));
        let interests = interests(&[]);
        let mut cache = ClassCache::new("java.lang.Object", &interests, &source);

        let servlet = ClassInfo::new("com.example.ShopServlet").extends("com.example.BaseServlet");
        cache.add(&servlet);
        assert!(cache.extends("com.example.ShopServlet", "javax.servlet.http.HttpServlet"));
        assert!(!cache.extends("com.example.ShopServlet", "com.example.Other"));

        let detached = ClassInfo::new("com.example.Detached").extends("com.example.Missing");
        cache.add(&detached);
        assert!(!cache.extends("com.example.Detached", "javax.servlet.http.HttpServlet"));
    }

    #[test]
    fn test_cycle_terminates() {
        let source = MapSource::default()
            .with_class(ClassInfo::new("X").extends("Y"))
            .with_class(ClassInfo::new("Y").extends("X"));
        let interests = interests(&[("Y", "HookY")]);
        let mut cache = ClassCache::new("java.lang.Object", &interests, &source);

        let x = source.classes["X"].clone();
        assert!(cache.hooks_for(&x).contains("HookY"));
        assert_eq!(cache.len(), 3);
    }
}
