use crate::adapters::json_inspector::JsonClassInspector;
use crate::domain::model::{ClassInfo, CodeLocation, ModuleId, ModuleRef, TypeHandle};
use crate::domain::ports::ModuleSystem;
use crate::utils::error::{ExtenderError, Result};
use crate::utils::validation::{validate_context_path, validate_required_field};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// 模組配置檔的格式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleLayout {
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub id: ModuleId,
    pub symbolic_name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// 是否作為 web application 部署
    #[serde(default)]
    pub deploy: bool,
    #[serde(default)]
    pub context_path: Option<String>,
    #[serde(default)]
    pub fragment_host: Option<ModuleId>,
    /// 直接連線的模組 id
    #[serde(default)]
    pub wires: Vec<ModuleId>,
    #[serde(default = "default_class_directories")]
    pub class_directories: Vec<String>,
    #[serde(default)]
    pub embedded_libraries: Vec<String>,
    /// 路徑 -> 內容
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
    #[serde(default)]
    pub classes: Vec<ClassSpec>,
    /// 可以讀到位元組但無法載入的型別
    #[serde(default)]
    pub unloadable: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSpec {
    /// 類別所在的位置 (class 目錄或內嵌函式庫), 空字串為模組根目錄
    #[serde(default)]
    pub location: String,
    #[serde(flatten)]
    pub class: ClassInfo,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

fn default_class_directories() -> Vec<String> {
    vec![String::new()]
}

impl ModuleSpec {
    pub fn new(id: ModuleId, symbolic_name: impl Into<String>) -> Self {
        Self {
            id,
            symbolic_name: symbolic_name.into(),
            version: default_version(),
            deploy: false,
            context_path: None,
            fragment_host: None,
            wires: Vec::new(),
            class_directories: default_class_directories(),
            embedded_libraries: Vec::new(),
            entries: BTreeMap::new(),
            classes: Vec::new(),
            unloadable: Vec::new(),
        }
    }

    pub fn web_application(mut self, context_path: impl Into<String>) -> Self {
        self.deploy = true;
        self.context_path = Some(context_path.into());
        self.class_directories = vec!["WEB-INF/classes".to_string()];
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn wired_to(mut self, ids: &[ModuleId]) -> Self {
        self.wires.extend_from_slice(ids);
        self
    }

    pub fn attached_to(mut self, host: ModuleId) -> Self {
        self.fragment_host = Some(host);
        self
    }

    pub fn with_embedded_library(mut self, path: impl Into<String>) -> Self {
        self.embedded_libraries.push(path.into());
        self
    }

    pub fn with_entry(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.entries.insert(path.into(), content.into());
        self
    }

    pub fn with_class(mut self, location: impl Into<String>, class: ClassInfo) -> Self {
        self.classes.push(ClassSpec {
            location: location.into(),
            class,
        });
        self
    }

    pub fn unloadable(mut self, type_name: impl Into<String>) -> Self {
        self.unloadable.push(type_name.into());
        self
    }

    fn module_ref(&self) -> ModuleRef {
        ModuleRef::new(self.id, self.symbolic_name.clone(), self.version.clone())
    }
}

#[derive(Debug, Clone)]
struct ModuleData {
    module: ModuleRef,
    fragment_host: Option<ModuleId>,
    wires: Vec<ModuleId>,
    class_directories: Vec<String>,
    embedded_libraries: Vec<String>,
    entries: BTreeMap<String, Vec<u8>>,
    unloadable: BTreeSet<String>,
    deploy: bool,
    context_path: Option<String>,
}

impl ModuleData {
    fn class_path(&self) -> impl Iterator<Item = CodeLocation> + '_ {
        self.class_directories
            .iter()
            .chain(self.embedded_libraries.iter())
            .map(move |p| CodeLocation::new(self.module.clone(), p.as_str()))
    }
}

/// 記憶體內的模組系統, 由 [`ModuleLayout`] 建立
#[derive(Debug, Clone, Default)]
pub struct InMemoryModuleSystem {
    modules: BTreeMap<ModuleId, ModuleData>,
}

pub fn class_entry_path(type_name: &str) -> String {
    format!("{}.class", type_name.replace('.', "/"))
}

impl InMemoryModuleSystem {
    pub fn from_layout(layout: ModuleLayout) -> Result<Self> {
        let mut modules = BTreeMap::new();

        for spec in layout.modules {
            let module = spec.module_ref();
            let mut entries: BTreeMap<String, Vec<u8>> = spec
                .entries
                .iter()
                .map(|(path, content)| (path.trim_start_matches('/').to_string(), content.as_bytes().to_vec()))
                .collect();
            for class in &spec.classes {
                let location = CodeLocation::new(module.clone(), class.location.as_str());
                let path = location.entry_path(&class_entry_path(&class.class.name));
                entries.insert(path, JsonClassInspector::encode(&class.class)?);
            }

            let data = ModuleData {
                module,
                fragment_host: spec.fragment_host,
                wires: spec.wires.clone(),
                class_directories: spec.class_directories.clone(),
                embedded_libraries: spec.embedded_libraries.clone(),
                entries,
                unloadable: spec.unloadable.iter().cloned().collect(),
                deploy: spec.deploy,
                context_path: spec.context_path.clone(),
            };
            if modules.insert(spec.id, data).is_some() {
                return Err(ExtenderError::module(format!("Duplicate module id {}", spec.id)));
            }
        }

        for data in modules.values() {
            if let Some(host) = data.fragment_host {
                if !modules.contains_key(&host) {
                    return Err(ExtenderError::module(format!(
                        "Module {} is attached to unknown host {}",
                        data.module, host
                    )));
                }
            }
            if data.deploy {
                let field = format!("modules.{}.context_path", data.module.id);
                let path = validate_required_field(&field, &data.context_path)?;
                validate_context_path(&field, path)?;
            }
        }

        Ok(Self { modules })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let layout: ModuleLayout = toml::from_str(content)?;
        Self::from_layout(layout)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn module(&self, id: ModuleId) -> Option<ModuleRef> {
        self.modules.get(&id).map(|d| d.module.clone())
    }

    /// 標記為部署的單元及其 context path, 依 id 排序
    pub fn deployable_units(&self) -> Vec<(ModuleRef, String)> {
        self.modules
            .values()
            .filter(|d| d.deploy)
            .filter_map(|d| d.context_path.clone().map(|p| (d.module.clone(), p)))
            .collect()
    }

    fn data(&self, module: &ModuleRef) -> Result<&ModuleData> {
        self.modules
            .get(&module.id)
            .ok_or_else(|| ExtenderError::module(format!("Unknown module {}", module)))
    }

    fn attached(&self, host: ModuleId) -> impl Iterator<Item = &ModuleData> + '_ {
        self.modules
            .values()
            .filter(move |d| d.fragment_host == Some(host))
    }

    fn find_in(data: &ModuleData, type_name: &str) -> Option<Vec<u8>> {
        let relative = class_entry_path(type_name);
        data.class_path()
            .find_map(|location| data.entries.get(&location.entry_path(&relative)).cloned())
    }
}

impl ModuleSystem for InMemoryModuleSystem {
    fn class_directories(&self, unit: &ModuleRef) -> Vec<CodeLocation> {
        self.modules
            .get(&unit.id)
            .map(|d| {
                d.class_directories
                    .iter()
                    .map(|p| CodeLocation::new(d.module.clone(), p.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn embedded_libraries(&self, unit: &ModuleRef) -> Vec<CodeLocation> {
        self.modules
            .get(&unit.id)
            .map(|d| {
                d.embedded_libraries
                    .iter()
                    .map(|p| CodeLocation::new(d.module.clone(), p.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn attached_fragments(&self, host: &ModuleRef) -> Vec<ModuleRef> {
        self.attached(host.id).map(|d| d.module.clone()).collect()
    }

    fn reachable_modules(&self, module: &ModuleRef) -> Vec<ModuleRef> {
        self.modules
            .get(&module.id)
            .map(|d| {
                d.wires
                    .iter()
                    .filter_map(|id| self.modules.get(id).map(|w| w.module.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn fragment_host(&self, module: &ModuleRef) -> Option<ModuleRef> {
        self.modules
            .get(&module.id)
            .and_then(|d| d.fragment_host)
            .and_then(|host| self.module(host))
    }

    fn list_entries(&self, location: &CodeLocation) -> Result<Vec<String>> {
        let data = self.data(&location.module)?;
        if location.is_root() {
            return Ok(data.entries.keys().cloned().collect());
        }
        let prefix = format!("{}/", location.path);
        Ok(data
            .entries
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    fn read_entry(&self, location: &CodeLocation, path: &str) -> Result<Option<Vec<u8>>> {
        let data = self.data(&location.module)?;
        Ok(data.entries.get(&location.entry_path(path)).cloned())
    }

    fn find_class(&self, from: &ModuleRef, type_name: &str) -> Result<Option<(ModuleRef, Vec<u8>)>> {
        let data = self.data(from)?;

        // 自己、附掛 fragment、直接連線的模組
        if let Some(bytes) = Self::find_in(data, type_name) {
            return Ok(Some((data.module.clone(), bytes)));
        }
        for attached in self.attached(data.module.id) {
            if let Some(bytes) = Self::find_in(attached, type_name) {
                return Ok(Some((attached.module.clone(), bytes)));
            }
        }
        for wired in data.wires.iter().filter_map(|id| self.modules.get(id)) {
            if let Some(bytes) = Self::find_in(wired, type_name) {
                return Ok(Some((wired.module.clone(), bytes)));
            }
        }
        Ok(None)
    }

    fn load_type(&self, module: &ModuleRef, type_name: &str) -> Result<TypeHandle> {
        let not_found = || ExtenderError::TypeNotFound {
            module: module.to_string(),
            type_name: type_name.to_string(),
        };
        let (owner, _) = self.find_class(module, type_name)?.ok_or_else(not_found)?;
        let owner_data = self.data(&owner)?;
        if owner_data.unloadable.contains(type_name) {
            return Err(not_found());
        }
        Ok(TypeHandle {
            name: type_name.to_string(),
            module: owner,
        })
    }
}
