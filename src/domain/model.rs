use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type ModuleId = u64;

/// 模組身分 (id + symbolic name + version)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleRef {
    pub id: ModuleId,
    pub symbolic_name: String,
    pub version: String,
}

impl ModuleRef {
    pub fn new(id: ModuleId, symbolic_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id,
            symbolic_name: symbolic_name.into(),
            version: version.into(),
        }
    }

    /// 系統模組 (id 0) 永遠不掃描
    pub fn is_system(&self) -> bool {
        self.id == 0
    }

    /// 以模組身分衍生的片段來源名稱, 例如 `org.example.api-1.0.0.bundle`
    pub fn source_name(&self, suffix: &str) -> String {
        format!("{}-{}{}", self.symbolic_name, self.version, suffix)
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} [{}]", self.symbolic_name, self.version, self.id)
    }
}

/// 模組內的一個程式碼位置; 空路徑代表模組根目錄
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeLocation {
    pub module: ModuleRef,
    pub path: String,
}

impl CodeLocation {
    pub fn new(module: ModuleRef, path: impl Into<String>) -> Self {
        Self {
            module,
            path: path.into().trim_matches('/').to_string(),
        }
    }

    pub fn root(module: ModuleRef) -> Self {
        Self {
            module,
            path: String::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// 位置內相對路徑轉成模組內的完整路徑
    pub fn entry_path(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        if self.path.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.path, relative)
        }
    }

    /// 最後一段路徑 (例如 `WEB-INF/lib/f1.jar` -> `f1.jar`)
    pub fn last_segment(&self) -> Option<&str> {
        self.path.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!/{}", self.module, self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnnotationInfo {
    pub type_name: String,
    /// `value` 元素
    #[serde(default)]
    pub values: Vec<String>,
    /// 其他具名元素, 陣列與單值都以字串列表表示
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub elements: BTreeMap<String, Vec<String>>,
}

impl AnnotationInfo {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn with_values(mut self, values: &[&str]) -> Self {
        self.values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn with_element(mut self, key: impl Into<String>, values: &[&str]) -> Self {
        self.elements
            .insert(key.into(), values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn element(&self, key: &str) -> &[String] {
        self.elements.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.element(key).first().map(String::as_str)
    }
}

/// Class inspector 產生的型別結構
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<AnnotationInfo>,
    #[serde(default)]
    pub is_annotation: bool,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn annotated(self, type_name: impl Into<String>, values: &[&str]) -> Self {
        self.with_annotation(AnnotationInfo::new(type_name).with_values(values))
    }

    pub fn with_annotation(mut self, annotation: AnnotationInfo) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn annotation_type(mut self) -> Self {
        self.is_annotation = true;
        self
    }

    /// superclass 與 interfaces, 依宣告順序
    pub fn ancestors(&self) -> impl Iterator<Item = &str> {
        self.superclass
            .iter()
            .map(String::as_str)
            .chain(self.interfaces.iter().map(String::as_str))
    }
}

/// 已載入型別的控制代碼
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeHandle {
    pub name: String,
    pub module: ModuleRef,
}

/// Ordering 列表中的一項: 具名片段或 "others"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderingEntry {
    Named(String),
    Others,
}

impl OrderingEntry {
    pub const OTHERS: &'static str = "others";
}

impl From<String> for OrderingEntry {
    fn from(value: String) -> Self {
        if value == Self::OTHERS {
            OrderingEntry::Others
        } else {
            OrderingEntry::Named(value)
        }
    }
}

impl From<OrderingEntry> for String {
    fn from(value: OrderingEntry) -> Self {
        match value {
            OrderingEntry::Named(name) => name,
            OrderingEntry::Others => OrderingEntry::OTHERS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelativeOrdering {
    pub before: Vec<OrderingEntry>,
    pub after: Vec<OrderingEntry>,
}

impl RelativeOrdering {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServletDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub url_patterns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_on_startup: Option<i32>,
    pub init_params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub url_patterns: Vec<String>,
    pub servlet_names: Vec<String>,
    pub dispatchers: Vec<String>,
    pub init_params: BTreeMap<String, String>,
}

/// 主描述檔或片段描述檔的結構化形式
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub metadata_complete: bool,
    /// None: 未宣告; Some(空): 明確停用片段
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_ordering: Option<Vec<OrderingEntry>>,
    pub ordering: RelativeOrdering,
    pub context_params: BTreeMap<String, String>,
    pub servlets: BTreeMap<String, ServletDef>,
    pub filters: BTreeMap<String, FilterDef>,
    pub listeners: Vec<String>,
    pub welcome_files: Vec<String>,
}

/// 啟動 hook 與其對應的具體型別
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookBinding {
    pub hook: TypeHandle,
    pub types: Vec<TypeHandle>,
}

/// 交給 web runtime 的完整註冊資料
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub unit: ModuleRef,
    pub context_path: String,
    pub descriptor: WebDescriptor,
    pub hooks: Vec<HookBinding>,
    pub ordered_libs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebEventPhase {
    Deploying,
    Deployed,
    Undeploying,
    Undeployed,
    Waiting,
    Failed,
}

impl fmt::Display for WebEventPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WebEventPhase::Deploying => "DEPLOYING",
            WebEventPhase::Deployed => "DEPLOYED",
            WebEventPhase::Undeploying => "UNDEPLOYING",
            WebEventPhase::Undeployed => "UNDEPLOYED",
            WebEventPhase::Waiting => "WAITING",
            WebEventPhase::Failed => "FAILED",
        };
        f.pad(s)
    }
}

/// 對觀察者發送的生命週期通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebEvent {
    pub unit_id: ModuleId,
    pub module: ModuleRef,
    pub context_path: String,
    pub phase: WebEventPhase,
    pub timestamp: DateTime<Utc>,
    pub awaiting_context: bool,
    pub collisions: Vec<ModuleId>,
    pub error: Option<String>,
}

impl WebEvent {
    pub fn new(module: &ModuleRef, context_path: &str, phase: WebEventPhase) -> Self {
        Self {
            unit_id: module.id,
            module: module.clone(),
            context_path: context_path.to_string(),
            phase,
            timestamp: Utc::now(),
            awaiting_context: false,
            collisions: Vec::new(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn awaiting_context(mut self, collisions: Vec<ModuleId>) -> Self {
        self.awaiting_context = true;
        self.collisions = collisions;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_location_paths() {
        let module = ModuleRef::new(10, "com.example.shop", "1.0.0");
        let root = CodeLocation::root(module.clone());
        assert_eq!(root.entry_path("META-INF/web-fragment.xml"), "META-INF/web-fragment.xml");
        assert_eq!(root.last_segment(), None);

        let lib = CodeLocation::new(module, "/WEB-INF/lib/f1.jar/");
        assert_eq!(lib.path, "WEB-INF/lib/f1.jar");
        assert_eq!(
            lib.entry_path("/META-INF/web-fragment.xml"),
            "WEB-INF/lib/f1.jar/META-INF/web-fragment.xml"
        );
        assert_eq!(lib.last_segment(), Some("f1.jar"));
    }

    #[test]
    fn test_ordering_entry_serde() {
        let entries: Vec<OrderingEntry> = serde_json::from_str(r#"["f1", "others"]"#).unwrap();
        assert_eq!(
            entries,
            vec![OrderingEntry::Named("f1".to_string()), OrderingEntry::Others]
        );
        assert_eq!(serde_json::to_string(&entries).unwrap(), r#"["f1","others"]"#);
    }

    #[test]
    fn test_module_source_name() {
        let module = ModuleRef::new(7, "org.example.api", "2.1.0");
        assert_eq!(module.source_name(".bundle"), "org.example.api-2.1.0.bundle");
        assert!(!module.is_system());
        assert!(ModuleRef::new(0, "system", "0").is_system());
    }
}
