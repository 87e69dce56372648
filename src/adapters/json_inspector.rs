use crate::domain::model::ClassInfo;
use crate::domain::ports::ClassInspector;
use crate::utils::error::{ExtenderError, Result};

/// 類別簽章以 JSON 文件表示
#[derive(Debug, Clone, Default)]
pub struct JsonClassInspector;

impl JsonClassInspector {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(class: &ClassInfo) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(class)?)
    }
}

impl ClassInspector for JsonClassInspector {
    fn inspect(&self, bytes: &[u8]) -> Result<ClassInfo> {
        let class: ClassInfo = serde_json::from_slice(bytes)
            .map_err(|e| ExtenderError::class_read("<class bytes>", e.to_string()))?;
        if class.name.trim().is_empty() {
            return Err(ExtenderError::class_read("<class bytes>", "missing type name"));
        }
        Ok(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspect_signature() {
        let class = ClassInfo::new("com.example.B")
            .extends("com.example.A")
            .implements("java.io.Serializable")
            .annotated("com.example.Marker", &[]);
        let bytes = JsonClassInspector::encode(&class).unwrap();

        let inspected = JsonClassInspector::new().inspect(&bytes).unwrap();
        assert_eq!(inspected, class);
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let inspected = JsonClassInspector::new()
            .inspect(br#"{"name": "com.example.Plain"}"#)
            .unwrap();
        assert_eq!(inspected.superclass, None);
        assert!(inspected.interfaces.is_empty());
        assert!(!inspected.is_annotation);
    }

    #[test]
    fn test_malformed_bytes() {
        let inspector = JsonClassInspector::new();
        assert!(matches!(
            inspector.inspect(b"\xCA\xFE\xBA\xBE"),
            Err(ExtenderError::ClassReadError { .. })
        ));
        assert!(inspector.inspect(br#"{"name": ""}"#).is_err());
    }
}
