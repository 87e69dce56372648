use crate::utils::error::{ExtenderError, Result};
use crate::utils::validation::{
    validate_entry_path, validate_non_empty_string, validate_positive_number, validate_range,
    Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtenderConfig {
    pub extender: ExtenderSection,
    pub class_space: ClassSpaceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtenderSection {
    /// worker pool 的寬度
    pub pool_size: usize,
    /// stop 等待進行中 allocate/deploy 的秒數
    pub gate_timeout_secs: u64,
    /// 釋放 context path 時是否重新驅動等待中的單元
    pub requeue_on_context_release: bool,
    pub event_capacity: usize,
}

impl ExtenderSection {
    pub fn gate_timeout(&self) -> Duration {
        Duration::from_secs(self.gate_timeout_secs)
    }
}

impl Default for ExtenderSection {
    fn default() -> Self {
        Self {
            pool_size: 3,
            gate_timeout_secs: 10,
            requeue_on_context_release: true,
            event_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassSpaceConfig {
    pub primary_descriptor: String,
    pub fragment_descriptor: String,
    pub hook_registration: String,
    pub interest_annotation: String,
    pub root_type: String,
    pub class_suffix: String,
    pub ignored_modules: Vec<String>,
    pub unit_fragment_name_suffix: String,
}

impl ClassSpaceConfig {
    /// 平台提供的模組不掃描
    pub fn is_ignored_module(&self, symbolic_name: &str) -> bool {
        self.ignored_modules.iter().any(|m| m == symbolic_name)
    }
}

impl Default for ClassSpaceConfig {
    fn default() -> Self {
        Self {
            primary_descriptor: "WEB-INF/web.xml".to_string(),
            fragment_descriptor: "META-INF/web-fragment.xml".to_string(),
            hook_registration: "META-INF/services/javax.servlet.ServletContainerInitializer"
                .to_string(),
            interest_annotation: "javax.servlet.annotation.HandlesTypes".to_string(),
            root_type: "java.lang.Object".to_string(),
            class_suffix: ".class".to_string(),
            ignored_modules: [
                "javax.el-api",
                "jakarta.servlet-api",
                "jakarta.annotation-api",
                "org.ops4j.pax.logging.pax-logging-api",
                "org.ops4j.pax.web.pax-web-api",
                "org.ops4j.pax.web.pax-web-spi",
                "org.ops4j.pax.web.pax-web-tomcat-common",
                "org.eclipse.jdt.core.compiler.batch",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            unit_fragment_name_suffix: ".bundle".to_string(),
        }
    }
}

impl ExtenderConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ExtenderError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ExtenderError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${WAB_POOL_SIZE})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ExtenderError::ConfigValidationError {
            field: "environment".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }
}

impl Validate for ExtenderConfig {
    fn validate(&self) -> Result<()> {
        validate_positive_number("extender.pool_size", self.extender.pool_size, 1)?;
        validate_range(
            "extender.gate_timeout_secs",
            self.extender.gate_timeout_secs,
            1,
            3600,
        )?;
        validate_positive_number("extender.event_capacity", self.extender.event_capacity, 1)?;

        let cs = &self.class_space;
        validate_entry_path("class_space.primary_descriptor", &cs.primary_descriptor)?;
        validate_entry_path("class_space.fragment_descriptor", &cs.fragment_descriptor)?;
        validate_entry_path("class_space.hook_registration", &cs.hook_registration)?;
        validate_non_empty_string("class_space.interest_annotation", &cs.interest_annotation)?;
        validate_non_empty_string("class_space.root_type", &cs.root_type)?;
        validate_non_empty_string("class_space.class_suffix", &cs.class_suffix)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ExtenderConfig::default();
        assert_eq!(config.extender.pool_size, 3);
        assert_eq!(config.extender.gate_timeout(), Duration::from_secs(10));
        assert!(config.extender.requeue_on_context_release);
        assert_eq!(config.class_space.root_type, "java.lang.Object");
        assert!(config.class_space.is_ignored_module("jakarta.servlet-api"));
        assert!(!config.class_space.is_ignored_module("com.example.shop"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_content = r#"
[extender]
pool_size = 5

[class_space]
ignored_modules = ["org.example.api"]
"#;
        let config = ExtenderConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.extender.pool_size, 5);
        assert_eq!(config.extender.gate_timeout_secs, 10);
        assert_eq!(config.class_space.ignored_modules, vec!["org.example.api"]);
        assert_eq!(config.class_space.primary_descriptor, "WEB-INF/web.xml");
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("WAB_TEST_GATE_TIMEOUT", "3");
        let toml_content = r#"
[extender]
gate_timeout_secs = ${WAB_TEST_GATE_TIMEOUT}
"#;
        let config = ExtenderConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.extender.gate_timeout_secs, 3);
        std::env::remove_var("WAB_TEST_GATE_TIMEOUT");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = ExtenderConfig::from_toml_str("[extender]\npool_size = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config =
            ExtenderConfig::from_toml_str("[class_space]\nroot_type = \"\"\n").unwrap();
        assert!(config.validate().is_err());

        assert!(ExtenderConfig::from_toml_str("[extender\n").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[extender]\nevent_capacity = 16").unwrap();
        let config = ExtenderConfig::from_file(file.path()).unwrap();
        assert_eq!(config.extender.event_capacity, 16);
    }
}
