use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtenderError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Descriptor parse error in {source_name}: {message}")]
    ParseError { source_name: String, message: String },

    #[error("Class read error in {source_name}: {message}")]
    ClassReadError { source_name: String, message: String },

    #[error("Conflict: {message}")]
    ConflictError { message: String },

    #[error("Module error: {message}")]
    ModuleError { message: String },

    #[error("Type {type_name} not found in module {module}")]
    TypeNotFound { module: String, type_name: String },

    #[error("Web runtime error: {message}")]
    RuntimeError { message: String },

    #[error("Illegal state: {message}")]
    IllegalState { message: String },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    Descriptor,
    ClassSpace,
    Runtime,
    Lifecycle,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ExtenderError {
    pub fn parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn class_read(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ClassReadError {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::ConflictError {
            message: message.into(),
        }
    }

    pub fn module(message: impl Into<String>) -> Self {
        Self::ModuleError {
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::RuntimeError {
            message: message.into(),
        }
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::IoError(_) => ErrorCategory::Io,
            Self::SerializationError(_) | Self::ParseError { .. } => ErrorCategory::Descriptor,
            Self::ClassReadError { .. }
            | Self::ConflictError { .. }
            | Self::ModuleError { .. }
            | Self::TypeNotFound { .. } => ErrorCategory::ClassSpace,
            Self::RuntimeError { .. } => ErrorCategory::Runtime,
            Self::IllegalState { .. } => ErrorCategory::Lifecycle,
            Self::TomlError(_)
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 單一類別或片段讀取失敗只會被略過
            Self::ClassReadError { .. } | Self::TypeNotFound { .. } => ErrorSeverity::Low,
            Self::ModuleError { .. } | Self::RuntimeError { .. } => ErrorSeverity::Medium,
            Self::ParseError { .. }
            | Self::SerializationError(_)
            | Self::ConflictError { .. }
            | Self::TomlError(_)
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorSeverity::High,
            Self::IoError(_) | Self::IllegalState { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Io => "Check that the referenced files exist and are readable",
            ErrorCategory::Descriptor => "Fix the deployment descriptor and restart the module",
            ErrorCategory::ClassSpace => {
                "Check fragment names and the modules wired to the web application"
            }
            ErrorCategory::Runtime => "Check the web runtime logs; the module can be restarted",
            ErrorCategory::Lifecycle => "Restart the module to create a fresh deployment",
            ErrorCategory::Configuration => "Review the extender configuration file",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::ParseError { source_name, .. } => {
                format!("Deployment descriptor {} could not be parsed", source_name)
            }
            Self::ConflictError { message } => format!("Conflicting web fragments: {}", message),
            Self::RuntimeError { message } => format!("Web runtime rejected the application: {}", message),
            Self::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid configuration for {}: {}", field, reason)
            }
            Self::MissingConfigError { field } => format!("Missing configuration: {}", field),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtenderError>;
