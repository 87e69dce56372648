use crate::utils::error::{ExtenderError, Result};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// 檢查 context path 格式: 以 "/" 開頭、不以 "/" 結尾 (根路徑除外)、不含空白
pub fn validate_context_path(field_name: &str, path: &str) -> Result<()> {
    let invalid = |reason: &str| ExtenderError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: path.to_string(),
        reason: reason.to_string(),
    };

    if path.is_empty() {
        return Err(invalid("Context path cannot be empty"));
    }
    if !path.starts_with('/') {
        return Err(invalid("Context path must start with '/'"));
    }
    if path.len() > 1 && path.ends_with('/') {
        return Err(invalid("Context path must not end with '/'"));
    }
    if path.chars().any(char::is_whitespace) {
        return Err(invalid("Context path must not contain whitespace"));
    }
    Ok(())
}

pub fn validate_entry_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ExtenderError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(ExtenderError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(ExtenderError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| ExtenderError::MissingConfigError {
            field: field_name.to_string(),
        })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ExtenderError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(ExtenderError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}
