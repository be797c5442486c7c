//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (validator derive)
//! - guaranteed_buffer_space <= max_buffer_size
//! - trail_age_s <= max_track_age_s

use contracts::{ContractError, SyncEngineConfig};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// 校验 SyncEngineConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &SyncEngineConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_buffer(config)?;
    validate_tracks(config)?;
    Ok(())
}

/// 字段级校验，错误路径形如 `buffer.max_buffer_size`
fn validate_fields(config: &SyncEngineConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| {
        let (field, message) = first_error("", &errors)
            .unwrap_or_else(|| ("config".to_string(), errors.to_string()));
        ContractError::config_validation(field, message)
    })
}

/// 校验缓冲区预留空间
fn validate_buffer(config: &SyncEngineConfig) -> Result<(), ContractError> {
    let buffer = &config.buffer;
    if buffer.guaranteed_buffer_space > buffer.max_buffer_size {
        return Err(ContractError::config_validation(
            "buffer.guaranteed_buffer_space / buffer.max_buffer_size",
            format!(
                "guaranteed_buffer_space ({}) must be <= max_buffer_size ({})",
                buffer.guaranteed_buffer_space, buffer.max_buffer_size
            ),
        ));
    }
    Ok(())
}

/// 校验轨迹时长
fn validate_tracks(config: &SyncEngineConfig) -> Result<(), ContractError> {
    let tracks = &config.tracks;
    if tracks.trail_age_s > tracks.max_track_age_s {
        return Err(ContractError::config_validation(
            "tracks.trail_age_s / tracks.max_track_age_s",
            format!(
                "trail_age_s ({}) must be <= max_track_age_s ({})",
                tracks.trail_age_s, tracks.max_track_age_s
            ),
        ));
    }
    Ok(())
}

/// 按字段名顺序找到第一个错误
fn first_error(prefix: &str, errors: &ValidationErrors) -> Option<(String, String)> {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in fields {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        let found = match kind {
            ValidationErrorsKind::Field(errs) => {
                errs.first().map(|e| (path.clone(), describe(e)))
            }
            ValidationErrorsKind::Struct(inner) => first_error(&path, inner),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(idx, inner)| first_error(&format!("{path}[{idx}]"), inner)),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn describe(error: &ValidationError) -> String {
    let base = match &error.message {
        Some(message) => message.to_string(),
        None => format!("failed '{}' check", error.code),
    };
    match error.params.get("value") {
        Some(value) => format!("{base}, got {value}"),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        assert!(validate(&SyncEngineConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_buffer_size() {
        let mut config = SyncEngineConfig::default();
        config.buffer.max_buffer_size = 0;
        config.buffer.guaranteed_buffer_space = 0;
        let result = validate(&config);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("buffer.max_buffer_size"), "got: {err}");
    }

    #[test]
    fn test_negative_track_age() {
        let mut config = SyncEngineConfig::default();
        config.tracks.max_track_age_s = -1.0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("tracks.max_track_age_s"), "got: {err}");
    }

    #[test]
    fn test_guaranteed_space_exceeds_max() {
        let mut config = SyncEngineConfig::default();
        config.buffer.max_buffer_size = 10;
        config.buffer.guaranteed_buffer_space = 20;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("must be <= max_buffer_size"), "got: {err}");
    }

    #[test]
    fn test_guaranteed_space_equal_to_max() {
        let mut config = SyncEngineConfig::default();
        config.buffer.max_buffer_size = 10;
        config.buffer.guaranteed_buffer_space = 10;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_trail_longer_than_track_age() {
        let mut config = SyncEngineConfig::default();
        config.tracks.max_track_age_s = 5.0;
        config.tracks.trail_age_s = 6.0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("trail_age_s"), "got: {err}");
    }

    #[test]
    fn test_empty_log_level() {
        let mut config = SyncEngineConfig::default();
        config.observability.log_level = String::new();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("observability.log_level"), "got: {err}");
    }

    #[test]
    fn test_zero_wait_timeout() {
        let mut config = SyncEngineConfig::default();
        config.reader.wait_timeout_ms = 0;
        let err = validate(&config).unwrap_err();
        assert!(matches!(
            err,
            ContractError::ConfigValidation { ref field, .. } if field == "reader.wait_timeout_ms"
        ));
    }
}
