//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ColloquyConfig, EngineConfig, LogOutput, LoggingConfig};

/// Largest history page a transport is asked for.
pub const MAX_HISTORY_PAGE_SIZE: usize = 100;

/// Validates the entire configuration.
pub fn validate_config(config: &ColloquyConfig) -> ConfigResult<()> {
    validate_engine_config(&config.engine)?;
    validate_logging_config(&config.logging)?;
    validate_plugin_sections(config)?;
    Ok(())
}

/// Validates engine settings.
fn validate_engine_config(engine: &EngineConfig) -> ConfigResult<()> {
    validate_channel_part(&engine.namespace, "engine.namespace")?;
    validate_channel_part(&engine.global_channel, "engine.global_channel")?;

    if engine.retention_secs == 0 {
        return Err(ConfigError::validation(
            "Temporary object retention must be greater than 0",
        ));
    }

    if engine.sweep_interval_secs == 0 {
        return Err(ConfigError::validation(
            "Sweep interval must be greater than 0",
        ));
    }

    if engine.sweep_interval_secs > engine.retention_secs {
        return Err(ConfigError::validation(
            "Sweep interval must be less than or equal to the retention window",
        ));
    }

    if !(1..=MAX_HISTORY_PAGE_SIZE).contains(&engine.history_page_size) {
        return Err(ConfigError::validation(format!(
            "History page size must be between 1 and {MAX_HISTORY_PAGE_SIZE}"
        )));
    }

    Ok(())
}

/// Channel names are built as `{namespace}#chat#{name}`.
fn validate_channel_part(value: &str, field: &str) -> ConfigResult<()> {
    if value.is_empty() {
        return Err(ConfigError::missing_field(field));
    }
    if value.contains('#') || value.contains(char::is_whitespace) {
        return Err(ConfigError::validation(format!(
            "{field} cannot contain '#' or whitespace"
        )));
    }
    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

/// Every plugin section must be a key/value map.
fn validate_plugin_sections(config: &ColloquyConfig) -> ConfigResult<()> {
    for (plugin, section) in &config.plugins {
        if !section.is_object() {
            return Err(ConfigError::InvalidPluginSection {
                plugin: plugin.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = ColloquyConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_namespace() {
        let mut config = ColloquyConfig::default();
        config.engine.namespace = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.engine.namespace = "a#b".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_sweep_longer_than_retention() {
        let mut config = ColloquyConfig::default();
        config.engine.retention_secs = 30;
        assert!(validate_config(&config).is_err());

        config.engine.sweep_interval_secs = 10;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_page_size_bounds() {
        let mut config = ColloquyConfig::default();
        config.engine.history_page_size = 0;
        assert!(validate_config(&config).is_err());

        config.engine.history_page_size = MAX_HISTORY_PAGE_SIZE + 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = ColloquyConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_validate_plugin_section_shape() {
        let mut config = ColloquyConfig::default();
        config
            .plugins
            .insert("profanity".to_string(), json!({ "banned": ["darn"] }));
        assert!(validate_config(&config).is_ok());

        config.plugins.insert("broken".to_string(), json!([1, 2]));
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidPluginSection { plugin }) if plugin == "broken"
        ));
    }
}
