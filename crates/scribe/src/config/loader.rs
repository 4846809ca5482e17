use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub const ENV_OUTPUT_ROOT: &str = "SCRIBE_OUTPUT_ROOT";
pub const ENV_DATABASE_PATH: &str = "SCRIBE_DATABASE_PATH";
pub const ENV_LOG_LEVEL: &str = "SCRIBE_LOG_LEVEL";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Loads, validates and applies environment overrides to a config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = load_config_from_str(&content)?;
    apply_env_overrides(&mut config)?;
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Parses and validates config JSON. Environment overrides are not applied.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.output_root.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "output_root must not be empty".to_string(),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if !LOG_LEVELS.contains(&config.log_level.as_str()) {
        return Err(ConfigError::Validation {
            message: format!("Unknown log level: {}", config.log_level),
        });
    }

    let retention = &config.retention;
    if retention.targeted_suffixes.is_empty() {
        return Err(ConfigError::Validation {
            message: "retention.targeted_suffixes must not be empty".to_string(),
        });
    }
    for suffix in retention
        .targeted_suffixes
        .iter()
        .chain(retention.protected_suffixes.iter())
    {
        if !suffix.starts_with('.') || suffix.len() < 2 {
            return Err(ConfigError::Validation {
                message: format!("Suffix '{}' must look like '.ext'", suffix),
            });
        }
    }

    Ok(())
}

/// Overrides config values from `SCRIBE_*` environment variables.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    if let Some(value) = env_value(ENV_OUTPUT_ROOT) {
        log::debug!("{} overrides output_root", ENV_OUTPUT_ROOT);
        config.output_root = value;
    }

    if let Some(value) = env_value(ENV_DATABASE_PATH) {
        log::debug!("{} overrides database_path", ENV_DATABASE_PATH);
        config.database_path = Some(value);
    }

    if let Some(value) = env_value(ENV_LOG_LEVEL) {
        let level = value.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidOverride {
                key: ENV_LOG_LEVEL.to_string(),
                value,
                reason: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }
        config.log_level = level;
    }

    Ok(())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
