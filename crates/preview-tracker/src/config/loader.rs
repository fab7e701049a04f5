use std::path::{Path, PathBuf};

use crate::config::schema::TrackerConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/tracker-config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TrackerConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<TrackerConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: TrackerConfig = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// `~/.preview-tracker/config.json`, falling back to the working directory.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".preview-tracker"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.json")
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

fn validate_config(config: &TrackerConfig) -> Result<(), ConfigError> {
    let endpoint = config.status_endpoint.trim();
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Err(ConfigError::Validation {
            message: format!(
                "statusEndpoint must be an http(s) URL, got '{}'",
                config.status_endpoint
            ),
        });
    }

    if config.max_backoff_ms < config.poll_interval_ms {
        return Err(ConfigError::Validation {
            message: format!(
                "maxBackoffMs ({}) must not be shorter than pollIntervalMs ({})",
                config.max_backoff_ms, config.poll_interval_ms
            ),
        });
    }

    if config.stale_after_ms <= config.poll_interval_ms {
        return Err(ConfigError::Validation {
            message: "staleAfterMs must be longer than pollIntervalMs".to_string(),
        });
    }

    Ok(())
}
