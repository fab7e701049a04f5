use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Status check error: {0}")]
    StatusCheck(#[from] StatusCheckError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    /// Rendering a result for output failed.
    #[error("Failed to encode output: {0}")]
    Output(#[source] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Errors from durable key/value storage.
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A schema migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The storage lock was poisoned.
    #[error("Storage lock poisoned")]
    LockPoisoned,

    /// The backend refused the write.
    #[error("Write to key '{key}' rejected: {reason}")]
    WriteRejected { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StatusCheckError {
    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(String),

    #[error("Status request for '{preview_id}' failed: {source}")]
    Transport {
        preview_id: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Status request for '{preview_id}' failed: {reason}")]
    Unavailable { preview_id: String, reason: String },
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_error_is_not_a_config_error() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = TrackerError::Output(source);
        assert!(err.to_string().starts_with("Failed to encode output"));
        assert!(!matches!(err, TrackerError::Config(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
