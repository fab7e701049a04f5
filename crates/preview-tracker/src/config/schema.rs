use std::path::PathBuf;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::store::{DEFAULT_MAX_JOBS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STALE_AFTER_MS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    pub status_endpoint: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    4
}

fn default_stale_after_ms() -> u64 {
    DEFAULT_STALE_AFTER_MS
}

fn default_max_jobs() -> usize {
    DEFAULT_MAX_JOBS
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn millis(value: u64) -> Duration {
    Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}

impl TrackerConfig {
    /// Configuration with every tunable at its default.
    pub fn with_endpoint(status_endpoint: impl Into<String>) -> Self {
        Self {
            status_endpoint: status_endpoint.into(),
            poll_interval_ms: default_poll_interval_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_retries: default_max_retries(),
            stale_after_ms: default_stale_after_ms(),
            max_jobs: default_max_jobs(),
            request_timeout_ms: default_request_timeout_ms(),
            database_path: None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        millis(self.poll_interval_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        millis(self.max_backoff_ms)
    }

    pub fn stale_after(&self) -> Duration {
        millis(self.stale_after_ms)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }
}
