//! Durable key/value storage for tracker state.
//!
//! The store only needs byte strings under a handful of keys. Backends are
//! the in-memory [`MemoryStorage`] and the SQLite-backed [`SqliteStorage`].

use std::path::PathBuf;

use crate::error::StorageError;

pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Key holding the current array of job records.
pub const JOBS_KEY: &str = "preview-tracker:jobs:v2";
/// Older job array with the previous per-job shape.
pub const LEGACY_JOBS_KEY: &str = "preview-tracker:jobs:v1";
/// Single "last pending preview" record from the oldest releases.
pub const LEGACY_PENDING_KEY: &str = "preview-tracker:pending";

/// A key/value byte-string store scoped to one client.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Returns the canonical database path: `~/.preview-tracker/data/tracker.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".preview-tracker").join("data").join("tracker.db"))
}
