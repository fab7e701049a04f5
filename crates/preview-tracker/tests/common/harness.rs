//! On-disk tracker environment for integration tests.
//!
//! Each harness owns a temporary directory with its own SQLite database, so
//! stores can be reopened to check what actually reached disk.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use preview_tracker::storage::KeyValueStorage;
use preview_tracker::{
    Clock, JobInput, JobPhase, JobStore, ManualClock, MigrationState, RecordingDiagnostics,
    SqliteStorage, StoreOptions,
};

pub struct TrackerHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub clock: ManualClock,
    pub diagnostics: Arc<RecordingDiagnostics>,
}

impl TrackerHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("data").join("tracker.db");
        Self {
            temp_dir,
            db_path,
            clock: ManualClock::default(),
            diagnostics: Arc::new(RecordingDiagnostics::new()),
        }
    }

    pub fn storage(&self) -> SqliteStorage {
        SqliteStorage::open(&self.db_path).expect("Failed to open database")
    }

    /// Writes a raw value straight into the database.
    pub fn seed(&self, key: &str, value: &str) {
        self.storage()
            .set(key, value.as_bytes())
            .expect("Failed to seed storage");
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.storage()
            .get(key)
            .expect("Failed to read storage")
            .map(|bytes| String::from_utf8(bytes).expect("stored value is not UTF-8"))
    }

    pub fn options(&self) -> StoreOptions {
        StoreOptions::default()
            .with_clock(Arc::new(self.clock.clone()))
            .with_diagnostics(self.diagnostics.clone())
    }

    /// A fresh store over the harness database, as after a restart.
    pub fn open_store(&self) -> Arc<JobStore> {
        Arc::new(JobStore::new(
            Arc::new(self.storage()),
            self.options(),
            MigrationState::NotStarted,
        ))
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

pub fn pending_input(id: &str, url: &str) -> JobInput {
    JobInput::new(id, &format!("token-{}", id), JobPhase::Pending).with_request(
        url,
        "en",
        "es",
        Some("Reader@Example.com"),
    )
}
