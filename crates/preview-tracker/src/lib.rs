pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod job;
pub mod logging;
pub mod polling;
pub mod storage;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{default_config_path, load_config, load_config_from_str, TrackerConfig};
pub use diagnostics::{Diagnostics, LogDiagnostics, RecordingDiagnostics};
pub use error::{
    ConfigError, LoggingError, Result, StatusCheckError, StorageError, TrackerError,
};
pub use job::{
    build_request_key, parse_request_key, reduce, ErrorCode, JobEvent, JobInput, JobPatch,
    JobPhase, NextPoll, Patch, PipelineStage, PreviewJob, ReduceContext, TerminalPhase,
};
pub use polling::{
    HttpStatusClient, MountedRuntime, OwnershipRegistry, PollingRuntime, RuntimeOptions,
    StatusClient, StatusReply,
};
pub use storage::{default_database_path, KeyValueStorage, MemoryStorage, SqliteStorage};
pub use store::{HydrationReport, JobSnapshot, JobStore, MigrationState, StoreOptions};
