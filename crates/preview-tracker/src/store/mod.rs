//! In-memory job collection backed by key-value storage.

pub mod codec;
mod job_store;
pub mod selection;
mod snapshot;

pub use job_store::{
    HydrationReport, JobStore, MigrationState, StoreOptions, SubscriptionId,
    DEFAULT_MAX_JOBS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STALE_AFTER_MS,
};
pub use selection::{
    compare_jobs, select_all, select_latest_active, select_latest_for_request_key,
    select_preferred,
};
pub use snapshot::JobSnapshot;
