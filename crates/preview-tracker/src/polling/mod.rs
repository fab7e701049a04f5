//! Status polling: ownership, transport, classification and the supervisor.

pub mod backoff;
pub mod classify;
pub mod client;
pub mod lease;
pub mod runtime;

pub use backoff::backoff;
pub use classify::{classify, StatusOutcome};
pub use client::{HttpStatusClient, StatusClient, StatusReply};
pub use lease::{OwnershipLease, OwnershipRegistry};
pub use runtime::{MountedRuntime, PollingRuntime, RuntimeOptions};
