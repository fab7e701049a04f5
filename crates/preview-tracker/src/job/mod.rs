//! Job records, their vocabulary and the transition function.

pub mod record;
pub mod reducer;
pub mod request_key;
pub mod status;

pub use record::{NextPoll, PreviewJob};
pub use reducer::{reduce, JobEvent, JobInput, JobPatch, Patch, ReduceContext};
pub use request_key::{
    build_request_key, canonicalize_request_key, parse_request_key, RequestKeyParts,
};
pub use status::{ErrorCode, JobPhase, PipelineStage, TerminalPhase};
