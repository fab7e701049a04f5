//! Shared helpers for preview-tracker integration tests.

pub mod harness;

pub use harness::TrackerHarness;
