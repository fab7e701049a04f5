use std::sync::{Arc, OnceLock};

use crate::job::PreviewJob;

/// Immutable, ordered view of the job list at one point in time.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct JobSnapshot {
    jobs: Vec<PreviewJob>,
}

static EMPTY: OnceLock<Arc<JobSnapshot>> = OnceLock::new();

impl JobSnapshot {
    pub(crate) fn new(jobs: Vec<PreviewJob>) -> Self {
        Self { jobs }
    }

    /// The shared empty snapshot. Every call returns the same `Arc`.
    pub fn empty() -> Arc<JobSnapshot> {
        Arc::clone(EMPTY.get_or_init(|| Arc::new(JobSnapshot::default())))
    }

    pub fn jobs(&self) -> &[PreviewJob] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, preview_id: &str) -> Option<&PreviewJob> {
        self.jobs.iter().find(|j| j.preview_id == preview_id)
    }

    pub fn has_active(&self) -> bool {
        self.jobs.iter().any(PreviewJob::is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_shared() {
        let a = JobSnapshot::empty();
        let b = JobSnapshot::empty();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_empty());
        assert!(!a.has_active());
    }
}
