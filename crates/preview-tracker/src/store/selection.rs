//! Ordering and selectors over job lists.

use std::cmp::Ordering;

use crate::job::{canonicalize_request_key, PreviewJob};

/// Total order used for storage capping and for picking "the" job to show.
///
/// Active jobs come first, then the most recently updated, then the most
/// recently created; ties fall back to `preview_id` and `request_key` so the
/// order never depends on input order. Timestamps are validated on load, so
/// an unparseable value never reaches this comparison.
pub fn compare_jobs(a: &PreviewJob, b: &PreviewJob) -> Ordering {
    b.is_active()
        .cmp(&a.is_active())
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.preview_id.cmp(&b.preview_id))
        .then_with(|| a.request_key.cmp(&b.request_key))
}

pub fn sort_jobs(jobs: &mut [PreviewJob]) {
    jobs.sort_by(compare_jobs);
}

pub fn select_all(jobs: &[PreviewJob]) -> Vec<PreviewJob> {
    let mut all = jobs.to_vec();
    sort_jobs(&mut all);
    all
}

pub fn select_latest_active(jobs: &[PreviewJob]) -> Option<&PreviewJob> {
    jobs.iter().filter(|j| j.is_active()).min_by(|a, b| compare_jobs(a, b))
}

/// The single job a status widget should show.
pub fn select_preferred(jobs: &[PreviewJob]) -> Option<&PreviewJob> {
    jobs.iter().min_by(|a, b| compare_jobs(a, b))
}

/// Accepts the request key in either encoding.
pub fn select_latest_for_request_key<'a>(
    jobs: &'a [PreviewJob],
    request_key: &str,
) -> Option<&'a PreviewJob> {
    let wanted = canonicalize_request_key(request_key)?;
    jobs.iter()
        .filter(|j| j.request_key == wanted)
        .min_by(|a, b| compare_jobs(a, b))
}
