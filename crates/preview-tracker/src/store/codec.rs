//! Stored payload formats: the current job array and the two legacy shapes.
//!
//! Parsing never fails as a whole. Entries with a status outside the phase
//! vocabulary are counted so the caller can report them; any other malformed
//! entry is skipped quietly.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::job::record::millis_to_datetime;
use crate::job::{build_request_key, JobInput, JobPhase, NextPoll, PipelineStage, PreviewJob};

/// Jobs recovered from one stored array.
#[derive(Debug, Default)]
pub struct ParsedJobs {
    pub jobs: Vec<PreviewJob>,
    /// Entries dropped because their status is not a known phase.
    pub unknown_status: usize,
    /// Entries dropped for any other reason.
    pub malformed: usize,
}

fn array_entries(bytes: &[u8], key: &str) -> Vec<Value> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            log::debug!("Stored value under '{}' is not an array, ignoring it", key);
            Vec::new()
        }
        Err(e) => {
            log::debug!("Stored value under '{}' is not valid JSON: {}", key, e);
            Vec::new()
        }
    }
}

/// The `status` of an entry, when it is a string outside the vocabulary.
fn has_unknown_status(entry: &Value) -> bool {
    entry
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| JobPhase::parse(s).is_none())
}

fn non_empty_id(job: &PreviewJob) -> bool {
    !job.preview_id.trim().is_empty()
}

/// Parses the current job array.
pub fn decode_jobs(bytes: &[u8]) -> ParsedJobs {
    let mut parsed = ParsedJobs::default();
    for entry in array_entries(bytes, crate::storage::JOBS_KEY) {
        if has_unknown_status(&entry) {
            parsed.unknown_status += 1;
            continue;
        }
        match serde_json::from_value::<PreviewJob>(entry) {
            Ok(job) if non_empty_id(&job) => parsed.jobs.push(job.normalized()),
            _ => parsed.malformed += 1,
        }
    }
    parsed
}

pub fn encode_jobs(jobs: &[PreviewJob]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(jobs)
}

/// Job shape written under the v1 key.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyJobV1 {
    id: String,
    token: String,
    url: String,
    source_language: String,
    target_language: String,
    #[serde(default)]
    email: Option<String>,
    status: String,
    #[serde(default)]
    step: Option<String>,
    #[serde(default)]
    result_url: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    created_at: f64,
    #[serde(default)]
    updated_at: Option<f64>,
    #[serde(default)]
    expires_at: Option<f64>,
}

impl LegacyJobV1 {
    fn into_job(self, now: DateTime<Utc>) -> Option<PreviewJob> {
        let status = JobPhase::parse(&self.status)?;
        let created_at = millis_to_datetime(self.created_at)?;
        let updated_at = self
            .updated_at
            .and_then(millis_to_datetime)
            .unwrap_or(created_at);
        if self.id.trim().is_empty() {
            return None;
        }
        let request_key = if self.url.trim().is_empty() {
            String::new()
        } else {
            build_request_key(
                &self.url,
                &self.source_language,
                &self.target_language,
                self.email.as_deref(),
            )
        };

        let job = PreviewJob {
            preview_id: self.id,
            request_key,
            status_token: self.token,
            source_url: self.url,
            source_lang: self.source_language,
            target_lang: self.target_language,
            status,
            stage: self.step.as_deref().and_then(PipelineStage::parse),
            preview_url: self.result_url,
            error: self.error_message,
            error_code: self.error_code,
            error_stage: None,
            created_at,
            updated_at,
            expires_at: self.expires_at.and_then(millis_to_datetime),
            retry_count: 0,
            next_poll_at: NextPoll::At(now),
        };
        Some(job.normalized())
    }
}

/// Parses the v1 job array into current records.
pub fn decode_legacy_jobs(bytes: &[u8], now: DateTime<Utc>) -> ParsedJobs {
    let mut parsed = ParsedJobs::default();
    for entry in array_entries(bytes, crate::storage::LEGACY_JOBS_KEY) {
        if has_unknown_status(&entry) {
            parsed.unknown_status += 1;
            continue;
        }
        match serde_json::from_value::<LegacyJobV1>(entry)
            .ok()
            .and_then(|legacy| legacy.into_job(now))
        {
            Some(job) => parsed.jobs.push(job),
            None => parsed.malformed += 1,
        }
    }
    parsed
}

/// The single pending-preview record of the oldest releases.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPendingPreview {
    pub preview_id: String,
    pub status_token: String,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub source_lang: String,
    #[serde(default)]
    pub target_lang: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<f64>,
}

impl LegacyPendingPreview {
    /// A pending record always describes a job the server already accepted.
    pub fn to_input(&self) -> JobInput {
        JobInput::new(&self.preview_id, &self.status_token, JobPhase::Processing).with_request(
            &self.source_url,
            &self.source_lang,
            &self.target_lang,
            self.email.as_deref(),
        )
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.and_then(millis_to_datetime)
    }
}

pub fn decode_legacy_pending(bytes: &[u8]) -> Option<LegacyPendingPreview> {
    serde_json::from_slice::<LegacyPendingPreview>(bytes)
        .ok()
        .filter(|pending| !pending.preview_id.trim().is_empty())
}
