//! Pure state transitions for preview jobs.
//!
//! Every mutation of a job record goes through [`reduce`]. The function is
//! monotonic: phases and stages only move forward, terminal phases absorb every
//! later event, and replaying an event that is already reflected in the record
//! returns the record unchanged. That is what lets status responses arrive in
//! any order.

use chrono::{DateTime, Duration, Utc};

use super::record::{NextPoll, PreviewJob};
use super::request_key::{build_request_key, canonicalize_request_key};
use super::status::{JobPhase, PipelineStage, TerminalPhase};

/// A nullable field in a patch: keep the current value, clear it, or set it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T: Clone> Patch<T> {
    pub fn apply(&self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Keep => current,
            Patch::Clear => None,
            Patch::Set(value) => Some(value.clone()),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    /// `None` clears; use `Patch::Keep` to leave a field untouched.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        }
    }
}

/// Everything a caller knows about a job when it first learns of it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInput {
    pub preview_id: String,
    /// Request key in either encoding; derived from the source fields when absent.
    pub request_key: Option<String>,
    /// Only used to derive the request key.
    pub email: Option<String>,
    pub status_token: String,
    pub source_url: String,
    pub source_lang: String,
    pub target_lang: String,
    pub status: JobPhase,
    pub stage: Option<PipelineStage>,
    pub preview_url: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub error_stage: Option<PipelineStage>,
    pub expires_at: Option<DateTime<Utc>>,
    pub retry_count: Option<u32>,
    pub next_poll_at: Option<NextPoll>,
}

impl JobInput {
    pub fn new(preview_id: &str, status_token: &str, status: JobPhase) -> Self {
        Self {
            preview_id: preview_id.to_string(),
            request_key: None,
            email: None,
            status_token: status_token.to_string(),
            source_url: String::new(),
            source_lang: String::new(),
            target_lang: String::new(),
            status,
            stage: None,
            preview_url: None,
            error: None,
            error_code: None,
            error_stage: None,
            expires_at: None,
            retry_count: None,
            next_poll_at: None,
        }
    }

    /// Sets the request parameters the key is derived from.
    pub fn with_request(
        mut self,
        source_url: &str,
        source_lang: &str,
        target_lang: &str,
        email: Option<&str>,
    ) -> Self {
        self.source_url = source_url.to_string();
        self.source_lang = source_lang.to_string();
        self.target_lang = target_lang.to_string();
        self.email = email.map(|e| e.to_string());
        self
    }
}

/// Partial update of an existing job.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobPatch {
    pub status: Option<JobPhase>,
    pub stage: Patch<PipelineStage>,
    pub request_key: Option<String>,
    pub status_token: Option<String>,
    pub source_url: Option<String>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub preview_url: Patch<String>,
    pub error: Patch<String>,
    pub error_code: Patch<String>,
    pub error_stage: Patch<PipelineStage>,
    pub expires_at: Patch<DateTime<Utc>>,
    pub retry_count: Option<u32>,
    pub next_poll_at: Option<NextPoll>,
}

impl JobPatch {
    pub fn status(status: JobPhase) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Clears `error`, `error_code` and `error_stage`.
    pub fn clearing_errors(mut self) -> Self {
        self.error = Patch::Clear;
        self.error_code = Patch::Clear;
        self.error_stage = Patch::Clear;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Upsert(JobInput),
    Patch(JobPatch),
    Terminal {
        status: TerminalPhase,
        patch: JobPatch,
    },
    SetRetry {
        retry_count: u32,
        next_poll_at: NextPoll,
    },
    ResetRetry {
        next_poll_at: NextPoll,
    },
    Remove,
}

#[derive(Debug, Clone, Copy)]
pub struct ReduceContext {
    pub now: DateTime<Utc>,
    pub default_poll_interval: Duration,
}

/// Computes the next state of a job. `None` means "no job": either the event
/// removed it or it targeted a job that does not exist.
pub fn reduce(
    existing: Option<&PreviewJob>,
    event: &JobEvent,
    ctx: &ReduceContext,
) -> Option<PreviewJob> {
    match event {
        JobEvent::Remove => None,
        JobEvent::Upsert(input) => Some(match existing {
            None => create(input, ctx),
            Some(job) => merge_input(job, input, ctx),
        }),
        JobEvent::Patch(patch) => existing.map(|job| apply_patch(job, patch, ctx)),
        JobEvent::Terminal { status, patch } => {
            let patch = JobPatch {
                status: Some((*status).into()),
                stage: Patch::Clear,
                retry_count: Some(0),
                next_poll_at: Some(NextPoll::Never),
                ..patch.clone()
            };
            existing.map(|job| apply_patch(job, &patch, ctx))
        }
        JobEvent::SetRetry {
            retry_count,
            next_poll_at,
        } => {
            let patch = JobPatch {
                retry_count: Some(*retry_count),
                next_poll_at: Some(*next_poll_at),
                ..Default::default()
            };
            existing.map(|job| apply_patch(job, &patch, ctx))
        }
        JobEvent::ResetRetry { next_poll_at } => {
            let patch = JobPatch {
                retry_count: Some(0),
                next_poll_at: Some(*next_poll_at),
                ..Default::default()
            };
            existing.map(|job| apply_patch(job, &patch, ctx))
        }
    }
}

/// Terminal phases absorb; otherwise the higher-ranked phase wins.
pub fn merge_phase(current: JobPhase, incoming: JobPhase) -> JobPhase {
    if current.is_terminal() {
        current
    } else if incoming.is_terminal() || incoming.rank() > current.rank() {
        incoming
    } else {
        current
    }
}

/// Stages never move backwards.
pub fn advance_stage(
    current: Option<PipelineStage>,
    incoming: Option<PipelineStage>,
) -> Option<PipelineStage> {
    match (current, incoming) {
        (current, None) => current,
        (None, Some(stage)) => Some(stage),
        (Some(current), Some(stage)) => Some(current.max(stage)),
    }
}

fn non_blank(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn prefer_incoming(current: &str, incoming: &str) -> String {
    non_blank(incoming).unwrap_or(current).to_string()
}

fn derive_key(source_url: &str, source_lang: &str, target_lang: &str, email: Option<&str>) -> Option<String> {
    non_blank(source_url)?;
    non_blank(source_lang)?;
    non_blank(target_lang)?;
    Some(build_request_key(source_url, source_lang, target_lang, email))
}

fn explicit_key(key: Option<&str>) -> Option<String> {
    key.and_then(non_blank).and_then(canonicalize_request_key)
}

fn create(input: &JobInput, ctx: &ReduceContext) -> PreviewJob {
    let request_key = explicit_key(input.request_key.as_deref())
        .or_else(|| {
            derive_key(
                &input.source_url,
                &input.source_lang,
                &input.target_lang,
                input.email.as_deref(),
            )
        })
        .unwrap_or_default();

    let job = PreviewJob {
        preview_id: input.preview_id.clone(),
        request_key,
        status_token: input.status_token.clone(),
        source_url: input.source_url.clone(),
        source_lang: input.source_lang.clone(),
        target_lang: input.target_lang.clone(),
        status: input.status,
        stage: input.stage,
        preview_url: input.preview_url.clone(),
        error: input.error.clone(),
        error_code: input.error_code.clone(),
        error_stage: input.error_stage,
        created_at: ctx.now,
        updated_at: ctx.now,
        expires_at: input.expires_at,
        retry_count: input.retry_count.unwrap_or(0),
        next_poll_at: input
            .next_poll_at
            .unwrap_or_else(|| NextPoll::after(ctx.now, ctx.default_poll_interval)),
    };
    enforce_terminal(job)
}

fn merge_input(existing: &PreviewJob, input: &JobInput, ctx: &ReduceContext) -> PreviewJob {
    if existing.is_terminal() {
        return existing.clone();
    }

    let status = merge_phase(existing.status, input.status);
    let source_url = prefer_incoming(&existing.source_url, &input.source_url);
    let source_lang = prefer_incoming(&existing.source_lang, &input.source_lang);
    let target_lang = prefer_incoming(&existing.target_lang, &input.target_lang);
    let request_key = explicit_key(input.request_key.as_deref())
        .or_else(|| non_blank(&existing.request_key).map(str::to_string))
        .or_else(|| derive_key(&source_url, &source_lang, &target_lang, input.email.as_deref()))
        .unwrap_or_default();

    let next = PreviewJob {
        preview_id: existing.preview_id.clone(),
        request_key,
        status_token: prefer_incoming(&existing.status_token, &input.status_token),
        source_url,
        source_lang,
        target_lang,
        status,
        stage: advance_stage(existing.stage, input.stage),
        preview_url: input.preview_url.clone().or_else(|| existing.preview_url.clone()),
        error: input.error.clone().or_else(|| existing.error.clone()),
        error_code: input.error_code.clone().or_else(|| existing.error_code.clone()),
        error_stage: input.error_stage.or(existing.error_stage),
        created_at: existing.created_at,
        updated_at: existing.updated_at,
        expires_at: input.expires_at.or(existing.expires_at),
        retry_count: input.retry_count.unwrap_or(existing.retry_count),
        next_poll_at: input.next_poll_at.unwrap_or(existing.next_poll_at),
    };
    finalize(existing, next, ctx)
}

fn apply_patch(existing: &PreviewJob, patch: &JobPatch, ctx: &ReduceContext) -> PreviewJob {
    if existing.is_terminal() {
        return existing.clone();
    }

    let status = patch
        .status
        .map(|incoming| merge_phase(existing.status, incoming))
        .unwrap_or(existing.status);
    let stage = match &patch.stage {
        Patch::Set(stage) => advance_stage(existing.stage, Some(*stage)),
        // Clearing is a regression while active; terminal phases clear it anyway.
        Patch::Keep | Patch::Clear => existing.stage,
    };
    let pick = |current: &str, incoming: &Option<String>| match incoming {
        Some(value) => prefer_incoming(current, value),
        None => current.to_string(),
    };
    let source_url = pick(&existing.source_url, &patch.source_url);
    let source_lang = pick(&existing.source_lang, &patch.source_lang);
    let target_lang = pick(&existing.target_lang, &patch.target_lang);
    let request_key = explicit_key(patch.request_key.as_deref())
        .or_else(|| non_blank(&existing.request_key).map(str::to_string))
        .or_else(|| derive_key(&source_url, &source_lang, &target_lang, None))
        .unwrap_or_default();

    let next = PreviewJob {
        preview_id: existing.preview_id.clone(),
        request_key,
        status_token: pick(&existing.status_token, &patch.status_token),
        source_url,
        source_lang,
        target_lang,
        status,
        stage,
        preview_url: patch.preview_url.apply(existing.preview_url.clone()),
        error: patch.error.apply(existing.error.clone()),
        error_code: patch.error_code.apply(existing.error_code.clone()),
        error_stage: patch.error_stage.apply(existing.error_stage),
        created_at: existing.created_at,
        updated_at: existing.updated_at,
        expires_at: patch.expires_at.apply(existing.expires_at),
        retry_count: patch.retry_count.unwrap_or(existing.retry_count),
        next_poll_at: patch.next_poll_at.unwrap_or(existing.next_poll_at),
    };
    finalize(existing, next, ctx)
}

fn enforce_terminal(mut job: PreviewJob) -> PreviewJob {
    if job.is_terminal() {
        job.stage = None;
        job.retry_count = 0;
        job.next_poll_at = NextPoll::Never;
    }
    job
}

/// Applies terminal invariants and bumps `updated_at`, unless nothing but the
/// timestamp would change, in which case the existing record is returned.
fn finalize(existing: &PreviewJob, next: PreviewJob, ctx: &ReduceContext) -> PreviewJob {
    let mut next = enforce_terminal(next);
    next.updated_at = existing.updated_at;
    if next == *existing {
        return existing.clone();
    }
    next.updated_at = ctx.now;
    next
}
