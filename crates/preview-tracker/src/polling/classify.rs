//! Maps one status reply to what the runtime should do with the job.

use serde_json::Value;

use super::client::StatusReply;
use crate::job::{ErrorCode, JobPhase, PipelineStage, TerminalPhase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    /// The preview is done.
    Ready { preview_url: Option<String> },
    /// The job ended without a preview.
    Failed {
        phase: TerminalPhase,
        error: Option<String>,
        error_code: Option<String>,
        error_stage: Option<PipelineStage>,
    },
    /// The service is temporarily unable to answer; keep polling.
    Transient,
    /// Still running.
    InProgress {
        status: JobPhase,
        stage: Option<PipelineStage>,
        preview_url: Option<String>,
    },
}

fn str_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}

/// Looks at the top level first, then at `details`.
fn nested_str<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    str_field(body, key).or_else(|| body.get("details").and_then(|d| str_field(d, key)))
}

fn known_error_code(body: &Value) -> Option<ErrorCode> {
    nested_str(body, "errorCode").and_then(ErrorCode::parse)
}

fn error_stage(body: &Value) -> Option<PipelineStage> {
    nested_str(body, "errorStage").and_then(PipelineStage::parse)
}

/// A failed status, a recognized error code or a recognized error stage.
fn has_failure_signal(body: &Value) -> bool {
    str_field(body, "status") == Some(JobPhase::Failed.as_str())
        || known_error_code(body).is_some()
        || error_stage(body).is_some()
}

fn terminal_from_body(body: Option<&Value>, fallback_code: ErrorCode, fallback_error: String) -> StatusOutcome {
    let error_code = body
        .and_then(|b| nested_str(b, "errorCode"))
        .map(str::to_string)
        .unwrap_or_else(|| fallback_code.as_str().to_string());
    let phase = if error_code == ErrorCode::PreviewExpired.as_str() {
        TerminalPhase::Expired
    } else {
        TerminalPhase::Failed
    };
    StatusOutcome::Failed {
        phase,
        error: Some(
            body.and_then(|b| str_field(b, "error"))
                .map(str::to_string)
                .unwrap_or(fallback_error),
        ),
        error_code: Some(error_code),
        error_stage: body.and_then(error_stage),
    }
}

fn fixed_terminal(phase: TerminalPhase, code: ErrorCode, body: Option<&Value>, message: &str) -> StatusOutcome {
    StatusOutcome::Failed {
        phase,
        error: Some(
            body.and_then(|b| str_field(b, "error"))
                .unwrap_or(message)
                .to_string(),
        ),
        error_code: Some(code.as_str().to_string()),
        error_stage: body.and_then(error_stage),
    }
}

pub fn classify(reply: &StatusReply) -> StatusOutcome {
    let status = reply.http_status;
    let body = reply.body.as_ref().filter(|b| b.is_object());

    match status {
        410 => {
            return fixed_terminal(
                TerminalPhase::Expired,
                ErrorCode::PreviewExpired,
                body,
                "Preview has expired",
            )
        }
        404 => {
            return fixed_terminal(
                TerminalPhase::Failed,
                ErrorCode::PreviewNotFound,
                body,
                "Preview not found",
            )
        }
        _ => {}
    }

    if !(200..300).contains(&status) {
        let retryable = status == 429 || (500..600).contains(&status);
        if retryable && !body.is_some_and(has_failure_signal) {
            return StatusOutcome::Transient;
        }
        return terminal_from_body(
            body,
            ErrorCode::UnknownError,
            format!("Status check failed with HTTP {}", status),
        );
    }

    let Some(body) = body else {
        return StatusOutcome::InProgress {
            status: JobPhase::Processing,
            stage: None,
            preview_url: None,
        };
    };

    let reported = str_field(body, "status").and_then(JobPhase::parse);
    let preview_url = str_field(body, "previewUrl").map(str::to_string);

    if reported == Some(JobPhase::Ready) {
        return StatusOutcome::Ready { preview_url };
    }

    if reported == Some(JobPhase::Expired) {
        return fixed_terminal(
            TerminalPhase::Expired,
            ErrorCode::PreviewExpired,
            Some(body),
            "Preview has expired",
        );
    }

    if has_failure_signal(body) {
        return terminal_from_body(
            Some(body),
            ErrorCode::UnknownError,
            "Preview generation failed".to_string(),
        );
    }

    StatusOutcome::InProgress {
        status: match reported {
            Some(JobPhase::Pending) => JobPhase::Pending,
            _ => JobPhase::Processing,
        },
        stage: str_field(body, "stage").and_then(PipelineStage::parse),
        preview_url,
    }
}
