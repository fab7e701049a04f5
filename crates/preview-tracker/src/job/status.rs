//! Closed vocabularies for job phase, pipeline stage and error kind.

use serde::{Deserialize, Serialize};

/// Top-level status of a preview job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Pending,
    Processing,
    Ready,
    Failed,
    Expired,
}

impl JobPhase {
    pub const ALL: [JobPhase; 5] = [
        JobPhase::Pending,
        JobPhase::Processing,
        JobPhase::Ready,
        JobPhase::Failed,
        JobPhase::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Pending => "pending",
            JobPhase::Processing => "processing",
            JobPhase::Ready => "ready",
            JobPhase::Failed => "failed",
            JobPhase::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobPhase::Pending),
            "processing" => Some(JobPhase::Processing),
            "ready" => Some(JobPhase::Ready),
            "failed" => Some(JobPhase::Failed),
            "expired" => Some(JobPhase::Expired),
            _ => None,
        }
    }

    /// Returns true for phases that absorb every later event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Ready | JobPhase::Failed | JobPhase::Expired)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Position in the phase order. All terminal phases share the top rank.
    pub fn rank(&self) -> u8 {
        match self {
            JobPhase::Pending => 0,
            JobPhase::Processing => 1,
            JobPhase::Ready | JobPhase::Failed | JobPhase::Expired => 2,
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of phases a job can be forced into by a terminal event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TerminalPhase {
    Ready,
    Failed,
    Expired,
}

impl From<TerminalPhase> for JobPhase {
    fn from(phase: TerminalPhase) -> Self {
        match phase {
            TerminalPhase::Ready => JobPhase::Ready,
            TerminalPhase::Failed => JobPhase::Failed,
            TerminalPhase::Expired => JobPhase::Expired,
        }
    }
}

impl TryFrom<JobPhase> for TerminalPhase {
    type Error = JobPhase;

    fn try_from(phase: JobPhase) -> Result<Self, Self::Error> {
        match phase {
            JobPhase::Ready => Ok(TerminalPhase::Ready),
            JobPhase::Failed => Ok(TerminalPhase::Failed),
            JobPhase::Expired => Ok(TerminalPhase::Expired),
            other => Err(other),
        }
    }
}

/// Sub-step of the generation pipeline, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    FetchingContent,
    AnalyzingContent,
    Translating,
    GeneratingPreview,
    Saving,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 5] = [
        PipelineStage::FetchingContent,
        PipelineStage::AnalyzingContent,
        PipelineStage::Translating,
        PipelineStage::GeneratingPreview,
        PipelineStage::Saving,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::FetchingContent => "fetching_content",
            PipelineStage::AnalyzingContent => "analyzing_content",
            PipelineStage::Translating => "translating",
            PipelineStage::GeneratingPreview => "generating_preview",
            PipelineStage::Saving => "saving",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fetching_content" => Some(PipelineStage::FetchingContent),
            "analyzing_content" => Some(PipelineStage::AnalyzingContent),
            "translating" => Some(PipelineStage::Translating),
            "generating_preview" => Some(PipelineStage::GeneratingPreview),
            "saving" => Some(PipelineStage::Saving),
            _ => None,
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::FetchingContent => write!(f, "Fetching content"),
            PipelineStage::AnalyzingContent => write!(f, "Analyzing content"),
            PipelineStage::Translating => write!(f, "Translating"),
            PipelineStage::GeneratingPreview => write!(f, "Generating preview"),
            PipelineStage::Saving => write!(f, "Saving"),
        }
    }
}

/// Error kinds the status endpoint (or the tracker itself) reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    PreviewExpired,
    PreviewNotFound,
    FetchFailed,
    ContentUnsupported,
    AnalysisFailed,
    TranslationFailed,
    GenerationFailed,
    SaveFailed,
    Timeout,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::PreviewExpired => "preview_expired",
            ErrorCode::PreviewNotFound => "preview_not_found",
            ErrorCode::FetchFailed => "fetch_failed",
            ErrorCode::ContentUnsupported => "content_unsupported",
            ErrorCode::AnalysisFailed => "analysis_failed",
            ErrorCode::TranslationFailed => "translation_failed",
            ErrorCode::GenerationFailed => "generation_failed",
            ErrorCode::SaveFailed => "save_failed",
            ErrorCode::Timeout => "timeout",
            ErrorCode::UnknownError => "unknown_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preview_expired" => Some(ErrorCode::PreviewExpired),
            "preview_not_found" => Some(ErrorCode::PreviewNotFound),
            "fetch_failed" => Some(ErrorCode::FetchFailed),
            "content_unsupported" => Some(ErrorCode::ContentUnsupported),
            "analysis_failed" => Some(ErrorCode::AnalysisFailed),
            "translation_failed" => Some(ErrorCode::TranslationFailed),
            "generation_failed" => Some(ErrorCode::GenerationFailed),
            "save_failed" => Some(ErrorCode::SaveFailed),
            "timeout" => Some(ErrorCode::Timeout),
            "unknown_error" => Some(ErrorCode::UnknownError),
            _ => None,
        }
    }

    pub fn is_known(s: &str) -> bool {
        Self::parse(s).is_some()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
