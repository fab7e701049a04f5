//! The persisted preview job record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::request_key::canonicalize_request_key;
use super::status::{JobPhase, PipelineStage};

/// When a job is next due for a status check.
///
/// `Never` is the "+infinity" schedule of terminal jobs. It is stored as JSON
/// `null` because JSON has no infinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NextPoll {
    At(DateTime<Utc>),
    #[default]
    Never,
}

impl NextPoll {
    pub fn after(now: DateTime<Utc>, delay: Duration) -> Self {
        NextPoll::At(now + delay)
    }

    /// Returns true once `now` has reached the scheduled time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self {
            NextPoll::At(at) => *at <= now,
            NextPoll::Never => false,
        }
    }

    pub fn epoch_millis(&self) -> Option<i64> {
        match self {
            NextPoll::At(at) => Some(at.timestamp_millis()),
            NextPoll::Never => None,
        }
    }
}

impl Serialize for NextPoll {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NextPoll::At(at) => serializer.serialize_i64(at.timestamp_millis()),
            NextPoll::Never => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for NextPoll {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<f64>::deserialize(deserializer)?;
        Ok(raw
            .and_then(millis_to_datetime)
            .map(NextPoll::At)
            .unwrap_or(NextPoll::Never))
    }
}

/// Converts a JSON number of epoch milliseconds into a timestamp. Non-finite
/// and out-of-range values yield `None`.
pub fn millis_to_datetime(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}

mod epoch_millis {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(dt.timestamp_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        super::millis_to_datetime(raw).ok_or_else(|| D::Error::custom("timestamp out of range"))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            dt: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => serializer.serialize_i64(dt.timestamp_millis()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<f64>::deserialize(deserializer)?;
            Ok(raw.and_then(super::super::millis_to_datetime))
        }
    }
}

/// Unknown stage names degrade to "no stage" instead of rejecting the record.
fn lenient_stage<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<PipelineStage>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(PipelineStage::parse))
}

/// One outstanding or completed preview request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewJob {
    /// Server-assigned identifier; primary key.
    pub preview_id: String,
    /// Canonical request key, empty when it cannot be derived.
    #[serde(default)]
    pub request_key: String,
    /// Capability required to poll this job.
    pub status_token: String,
    pub source_url: String,
    pub source_lang: String,
    pub target_lang: String,
    pub status: JobPhase,
    #[serde(default, deserialize_with = "lenient_stage")]
    pub stage: Option<PipelineStage>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_stage")]
    pub error_stage: Option<PipelineStage>,
    #[serde(with = "epoch_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "epoch_millis")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "epoch_millis::option")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub next_poll_at: NextPoll,
}

impl PreviewJob {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// An active job whose next check time has arrived.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.next_poll_at.is_due(now)
    }

    /// True when the server-declared expiry has passed.
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Re-establishes record invariants on data read back from storage.
    pub(crate) fn normalized(mut self) -> Self {
        if !self.request_key.is_empty() {
            self.request_key = canonicalize_request_key(&self.request_key).unwrap_or_default();
        }
        if self.is_terminal() {
            self.stage = None;
            self.retry_count = 0;
            self.next_poll_at = NextPoll::Never;
        } else if self.next_poll_at == NextPoll::Never {
            self.next_poll_at = NextPoll::At(self.updated_at);
        }
        self
    }
}
