//! Job domain types shared by the producer and the worker pool.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::{DecodeError, JobError};

/// Unique identifier for a job, assigned once by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of job kinds. The serialized form is the one-letter code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Save the client-supplied timestamp to the database.
    #[serde(rename = "A")]
    Persist,
    /// Long-running work that reports back to a web-hook.
    #[serde(rename = "B")]
    Callback,
    /// Send an email.
    #[serde(rename = "C")]
    Mail,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Persist, JobKind::Callback, JobKind::Mail];

    /// One-letter code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            JobKind::Persist => "A",
            JobKind::Callback => "B",
            JobKind::Mail => "C",
        }
    }

    /// Look up a kind by its wire code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Human-readable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Persist => "persist",
            JobKind::Callback => "callback",
            JobKind::Mail => "mail",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Payload for [`JobKind::Persist`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistPayload {
    /// Timestamp provided by the client.
    pub client_time: DateTime<Utc>,
}

impl PersistPayload {
    /// Build a payload from unix seconds.
    pub fn from_unix(secs: i64) -> Result<Self, JobError> {
        let client_time = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| JobError::InvalidClientTime(secs.to_string()))?;
        Ok(Self { client_time })
    }
}

/// Payload for [`JobKind::Callback`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    /// Web-hook to POST the result to once the work is done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

/// Payload for [`JobKind::Mail`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailPayload {
    /// Recipient of the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
}

/// Kind-specific data carried by a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPayload {
    Persist(PersistPayload),
    Callback(CallbackPayload),
    Mail(MailPayload),
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Persist(_) => JobKind::Persist,
            JobPayload::Callback(_) => JobKind::Callback,
            JobPayload::Mail(_) => JobKind::Mail,
        }
    }

    /// The `extra_data` value written to the wire.
    ///
    /// Kinds without any parameters are sent as an empty string.
    fn extra_data(&self) -> Value {
        match self {
            JobPayload::Persist(p) => json!({ "client_time": p.client_time }),
            JobPayload::Callback(CallbackPayload { callback_url: None })
            | JobPayload::Mail(MailPayload {
                email_address: None,
            }) => Value::String(String::new()),
            JobPayload::Callback(p) => json!(p),
            JobPayload::Mail(p) => json!(p),
        }
    }

    fn from_extra_data(kind: JobKind, extra_data: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            JobKind::Persist => JobPayload::Persist(serde_json::from_value(extra_data)?),
            JobKind::Callback => JobPayload::Callback(optional_payload(extra_data)?),
            JobKind::Mail => JobPayload::Mail(optional_payload(extra_data)?),
        })
    }
}

/// Parameterless kinds accept `""` or `null` in place of an object.
fn optional_payload<T: DeserializeOwned + Default>(value: Value) -> Result<T, serde_json::Error> {
    match value {
        Value::Null => Ok(T::default()),
        Value::String(s) if s.is_empty() => Ok(T::default()),
        other => serde_json::from_value(other),
    }
}

/// A job is one unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireJob", try_from = "WireJob")]
pub struct Job {
    /// Correlation key across producer, queue, worker and status store.
    pub id: JobId,
    pub payload: JobPayload,
}

impl Job {
    /// Create a job with a fresh ID.
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: JobId::new(),
            payload,
        }
    }

    pub fn persist(client_time: DateTime<Utc>) -> Self {
        Self::new(JobPayload::Persist(PersistPayload { client_time }))
    }

    pub fn callback(callback_url: Option<String>) -> Self {
        Self::new(JobPayload::Callback(CallbackPayload { callback_url }))
    }

    pub fn mail(email_address: Option<String>) -> Self {
        Self::new(JobPayload::Mail(MailPayload { email_address }))
    }

    pub fn kind(&self) -> JobKind {
        self.payload.kind()
    }

    /// Serialize to the JSON message body.
    pub fn to_json(&self) -> Result<Vec<u8>, JobError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a message body.
    ///
    /// Distinguishes bodies that are not jobs at all from jobs whose
    /// type code is not one of [`JobKind::ALL`].
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        let wire: WireJob = serde_json::from_slice(body).map_err(DecodeError::Malformed)?;
        Job::try_from(wire)
    }
}

/// The JSON shape of a job on the queue and in API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireJob {
    uuid: JobId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    extra_data: Value,
}

impl From<Job> for WireJob {
    fn from(job: Job) -> Self {
        Self {
            uuid: job.id,
            kind: job.kind().code().to_string(),
            extra_data: job.payload.extra_data(),
        }
    }
}

impl TryFrom<WireJob> for Job {
    type Error = DecodeError;

    fn try_from(wire: WireJob) -> Result<Self, Self::Error> {
        let id = wire.uuid;
        let kind = JobKind::from_code(&wire.kind).ok_or_else(|| DecodeError::UnknownKind {
            id,
            code: wire.kind.clone(),
        })?;
        let payload = JobPayload::from_extra_data(kind, wire.extra_data)
            .map_err(|source| DecodeError::InvalidPayload { id, kind, source })?;
        Ok(Job { id, payload })
    }
}
