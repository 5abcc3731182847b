//! Events emitted by the worker pool as jobs move through it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, JobKind};

/// Events broadcast by the dispatcher for logging and observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A delivery was decoded into a job.
    JobReceived {
        job_id: JobId,
        kind: JobKind,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// A handler began executing.
    JobStarted {
        job_id: JobId,
        kind: JobKind,
        timestamp: DateTime<Utc>,
    },
    /// A handler finished successfully.
    JobCompleted {
        job_id: JobId,
        kind: JobKind,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A handler returned an error or panicked.
    JobFailed {
        job_id: JobId,
        kind: JobKind,
        error: String,
        attempt: u32,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    /// A redelivered job was already done and was not run again.
    JobSkipped {
        job_id: JobId,
        kind: JobKind,
        timestamp: DateTime<Utc>,
    },
    /// A message was discarded without running any handler.
    MessageDropped {
        job_id: Option<JobId>,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobReceived { timestamp, .. }
            | JobEvent::JobStarted { timestamp, .. }
            | JobEvent::JobCompleted { timestamp, .. }
            | JobEvent::JobFailed { timestamp, .. }
            | JobEvent::JobSkipped { timestamp, .. }
            | JobEvent::MessageDropped { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobReceived { job_id, .. }
            | JobEvent::JobStarted { job_id, .. }
            | JobEvent::JobCompleted { job_id, .. }
            | JobEvent::JobFailed { job_id, .. }
            | JobEvent::JobSkipped { job_id, .. } => Some(*job_id),
            JobEvent::MessageDropped { job_id, .. } => *job_id,
        }
    }

    /// Whether the job reached a final outcome for this delivery.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            JobEvent::JobCompleted { .. }
                | JobEvent::JobFailed { .. }
                | JobEvent::JobSkipped { .. }
                | JobEvent::MessageDropped { .. }
        )
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobReceived {
                job_id,
                kind,
                attempt,
                ..
            } => format!("Job {} ({}) received, attempt {}", job_id, kind, attempt),
            JobEvent::JobStarted { job_id, kind, .. } => {
                format!("Job {} ({}) started", job_id, kind)
            }
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            JobEvent::JobFailed {
                job_id,
                error,
                will_retry,
                ..
            } => {
                let retry = if *will_retry { " (will retry)" } else { "" };
                format!("Job {} failed: {}{}", job_id, error, retry)
            }
            JobEvent::JobSkipped { job_id, .. } => {
                format!("Job {} already done, skipped", job_id)
            }
            JobEvent::MessageDropped { job_id, reason, .. } => match job_id {
                Some(id) => format!("Message for job {} dropped: {}", id, reason),
                None => format!("Message dropped: {}", reason),
            },
        }
    }
}
