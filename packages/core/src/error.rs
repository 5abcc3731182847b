//! Errors raised while building or decoding jobs.

use thiserror::Error;

use crate::{JobId, JobKind};

/// Errors raised when building or encoding a job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid client_time: {0}")]
    InvalidClientTime(String),

    #[error("Failed to encode job: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised when a queue message cannot be turned into a [`crate::Job`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body is not a job envelope at all.
    #[error("Message is not a valid job: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The envelope is fine but its type code has no handler.
    #[error("Job {id} has unknown type {code:?}")]
    UnknownKind { id: JobId, code: String },

    /// The type code is known but `extra_data` does not match it.
    #[error("Job {id} has an invalid {kind} payload: {source}")]
    InvalidPayload {
        id: JobId,
        kind: JobKind,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// The job ID, when the envelope got far enough to carry one.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            DecodeError::Malformed(_) => None,
            DecodeError::UnknownKind { id, .. } | DecodeError::InvalidPayload { id, .. } => {
                Some(*id)
            }
        }
    }
}
