use broker::BrokerError;
use db::DbError;
use job_core::{DecodeError, JobKind};
use thiserror::Error;

/// Why a handler did not complete its job.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Callback request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Callback to {url} answered {status}")]
    CallbackRejected { url: String, status: u16 },

    #[error("Expected a {expected} handler, got {got}")]
    WrongKind { expected: JobKind, got: JobKind },

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Errors that stop the dispatcher run loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Malformed message on queue: {0}")]
    Malformed(#[source] DecodeError),
}
