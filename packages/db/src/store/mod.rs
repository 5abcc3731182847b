//! The status store: one lifecycle state per job id.

mod redis_store;
mod surreal_store;

use std::future::Future;
use std::pin::Pin;

use job_core::{JobId, JobState, ParseStateError};
use thiserror::Error;

use crate::DbError;

pub use redis_store::RedisStatusStore;
pub use surreal_store::SurrealStatusStore;

/// Future type returned by [`StatusStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Key/value access to job states.
///
/// Implementations are shared by every concurrent handler task and must be
/// safe for concurrent use without extra locking. Each key has a single
/// writer at a time: the task that owns the job.
pub trait StatusStore: Send + Sync + 'static {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Record the state of a job. Last writer wins.
    fn set(&self, job_id: JobId, state: JobState) -> StoreFuture<'_, ()>;

    /// Read the state of a job; [`JobState::Unknown`] when nothing is stored.
    fn get(&self, job_id: JobId) -> StoreFuture<'_, JobState>;
}

/// Status store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    InvalidState(#[from] ParseStateError),
}
