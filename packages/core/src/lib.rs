//! Core domain types for the job dispatch engine.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobKind and the kind-specific payloads, with the wire codec
//! - JobState for the status store
//! - Events for observing the worker pool
//! - Fixed-interval retry used while infrastructure starts up

mod error;
mod events;
mod job;
pub mod retry;
mod status;

pub use error::{DecodeError, JobError};
pub use events::JobEvent;
pub use job::{CallbackPayload, Job, JobId, JobKind, JobPayload, MailPayload, PersistPayload};
pub use status::{JobState, ParseStateError, StatusResponse};

/// Content type of every job message.
pub const JOB_CONTENT_TYPE: &str = "application/json";

/// Queue shared by the producer and the worker pool.
pub const DEFAULT_QUEUE: &str = "job";
