//! HTTP surface of the job dispatch engine.
//!
//! This crate wires the broker, dispatcher and status store together and
//! exposes them over HTTP:
//! - Job submission (`/job/database`, `/job/callback`, `/job/mail`)
//! - Status lookup (`/job/status`)
//! - Health check (`/health`)

mod config;
mod error;
mod init;
mod monitor;
mod producer;
mod routes;
mod state;
mod status;

pub use config::{AppConfig, ConfigError, StatusBackend};
pub use error::{AppError, AppResult};
pub use init::{InitError, Runtime};
pub use monitor::{DispatcherMonitor, DispatcherState};
pub use producer::{JobServer, SubmitError};
pub use routes::{HealthResponse, router};
pub use state::AppState;
pub use status::StatusQuery;

// Re-export core types for convenience
pub use job_core::{Job, JobId, JobKind, JobState, StatusResponse};
