//! Repository implementations for database operations.

mod log_repo;
mod status_repo;

pub use log_repo::{LogEntry, LogRepository};
pub use status_repo::{StatusEntry, StatusRepository};
