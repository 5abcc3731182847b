//! Lifecycle state recorded in the status store.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Last-known state of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Never observed by a worker, or expired from the store.
    #[default]
    Unknown,
    /// A worker has begun processing.
    Started,
    /// The handler finished successfully.
    Done,
    /// The handler returned an error or panicked.
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Unknown => "UNKNOWN",
            JobState::Started => "STARTED",
            JobState::Done => "DONE",
            JobState::Failed => "FAILED",
        }
    }

    /// Whether no further transition is expected without a redelivery.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unrecognized job state: {0:?}")]
pub struct ParseStateError(pub String);

impl FromStr for JobState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNKNOWN" | "" => Ok(JobState::Unknown),
            "STARTED" => Ok(JobState::Started),
            "DONE" => Ok(JobState::Done),
            "FAILED" => Ok(JobState::Failed),
            _ => Err(ParseStateError(s.to_string())),
        }
    }
}

/// Body returned by the status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Status")]
    pub status: JobState,
}

impl StatusResponse {
    pub fn new(id: impl Into<String>, status: JobState) -> Self {
        Self {
            id: id.into(),
            status,
        }
    }
}
