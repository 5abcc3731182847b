//! Job status repository.

use chrono::{DateTime, Utc};
use job_core::{JobId, JobState};
use serde::{Deserialize, Serialize};

use crate::schema::STATUS_TABLE;
use crate::{Database, DbError};

/// Repository for per-job status records.
pub struct StatusRepository;

/// Internal record type for SurrealDB reads.
#[derive(Debug, Deserialize)]
struct StatusRecord {
    state: JobState,
    updated_at: DateTime<Utc>,
}

/// Write shape - omits `updated_at` so SurrealDB stamps it.
#[derive(Debug, Clone, Serialize)]
struct StatusWrite {
    state: JobState,
}

/// A job's stored status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub job_id: JobId,
    pub state: JobState,
    pub updated_at: DateTime<Utc>,
}

impl StatusRepository {
    /// Record the state of a job, replacing whatever was there.
    pub async fn set(db: &Database, job_id: JobId, state: JobState) -> Result<(), DbError> {
        let record: Option<StatusRecord> = db
            .upsert((STATUS_TABLE, job_id.to_string()))
            .content(StatusWrite { state })
            .await?;

        record
            .map(|_| ())
            .ok_or_else(|| DbError::Query(format!("Failed to write status for job {}", job_id)))
    }

    /// Get the stored status of a job, if any.
    pub async fn get(db: &Database, job_id: JobId) -> Result<Option<StatusEntry>, DbError> {
        let record: Option<StatusRecord> = db.select((STATUS_TABLE, job_id.to_string())).await?;

        Ok(record.map(|r| StatusEntry {
            job_id,
            state: r.state,
            updated_at: r.updated_at,
        }))
    }

    /// Count stored records in each state.
    pub async fn count_by_state(
        db: &Database,
    ) -> Result<std::collections::HashMap<JobState, u64>, DbError> {
        let records: Vec<StatusRecord> = db.select(STATUS_TABLE).await?;

        let mut counts = std::collections::HashMap::new();
        for record in records {
            *counts.entry(record.state).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
