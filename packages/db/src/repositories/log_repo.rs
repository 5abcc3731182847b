//! Repository for client timestamps saved by the persist handler.

use chrono::{DateTime, Utc};
use job_core::JobId;
use serde::{Deserialize, Serialize};

use crate::schema::LOG_TABLE;
use crate::{Database, DbError};

pub struct LogRepository;

#[derive(Debug, Deserialize)]
struct LogRecord {
    client_time: String,
    persisted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
struct LogWrite {
    client_time: String,
}

/// A persisted client timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub job_id: JobId,
    pub client_time: DateTime<Utc>,
    pub persisted_at: DateTime<Utc>,
}

impl LogRecord {
    fn into_entry(self, job_id: JobId) -> Result<LogEntry, DbError> {
        let client_time = DateTime::parse_from_rfc3339(&self.client_time)
            .map_err(|e| DbError::Serialization(format!("client_time: {}", e)))?
            .with_timezone(&Utc);
        Ok(LogEntry {
            job_id,
            client_time,
            persisted_at: self.persisted_at,
        })
    }
}

impl LogRepository {
    /// Save the client timestamp of a job.
    ///
    /// Keyed by job id, so a redelivered job overwrites its own record.
    pub async fn record(
        db: &Database,
        job_id: JobId,
        client_time: DateTime<Utc>,
    ) -> Result<LogEntry, DbError> {
        let record: Option<LogRecord> = db
            .upsert((LOG_TABLE, job_id.to_string()))
            .content(LogWrite {
                client_time: client_time.to_rfc3339(),
            })
            .await?;

        record
            .ok_or_else(|| DbError::Query(format!("Failed to persist job {}", job_id)))?
            .into_entry(job_id)
    }

    pub async fn get(db: &Database, job_id: JobId) -> Result<Option<LogEntry>, DbError> {
        let record: Option<LogRecord> = db.select((LOG_TABLE, job_id.to_string())).await?;
        record.map(|r| r.into_entry(job_id)).transpose()
    }

    pub async fn count(db: &Database) -> Result<usize, DbError> {
        let records: Vec<LogRecord> = db.select(LOG_TABLE).await?;
        Ok(records.len())
    }
}
