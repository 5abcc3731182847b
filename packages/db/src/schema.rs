//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Table holding the current state of every job a worker has touched.
pub(crate) const STATUS_TABLE: &str = "job_status";

/// Table written by the persist handler.
pub(crate) const LOG_TABLE: &str = "job_log";

/// Initialize the database schema.
///
/// Every statement is `IF NOT EXISTS`, so this is safe to run from both
/// the producer and the worker pool.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_STATUS_SCHEMA).await?.check()?;
    db.query(JOB_LOG_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job status table schema.
const JOB_STATUS_SCHEMA: &str = r#"
-- One record per job id, last writer wins
DEFINE TABLE IF NOT EXISTS job_status SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS state ON job_status TYPE string;
DEFINE FIELD IF NOT EXISTS updated_at ON job_status TYPE datetime VALUE time::now();

DEFINE INDEX IF NOT EXISTS job_status_state ON job_status FIELDS state;
"#;

/// Persisted client timestamps.
const JOB_LOG_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job_log SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS client_time ON job_log TYPE string;
DEFINE FIELD IF NOT EXISTS persisted_at ON job_log TYPE datetime VALUE time::now();
"#;
