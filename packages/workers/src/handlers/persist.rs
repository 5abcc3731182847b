use std::time::Duration;

use db::Database;
use db::repositories::LogRepository;
use job_core::{Job, JobKind, JobPayload};

use crate::error::HandlerError;
use crate::handler::{HandlerFuture, JobHandler};

/// Saves the client timestamp of a persist job to the `job_log` table.
pub struct PersistHandler {
    db: Database,
    delay: Duration,
}

impl PersistHandler {
    pub fn new(db: Database, delay: Duration) -> Self {
        Self { db, delay }
    }
}

impl JobHandler for PersistHandler {
    fn kind(&self) -> JobKind {
        JobKind::Persist
    }

    fn handle(&self, job: &Job) -> HandlerFuture {
        let JobPayload::Persist(payload) = &job.payload else {
            let got = job.kind();
            return Box::pin(async move {
                Err(HandlerError::WrongKind {
                    expected: JobKind::Persist,
                    got,
                })
            });
        };

        let db = self.db.clone();
        let delay = self.delay;
        let job_id = job.id;
        let client_time = payload.client_time;

        Box::pin(async move {
            tokio::time::sleep(delay).await;
            LogRepository::record(&db, job_id, client_time).await?;
            tracing::info!(job_id = %job_id, %client_time, "Persisted client time");
            Ok(())
        })
    }
}
