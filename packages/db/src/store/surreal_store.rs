use job_core::{JobId, JobState};

use super::{StatusStore, StoreFuture};
use crate::Database;
use crate::repositories::StatusRepository;

/// Status store backed by the `job_status` table.
#[derive(Clone)]
pub struct SurrealStatusStore {
    db: Database,
}

impl SurrealStatusStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl StatusStore for SurrealStatusStore {
    fn backend(&self) -> &'static str {
        "surrealdb"
    }

    fn set(&self, job_id: JobId, state: JobState) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            StatusRepository::set(&self.db, job_id, state).await?;
            Ok(())
        })
    }

    fn get(&self, job_id: JobId) -> StoreFuture<'_, JobState> {
        Box::pin(async move {
            let entry = StatusRepository::get(&self.db, job_id).await?;
            Ok(entry.map_or(JobState::Unknown, |e| e.state))
        })
    }
}
