//! Read side of the status store.

use std::sync::Arc;

use db::{StatusStore, StoreError};
use job_core::{JobId, JobState, StatusResponse};

/// Looks up the last recorded state of a job.
#[derive(Clone)]
pub struct StatusQuery {
    store: Arc<dyn StatusStore>,
}

impl StatusQuery {
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Status of the job named by `raw_id`.
    ///
    /// A string that is not a job id cannot have been observed and reports
    /// `UNKNOWN`. The response echoes `raw_id` as given.
    pub async fn status(&self, raw_id: &str) -> Result<StatusResponse, StoreError> {
        let state = match JobId::parse(raw_id.trim()) {
            Ok(job_id) => self.store.get(job_id).await?,
            Err(_) => JobState::Unknown,
        };
        Ok(StatusResponse::new(raw_id, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::{DbConfig, SurrealStatusStore};

    #[tokio::test]
    async fn reports_stored_and_unknown_states() {
        let db = db::init(DbConfig::memory()).await.unwrap();
        let store = Arc::new(SurrealStatusStore::new(db));
        let query = StatusQuery::new(store.clone());

        let job_id = JobId::new();
        let raw = job_id.to_string();
        assert_eq!(query.status(&raw).await.unwrap().status, JobState::Unknown);

        store.set(job_id, JobState::Started).await.unwrap();
        let response = query.status(&raw).await.unwrap();
        assert_eq!(response, StatusResponse::new(raw.clone(), JobState::Started));

        let garbage = query.status("not-a-uuid").await.unwrap();
        assert_eq!(garbage.id, "not-a-uuid");
        assert_eq!(garbage.status, JobState::Unknown);
    }
}
