use std::time::Duration;

use job_core::retry::wait_for;
use job_core::{JobId, JobState};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{StatusStore, StoreError, StoreFuture};

/// Status store backed by plain Redis string keys.
///
/// The key is the job id and the value the upper-case state name. No
/// expiry is set.
#[derive(Clone)]
pub struct RedisStatusStore {
    connection: ConnectionManager,
}

impl RedisStatusStore {
    /// Connect to Redis, waiting until the server answers.
    ///
    /// A URL that cannot be parsed fails immediately.
    pub async fn connect(redis_url: &str, retry_interval: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let connection = wait_for("Redis status store", retry_interval, || {
            ConnectionManager::new(client.clone())
        })
        .await;

        tracing::info!("Connected to Redis status store");
        Ok(Self { connection })
    }

    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

impl StatusStore for RedisStatusStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    fn set(&self, job_id: JobId, state: JobState) -> StoreFuture<'_, ()> {
        let mut conn = self.connection.clone();
        Box::pin(async move {
            conn.set::<_, _, ()>(job_id.to_string(), state.as_str())
                .await?;
            Ok(())
        })
    }

    fn get(&self, job_id: JobId) -> StoreFuture<'_, JobState> {
        let mut conn = self.connection.clone();
        Box::pin(async move {
            let value: Option<String> = conn.get(job_id.to_string()).await?;
            match value {
                Some(raw) => Ok(raw.parse()?),
                None => Ok(JobState::Unknown),
            }
        })
    }
}
