#![allow(clippy::disallowed_methods)]

mod common;

use chrono::{DateTime, Utc};
use job_core::{JobId, JobState};
use std::error::Error;

use db::repositories::{LogRepository, StatusRepository};
use db::{DbConfig, DbError, StatusStore, SurrealStatusStore};
use std::time::Duration;

#[tokio::test]
async fn test_status_repository() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;
    let job_id = JobId::new();

    assert!(StatusRepository::get(&db, job_id).await?.is_none());

    StatusRepository::set(&db, job_id, JobState::Started).await?;
    let started = StatusRepository::get(&db, job_id).await?.expect("status written");
    assert_eq!(started.job_id, job_id);
    assert_eq!(started.state, JobState::Started);

    StatusRepository::set(&db, job_id, JobState::Done).await?;
    let done = StatusRepository::get(&db, job_id).await?.expect("status written");
    assert_eq!(done.state, JobState::Done);
    assert!(done.updated_at >= started.updated_at);

    let other = JobId::new();
    StatusRepository::set(&db, other, JobState::Failed).await?;
    let counts = StatusRepository::count_by_state(&db).await?;
    assert_eq!(counts.get(&JobState::Done), Some(&1));
    assert_eq!(counts.get(&JobState::Failed), Some(&1));
    assert_eq!(counts.get(&JobState::Started), None);

    Ok(())
}

#[tokio::test]
async fn test_surreal_status_store() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;
    let store = SurrealStatusStore::new(db);

    // Ids never written report unknown rather than an error
    assert_eq!(store.get(JobId::new()).await?, JobState::Unknown);

    let job_id = JobId::new();
    store.set(job_id, JobState::Started).await?;
    assert_eq!(store.get(job_id).await?, JobState::Started);

    // A retried handler writing done again leaves the job done
    store.set(job_id, JobState::Done).await?;
    store.set(job_id, JobState::Done).await?;
    assert_eq!(store.get(job_id).await?, JobState::Done);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_writes_to_distinct_keys() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;
    let store = std::sync::Arc::new(SurrealStatusStore::new(db));

    let ids: Vec<JobId> = (0..20).map(|_| JobId::new()).collect();
    let mut tasks = Vec::new();
    for id in ids.clone() {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store.set(id, JobState::Started).await?;
            store.set(id, JobState::Done).await
        }));
    }
    for task in tasks {
        task.await??;
    }

    for id in ids {
        assert_eq!(store.get(id).await?, JobState::Done);
    }
    Ok(())
}

#[tokio::test]
async fn test_log_repository() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;
    let job_id = JobId::new();
    let client_time: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 0).expect("valid");

    assert!(LogRepository::get(&db, job_id).await?.is_none());

    let entry = LogRepository::record(&db, job_id, client_time).await?;
    assert_eq!(entry.client_time, client_time);

    // Duplicate delivery overwrites the same record
    LogRepository::record(&db, job_id, client_time).await?;
    assert_eq!(LogRepository::count(&db).await?, 1);

    let loaded = LogRepository::get(&db, job_id).await?.expect("log written");
    assert_eq!(loaded.job_id, job_id);
    assert_eq!(loaded.client_time.timestamp(), 1_700_000_000);

    Ok(())
}

#[tokio::test]
async fn test_schema_init_is_idempotent() -> Result<(), Box<dyn Error>> {
    let db = common::setup_db().await?;
    db::init_schema(&db).await?;
    db::init_schema(&db).await?;
    Ok(())
}

#[tokio::test]
async fn test_engines_not_built_in_fail_fast() -> Result<(), Box<dyn Error>> {
    for endpoint in ["surrealkv:///tmp/dispatch_kv", "ws://127.0.0.1:1", "http://127.0.0.1:1"] {
        let config = DbConfig::endpoint(endpoint).with_retry_interval(Duration::from_millis(50));
        let result = tokio::time::timeout(Duration::from_secs(2), db::connect(&config)).await?;
        assert!(
            matches!(result, Err(DbError::InvalidEndpoint(_))),
            "{endpoint} was not rejected"
        );
    }
    Ok(())
}
