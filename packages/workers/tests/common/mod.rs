#![allow(dead_code)]

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use broker::{BrokerConfig, Channel, Connection, Message};
use db::{Database, DbConfig, StatusStore, SurrealStatusStore};
use job_core::{DEFAULT_QUEUE, Job, JobEvent, JobId, JobState};
use tokio::sync::broadcast;
use workers::{Dispatcher, DispatcherConfig, HandlerConfig, Handlers};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Everything a dispatcher test needs, all in memory.
pub struct Harness {
    pub connection: Connection,
    pub producer: Channel,
    pub db: Database,
    pub store: Arc<dyn StatusStore>,
}

impl Harness {
    pub async fn new() -> Result<Self, Box<dyn Error>> {
        let connection = broker::connect(&BrokerConfig::memory()).await?;
        let producer = connection.channel().await?;
        producer.queue_declare(DEFAULT_QUEUE).await?;

        let db = db::init(DbConfig::memory()).await?;
        let store: Arc<dyn StatusStore> = Arc::new(SurrealStatusStore::new(db.clone()));

        Ok(Self {
            connection,
            producer,
            db,
            store,
        })
    }

    /// Built-in handlers with no simulated work.
    pub fn handlers(&self) -> Handlers {
        Handlers::standard(self.db.clone(), &HandlerConfig::immediate())
    }

    pub fn dispatcher(&self, handlers: Handlers, config: DispatcherConfig) -> Dispatcher {
        Dispatcher::new(handlers, self.store.clone(), config)
    }

    /// Start `dispatcher` consuming the default queue.
    pub async fn start(
        &self,
        dispatcher: &Dispatcher,
    ) -> Result<tokio::task::JoinHandle<Result<(), workers::DispatchError>>, Box<dyn Error>> {
        let channel = self.connection.channel().await?;
        let consumer = dispatcher.consume(&channel).await?;
        Ok(dispatcher.spawn(consumer))
    }

    pub async fn publish(&self, job: &Job) -> Result<(), Box<dyn Error>> {
        self.publish_raw(&job.to_json()?).await
    }

    pub async fn publish_raw(&self, body: &[u8]) -> Result<(), Box<dyn Error>> {
        let published = self
            .producer
            .publish(DEFAULT_QUEUE, Message::json(body.to_vec()))
            .await?;
        assert!(published);
        Ok(())
    }

    pub async fn state(&self, job_id: JobId) -> Result<JobState, Box<dyn Error>> {
        Ok(self.store.get(job_id).await?)
    }

    /// Poll the store until `job_id` reaches `state`.
    pub async fn wait_for_state(&self, job_id: JobId, state: JobState) -> TestResult {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if self.state(job_id).await? == state {
                return Ok(());
            }
            if tokio::time::Instant::now() > deadline {
                return Err(format!("job {job_id} never reached {state}").into());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Next event matching `pred`, or an error after five seconds.
pub async fn wait_event<F>(
    events: &mut broadcast::Receiver<JobEvent>,
    mut pred: F,
) -> Result<JobEvent, Box<dyn Error>>
where
    F: FnMut(&JobEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await?;
            if pred(&event) {
                return Ok::<_, broadcast::error::RecvError>(event);
            }
        }
    })
    .await?
    .map_err(Into::into)
}

/// Next settled event for `job_id`.
pub async fn settled(
    events: &mut broadcast::Receiver<JobEvent>,
    job_id: JobId,
) -> Result<JobEvent, Box<dyn Error>> {
    wait_event(events, |e| e.job_id() == Some(job_id) && e.is_settled()).await
}
