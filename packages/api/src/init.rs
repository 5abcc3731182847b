//! Server initialization for the job dispatch engine.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use broker::{BrokerError, Connection};
use db::{Database, DbError, RedisStatusStore, StatusStore, StoreError, SurrealStatusStore};
use thiserror::Error;
use tokio::task::JoinHandle;
use workers::{DispatchError, Dispatcher, Handlers};

use crate::config::{AppConfig, StatusBackend};
use crate::monitor::{DispatcherMonitor, DispatcherState};
use crate::producer::JobServer;
use crate::routes;
use crate::state::AppState;
use crate::status::StatusQuery;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Broker unavailable: {0}")]
    Broker(#[from] BrokerError),

    #[error("Database unavailable: {0}")]
    Database(#[from] DbError),

    #[error("Status store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatcher failed to start: {0}")]
    Dispatch(#[from] DispatchError),
}

/// The running engine: broker connection, dispatcher task and job server.
pub struct Runtime {
    config: AppConfig,
    connection: Connection,
    db: Database,
    store: Arc<dyn StatusStore>,
    dispatcher: Dispatcher,
    jobs: Arc<JobServer>,
    monitor: DispatcherMonitor,
    watcher: JoinHandle<()>,
}

impl Runtime {
    /// Connect everything and start consuming.
    ///
    /// Waits for the broker and database to become reachable.
    pub async fn start(config: AppConfig) -> Result<Self, InitError> {
        tracing::info!("Initializing job dispatch engine...");

        let connection = broker::connect(&config.broker_config()).await?;
        let db = db::init(config.db_config()).await?;

        let store: Arc<dyn StatusStore> = match &config.status_backend {
            StatusBackend::Surreal => Arc::new(SurrealStatusStore::new(db.clone())),
            StatusBackend::Redis { url } => {
                Arc::new(RedisStatusStore::connect(url, config.retry_interval).await?)
            }
        };

        let handlers = Handlers::standard(db.clone(), &config.handler_config());
        let dispatcher = Dispatcher::new(handlers, store.clone(), config.dispatcher_config());

        let consumer_channel = connection.channel().await?;
        let consumer = dispatcher.consume(&consumer_channel).await?;
        let (monitor, watcher) = DispatcherMonitor::watch(dispatcher.spawn(consumer));

        let jobs = Arc::new(JobServer::new(&connection, &config.queue).await?);

        tracing::info!(
            broker = connection.transport(),
            status_store = store.backend(),
            queue = %config.queue,
            "Job dispatch engine initialized"
        );

        Ok(Self {
            config,
            connection,
            db,
            store,
            dispatcher,
            jobs,
            monitor,
            watcher,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn jobs(&self) -> &JobServer {
        &self.jobs
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn dispatcher_monitor(&self) -> &DispatcherMonitor {
        &self.monitor
    }

    /// Resolves once the dispatcher stops consuming, for whatever reason.
    pub async fn wait_dispatcher(&self) -> DispatcherState {
        self.monitor.stopped().await
    }

    pub fn state(&self) -> AppState {
        AppState {
            jobs: self.jobs.clone(),
            status: StatusQuery::new(self.store.clone()),
            broker: self.connection.clone(),
            dispatcher: self.monitor.clone(),
        }
    }

    pub fn router(&self) -> Router {
        routes::router(self.state())
    }

    /// Close the broker and wait for the dispatcher to stop.
    ///
    /// Jobs still running when the grace period ends are abandoned.
    pub async fn shutdown(self) {
        self.connection.close();

        if tokio::time::timeout(SHUTDOWN_GRACE, self.watcher).await.is_err() {
            tracing::warn!("Dispatcher did not stop in time");
        }
    }
}
