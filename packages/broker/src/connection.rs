//! Broker connection with startup retry.

use std::time::Duration;

use job_core::retry::{DEFAULT_RETRY_INTERVAL, wait_for};

use crate::channel::Channel;
use crate::error::BrokerError;
use crate::memory::MemoryBroker;
use crate::redis_queue::RedisBroker;

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// `memory://`, `redis://host:port/db` or `rediss://...`
    pub endpoint: String,
    /// Pause between connection attempts while the broker is unreachable.
    pub retry_interval: Duration,
    /// How long a Redis consumer blocks before checking for shutdown.
    pub poll_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: "memory://".to_string(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            poll_timeout: Duration::from_secs(1),
        }
    }
}

impl BrokerConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// In-process broker, for tests and single-binary deployments.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }
}

/// An open broker connection. Clones share the same transport.
#[derive(Clone)]
pub enum Connection {
    Memory(MemoryBroker),
    Redis(RedisBroker),
}

impl Connection {
    /// Open a new channel. Use one per role.
    pub async fn channel(&self) -> Result<Channel, BrokerError> {
        match self {
            Connection::Memory(broker) => Ok(Channel::Memory(broker.clone())),
            Connection::Redis(broker) => Ok(Channel::Redis(broker.channel().await?)),
        }
    }

    /// Close the connection. Consumers on it return `None` from `next`.
    pub fn close(&self) {
        tracing::info!("Closing {} broker connection", self.transport());
        match self {
            Connection::Memory(broker) => broker.stop(),
            Connection::Redis(broker) => broker.close(),
        }
    }

    /// Short name of the transport, for logs.
    pub fn transport(&self) -> &'static str {
        match self {
            Connection::Memory(_) => "memory",
            Connection::Redis(_) => "redis",
        }
    }
}

/// Connect to the broker named by `config.endpoint`.
///
/// An endpoint with an unknown scheme fails immediately. A Redis server
/// that does not answer is retried every `retry_interval` until it does.
pub async fn connect(config: &BrokerConfig) -> Result<Connection, BrokerError> {
    let scheme = config
        .endpoint
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .ok_or_else(|| BrokerError::InvalidEndpoint(config.endpoint.clone()))?;

    let connection = match scheme {
        "memory" => Connection::Memory(MemoryBroker::start().await?),
        "redis" | "rediss" => {
            let broker = RedisBroker::open(&config.endpoint, config.poll_timeout)?;
            wait_for("broker", config.retry_interval, || broker.ping()).await;
            Connection::Redis(broker)
        }
        _ => return Err(BrokerError::InvalidEndpoint(config.endpoint.clone())),
    };

    tracing::info!("Connected to {} broker", connection.transport());
    Ok(connection)
}
