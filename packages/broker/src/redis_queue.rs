//! Redis transport: one list per queue.
//!
//! Producers `LPUSH` onto `dispatch:queue:{name}` and consumers pop from the
//! right end, so each list is FIFO. Consumers that settle after completion
//! use `BLMOVE` to park the message in `{name}:processing` until it is
//! acked, requeued or moved to `{name}:dead`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use job_core::JOB_CONTENT_TYPE;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

use crate::channel::{AckMode, Acker, Delivery, Message};
use crate::error::BrokerError;

/// Set of declared queue names.
const QUEUES_KEY: &str = "dispatch:queues";

fn ready_key(queue: &str) -> String {
    format!("dispatch:queue:{}", queue)
}

fn processing_key(queue: &str) -> String {
    format!("dispatch:queue:{}:processing", queue)
}

fn dead_key(queue: &str) -> String {
    format!("dispatch:queue:{}:dead", queue)
}

/// What is stored in the list for each message.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    content_type: String,
    body: String,
    attempt: u32,
}

impl Envelope {
    /// Bodies are stored as JSON strings, so they must be UTF-8.
    fn new(message: Message) -> Result<Self, BrokerError> {
        Ok(Self {
            content_type: message.content_type,
            body: String::from_utf8(message.body)?,
            attempt: 1,
        })
    }

    /// Parse a list element. Elements pushed by other producers are taken
    /// as a bare body.
    fn parse(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| Self {
            content_type: JOB_CONTENT_TYPE.to_string(),
            body: raw.to_string(),
            attempt: 1,
        })
    }

    fn into_message(self) -> Message {
        Message {
            content_type: self.content_type,
            body: self.body.into_bytes(),
        }
    }
}

/// A Redis server used as a broker.
#[derive(Clone)]
pub struct RedisBroker {
    client: redis::Client,
    poll_timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl RedisBroker {
    /// Parse the URL. Does not touch the network.
    pub fn open(url: &str, poll_timeout: Duration) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)
            .map_err(|e| BrokerError::InvalidEndpoint(format!("{}: {}", url, e)))?;
        Ok(Self {
            client,
            poll_timeout,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Check that the server answers.
    pub async fn ping(&self) -> Result<(), BrokerError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    pub(crate) async fn channel(&self) -> Result<RedisChannel, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        let connection = ConnectionManager::new(self.client.clone()).await?;
        Ok(RedisChannel {
            broker: self.clone(),
            connection,
        })
    }

    /// Stop handing out deliveries. Consumers notice within one poll.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A channel backed by its own Redis connection.
pub struct RedisChannel {
    broker: RedisBroker,
    connection: ConnectionManager,
}

impl RedisChannel {
    async fn is_declared(&self, queue: &str) -> Result<bool, BrokerError> {
        let mut conn = self.connection.clone();
        let declared: bool = redis::cmd("SISMEMBER")
            .arg(QUEUES_KEY)
            .arg(queue)
            .query_async(&mut conn)
            .await?;
        Ok(declared)
    }

    async fn ensure_declared(&self, queue: &str) -> Result<(), BrokerError> {
        if self.is_declared(queue).await? {
            Ok(())
        } else {
            Err(BrokerError::QueueNotDeclared(queue.to_string()))
        }
    }

    pub(crate) async fn declare(&self, queue: &str) -> Result<(), BrokerError> {
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("SADD")
            .arg(QUEUES_KEY)
            .arg(queue)
            .query_async(&mut conn)
            .await?;
        tracing::debug!("Declared queue {}", queue);
        Ok(())
    }

    pub(crate) async fn publish(&self, queue: &str, message: Message) -> Result<bool, BrokerError> {
        if !self.is_declared(queue).await? {
            tracing::warn!("Dropping message for undeclared queue {}", queue);
            return Ok(false);
        }

        let raw = serde_json::to_string(&Envelope::new(message)?)?;
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(ready_key(queue))
            .arg(raw)
            .query_async(&mut conn)
            .await?;
        Ok(true)
    }

    pub(crate) async fn consume(
        &self,
        queue: &str,
        ack_mode: AckMode,
    ) -> Result<RedisConsumer, BrokerError> {
        self.ensure_declared(queue).await?;

        // Blocking pops hold the connection, so the consumer gets its own
        let blocking = ConnectionManager::new(self.broker.client.clone()).await?;

        Ok(RedisConsumer {
            broker: self.broker.clone(),
            blocking,
            control: self.connection.clone(),
            queue: queue.to_string(),
            ack_mode,
        })
    }

    pub(crate) async fn depth(&self, queue: &str) -> Result<usize, BrokerError> {
        self.ensure_declared(queue).await?;
        let mut conn = self.connection.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(ready_key(queue))
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    pub(crate) async fn dead_letters(&self, queue: &str) -> Result<usize, BrokerError> {
        self.ensure_declared(queue).await?;
        let mut conn = self.connection.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(dead_key(queue))
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }
}

/// Subscription to one Redis list.
pub struct RedisConsumer {
    broker: RedisBroker,
    blocking: ConnectionManager,
    control: ConnectionManager,
    queue: String,
    ack_mode: AckMode,
}

impl RedisConsumer {
    pub async fn next(&mut self) -> Result<Option<Delivery>, BrokerError> {
        let timeout = self.broker.poll_timeout.as_secs_f64();
        let ready = ready_key(&self.queue);

        loop {
            if self.broker.is_closed() {
                return Ok(None);
            }

            let raw: Option<String> = match self.ack_mode {
                AckMode::Auto => {
                    let popped: Option<(String, String)> = redis::cmd("BRPOP")
                        .arg(&ready)
                        .arg(timeout)
                        .query_async(&mut self.blocking)
                        .await?;
                    popped.map(|(_, value)| value)
                }
                AckMode::AfterCompletion => {
                    redis::cmd("BLMOVE")
                        .arg(&ready)
                        .arg(processing_key(&self.queue))
                        .arg("RIGHT")
                        .arg("LEFT")
                        .arg(timeout)
                        .query_async(&mut self.blocking)
                        .await?
                }
            };

            let Some(raw) = raw else {
                continue;
            };

            let envelope = Envelope::parse(&raw);
            let attempt = envelope.attempt;
            let acker = match self.ack_mode {
                AckMode::Auto => Acker::Auto,
                AckMode::AfterCompletion => Acker::Redis(RedisAcker {
                    connection: self.control.clone(),
                    queue: self.queue.clone(),
                    raw,
                    envelope: envelope.clone(),
                }),
            };
            return Ok(Some(Delivery::new(envelope.into_message(), attempt, acker)));
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn ack_mode(&self) -> AckMode {
        self.ack_mode
    }
}

/// Settles one message parked in a processing list.
pub(crate) struct RedisAcker {
    connection: ConnectionManager,
    queue: String,
    /// The exact list element, needed for `LREM`.
    raw: String,
    envelope: Envelope,
}

impl RedisAcker {
    pub(crate) async fn ack(mut self) -> Result<(), BrokerError> {
        let _: i64 = redis::cmd("LREM")
            .arg(processing_key(&self.queue))
            .arg(1)
            .arg(&self.raw)
            .query_async(&mut self.connection)
            .await?;
        Ok(())
    }

    pub(crate) async fn nack(mut self, requeue: bool) -> Result<(), BrokerError> {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("LREM")
            .arg(processing_key(&self.queue))
            .arg(1)
            .arg(&self.raw)
            .ignore();

        if requeue {
            let mut envelope = self.envelope;
            envelope.attempt = envelope.attempt.saturating_add(1);
            // Right end is the consuming end: the retry is next in line
            pipe.cmd("RPUSH")
                .arg(ready_key(&self.queue))
                .arg(serde_json::to_string(&envelope)?)
                .ignore();
        } else {
            pipe.cmd("LPUSH")
                .arg(dead_key(&self.queue))
                .arg(&self.raw)
                .ignore();
        }

        let _: () = pipe.query_async(&mut self.connection).await?;
        Ok(())
    }
}
