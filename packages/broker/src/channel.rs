//! Per-role handles for publishing and consuming.

use std::str::FromStr;

use job_core::JOB_CONTENT_TYPE;

use crate::error::BrokerError;
use crate::memory::{MemoryBroker, MemoryConsumer};
use crate::redis_queue::{RedisAcker, RedisChannel, RedisConsumer};

/// When a consumed message counts as handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckMode {
    /// Acknowledged on receipt. A crash mid-handler loses the message.
    Auto,
    /// Held by the broker until the consumer acks or nacks it.
    #[default]
    AfterCompletion,
}

impl FromStr for AckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(AckMode::Auto),
            "after_completion" | "manual" => Ok(AckMode::AfterCompletion),
            other => Err(format!("unknown ack mode: {other}")),
        }
    }
}

/// A message as published: content type plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Message {
    /// A message carrying a JSON body.
    pub fn json(body: Vec<u8>) -> Self {
        Self {
            content_type: JOB_CONTENT_TYPE.to_string(),
            body,
        }
    }
}

/// How a delivery is settled with the transport that produced it.
pub(crate) enum Acker {
    /// Already settled on receipt.
    Auto,
    Memory {
        broker: MemoryBroker,
        queue: String,
        tag: u64,
    },
    Redis(RedisAcker),
}

/// A message handed to a consumer.
pub struct Delivery {
    pub message: Message,
    /// 1 on first delivery, incremented on every requeue.
    pub attempt: u32,
    acker: Acker,
}

impl Delivery {
    pub(crate) fn new(message: Message, attempt: u32, acker: Acker) -> Self {
        Self {
            message,
            attempt,
            acker,
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.message.body
    }

    /// Whether the broker is waiting for [`Delivery::ack`] or [`Delivery::nack`].
    pub fn needs_settlement(&self) -> bool {
        !matches!(self.acker, Acker::Auto)
    }

    /// Mark the message as handled. No-op for auto-acknowledged deliveries.
    pub async fn ack(self) -> Result<(), BrokerError> {
        match self.acker {
            Acker::Auto => Ok(()),
            Acker::Memory { broker, queue, tag } => broker.ack(queue, tag),
            Acker::Redis(acker) => acker.ack().await,
        }
    }

    /// Return the message to the queue (`requeue`) or move it to the
    /// queue's dead letters. No-op for auto-acknowledged deliveries.
    pub async fn nack(self, requeue: bool) -> Result<(), BrokerError> {
        match self.acker {
            Acker::Auto => Ok(()),
            Acker::Memory { broker, queue, tag } => broker.nack(queue, tag, requeue),
            Acker::Redis(acker) => acker.nack(requeue).await,
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("content_type", &self.message.content_type)
            .field("len", &self.message.body.len())
            .field("attempt", &self.attempt)
            .field("needs_settlement", &self.needs_settlement())
            .finish()
    }
}

/// A logical session on a [`crate::Connection`].
///
/// Create one per role; do not share a channel between the publishing and
/// the consuming side.
pub enum Channel {
    Memory(MemoryBroker),
    Redis(RedisChannel),
}

impl Channel {
    /// Create the queue if it does not exist. Idempotent.
    pub async fn queue_declare(&self, queue: &str) -> Result<(), BrokerError> {
        match self {
            Channel::Memory(broker) => broker.declare(queue).await,
            Channel::Redis(channel) => channel.declare(queue).await,
        }
    }

    /// Append a message to a queue.
    ///
    /// Publishing is non-mandatory: a message sent to a queue that was never
    /// declared is dropped and `Ok(false)` is returned.
    pub async fn publish(&self, queue: &str, message: Message) -> Result<bool, BrokerError> {
        match self {
            Channel::Memory(broker) => broker.publish(queue, message).await,
            Channel::Redis(channel) => channel.publish(queue, message).await,
        }
    }

    /// Start consuming a declared queue.
    pub async fn consume(&self, queue: &str, ack_mode: AckMode) -> Result<Consumer, BrokerError> {
        match self {
            Channel::Memory(broker) => Ok(Consumer::Memory(broker.consume(queue, ack_mode).await?)),
            Channel::Redis(channel) => Ok(Consumer::Redis(channel.consume(queue, ack_mode).await?)),
        }
    }

    /// Number of messages waiting for a consumer.
    pub async fn queue_depth(&self, queue: &str) -> Result<usize, BrokerError> {
        match self {
            Channel::Memory(broker) => broker.depth(queue).await,
            Channel::Redis(channel) => channel.depth(queue).await,
        }
    }

    /// Number of messages moved to the queue's dead letters.
    pub async fn dead_letter_count(&self, queue: &str) -> Result<usize, BrokerError> {
        match self {
            Channel::Memory(broker) => broker.dead_letters(queue).await,
            Channel::Redis(channel) => channel.dead_letters(queue).await,
        }
    }
}

/// A subscription to one queue.
pub enum Consumer {
    Memory(MemoryConsumer),
    Redis(RedisConsumer),
}

impl Consumer {
    /// Wait for the next delivery.
    ///
    /// `Ok(None)` means the transport shut down and no more deliveries
    /// will arrive.
    pub async fn next(&mut self) -> Result<Option<Delivery>, BrokerError> {
        match self {
            Consumer::Memory(consumer) => consumer.next().await,
            Consumer::Redis(consumer) => consumer.next().await,
        }
    }

    pub fn queue(&self) -> &str {
        match self {
            Consumer::Memory(consumer) => consumer.queue(),
            Consumer::Redis(consumer) => consumer.queue(),
        }
    }

    pub fn ack_mode(&self) -> AckMode {
        match self {
            Consumer::Memory(consumer) => consumer.ack_mode(),
            Consumer::Redis(consumer) => consumer.ack_mode(),
        }
    }
}
