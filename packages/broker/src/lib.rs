//! Queue transport for the job dispatch engine.
//!
//! One [`Connection`] per process, opened with [`connect`]; every role
//! (producer, dispatcher) derives its own [`Channel`] from it.
//!
//! # Transports
//!
//! - `memory://` - `QueueActor`, a Ractor actor holding named FIFO queues
//!   inside the process
//! - `redis://` - Redis lists, shared between processes
//!
//! # Usage
//!
//! ```ignore
//! use broker::{AckMode, BrokerConfig, Message, connect};
//!
//! let connection = connect(&BrokerConfig::memory()).await?;
//! let channel = connection.channel().await?;
//! channel.queue_declare("job").await?;
//! channel.publish("job", Message::json(body)).await?;
//!
//! let mut consumer = connection.channel().await?.consume("job", AckMode::Auto).await?;
//! while let Some(delivery) = consumer.next().await? { ... }
//! ```

mod channel;
mod connection;
mod error;
mod memory;
mod redis_queue;

pub use channel::{AckMode, Channel, Consumer, Delivery, Message};
pub use connection::{BrokerConfig, Connection, connect};
pub use error::BrokerError;
pub use memory::{BrokerMessage, BrokerState, MemoryBroker, MemoryConsumer, MemoryDelivery, QueueActor};
pub use redis_queue::{RedisBroker, RedisChannel, RedisConsumer};
