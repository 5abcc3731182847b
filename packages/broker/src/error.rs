use thiserror::Error;

/// Errors raised by the queue transport.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Invalid broker endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Queue {0:?} has not been declared")]
    QueueNotDeclared(String),

    #[error("Broker is closed")]
    Closed,

    #[error("Failed to start broker: {0}")]
    Spawn(String),

    #[error("Message body is not UTF-8: {0}")]
    NonUtf8Body(#[from] std::string::FromUtf8Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Envelope error: {0}")]
    Envelope(#[from] serde_json::Error),
}
