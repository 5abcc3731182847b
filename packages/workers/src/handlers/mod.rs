//! Built-in handlers for the three job kinds.

mod callback;
mod mail;
mod persist;

use std::sync::Arc;
use std::time::Duration;

use db::Database;

pub use callback::CallbackHandler;
pub use mail::MailHandler;
pub use persist::PersistHandler;

use crate::handler::Handlers;

/// Simulated work time of each built-in handler.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub persist_delay: Duration,
    pub callback_delay: Duration,
    pub mail_delay: Duration,
    /// Upper bound on one web-hook request.
    pub callback_timeout: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            persist_delay: Duration::from_secs(2),
            callback_delay: Duration::from_secs(30),
            mail_delay: Duration::from_secs(2),
            callback_timeout: Duration::from_secs(10),
        }
    }
}

impl HandlerConfig {
    /// No simulated work at all.
    pub fn immediate() -> Self {
        Self {
            persist_delay: Duration::ZERO,
            callback_delay: Duration::ZERO,
            mail_delay: Duration::ZERO,
            ..Default::default()
        }
    }
}

impl Handlers {
    /// The built-in handler for every kind.
    pub fn standard(db: Database, config: &HandlerConfig) -> Self {
        Self {
            persist: Arc::new(PersistHandler::new(db, config.persist_delay)),
            callback: Arc::new(CallbackHandler::new(
                config.callback_delay,
                config.callback_timeout,
            )),
            mail: Arc::new(MailHandler::new(config.mail_delay)),
        }
    }
}
