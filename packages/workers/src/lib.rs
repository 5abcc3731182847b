//! Worker pool for the job dispatch engine.
//!
//! The [`Dispatcher`] consumes the job queue, hands each job to the
//! [`JobHandler`] registered for its kind and records `STARTED`, then
//! `DONE` or `FAILED`, in the status store.
//!
//! # Example
//!
//! ```ignore
//! use workers::{Dispatcher, DispatcherConfig, HandlerConfig, Handlers};
//!
//! let handlers = Handlers::standard(db.clone(), &HandlerConfig::default());
//! let dispatcher = Dispatcher::new(handlers, store, DispatcherConfig::default());
//! let consumer = dispatcher.consume(&connection.channel().await?).await?;
//! let task = dispatcher.spawn(consumer);
//! ```

mod dispatcher;
mod error;
mod handler;
pub mod handlers;

pub use dispatcher::{Dispatcher, DispatcherConfig, MalformedPolicy};
pub use error::{DispatchError, HandlerError};
pub use handler::{FnHandler, HandlerFuture, HandlerResult, Handlers, JobHandler};
pub use handlers::{CallbackHandler, HandlerConfig, MailHandler, PersistHandler};

#[doc(hidden)]
pub mod __private {
    pub use job_core::Job;
}
