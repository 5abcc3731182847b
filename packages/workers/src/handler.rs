//! Job handler trait and the per-kind handler table.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use job_core::{Job, JobKind, JobPayload};

use crate::error::HandlerError;

/// Result type for job handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Future type for async job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Trait for job handlers.
///
/// Implement this trait to define how jobs of one kind are processed. The
/// returned future must own everything it needs; it runs on its own task.
pub trait JobHandler: Send + Sync + 'static {
    /// The job kind this handler processes.
    fn kind(&self) -> JobKind;

    /// Process a job.
    fn handle(&self, job: &Job) -> HandlerFuture;
}

/// One handler for every [`JobKind`].
///
/// Lookup is an exhaustive match on the payload, so a decoded job always
/// has a handler.
#[derive(Clone)]
pub struct Handlers {
    pub(crate) persist: Arc<dyn JobHandler>,
    pub(crate) callback: Arc<dyn JobHandler>,
    pub(crate) mail: Arc<dyn JobHandler>,
}

impl Handlers {
    pub fn new(
        persist: impl JobHandler,
        callback: impl JobHandler,
        mail: impl JobHandler,
    ) -> Result<Self, HandlerError> {
        let handlers = Self {
            persist: Arc::new(persist),
            callback: Arc::new(callback),
            mail: Arc::new(mail),
        };
        for kind in JobKind::ALL {
            let registered = handlers.for_kind(kind).kind();
            if registered != kind {
                return Err(HandlerError::WrongKind {
                    expected: kind,
                    got: registered,
                });
            }
        }
        Ok(handlers)
    }

    /// Replace the handler for the kind it declares.
    pub fn with(mut self, handler: impl JobHandler) -> Self {
        let kind = handler.kind();
        let handler: Arc<dyn JobHandler> = Arc::new(handler);
        match kind {
            JobKind::Persist => self.persist = handler,
            JobKind::Callback => self.callback = handler,
            JobKind::Mail => self.mail = handler,
        }
        self
    }

    pub fn for_kind(&self, kind: JobKind) -> &Arc<dyn JobHandler> {
        match kind {
            JobKind::Persist => &self.persist,
            JobKind::Callback => &self.callback,
            JobKind::Mail => &self.mail,
        }
    }

    pub fn for_job(&self, job: &Job) -> &Arc<dyn JobHandler> {
        match job.payload {
            JobPayload::Persist(_) => &self.persist,
            JobPayload::Callback(_) => &self.callback,
            JobPayload::Mail(_) => &self.mail,
        }
    }
}

/// A simple function-based job handler.
pub struct FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    kind: JobKind,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    /// Create a new function-based handler.
    pub fn new(kind: JobKind, handler: F) -> Self {
        Self { kind, handler }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    fn kind(&self) -> JobKind {
        self.kind
    }

    fn handle(&self, job: &Job) -> HandlerFuture {
        (self.handler)(job)
    }
}

/// Helper macro for creating job handlers from async blocks.
///
/// ```ignore
/// let mail = job_handler!(JobKind::Mail, |job| {
///     tracing::info!("mailing {}", job.id);
///     Ok(())
/// });
/// ```
#[macro_export]
macro_rules! job_handler {
    ($kind:expr, |$job:ident| $body:expr) => {
        $crate::FnHandler::new($kind, |$job: &$crate::__private::Job| {
            let $job = $job.clone();
            Box::pin(async move { $body })
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_core::PersistPayload;

    fn noop(kind: JobKind) -> impl JobHandler {
        FnHandler::new(kind, |_job: &Job| -> HandlerFuture { Box::pin(async { Ok(()) }) })
    }

    #[test]
    fn rejects_handlers_in_the_wrong_slot() {
        let result = Handlers::new(noop(JobKind::Mail), noop(JobKind::Callback), noop(JobKind::Mail));
        assert!(matches!(
            result,
            Err(HandlerError::WrongKind {
                expected: JobKind::Persist,
                got: JobKind::Mail
            })
        ));
    }

    #[test]
    fn routes_by_payload() {
        let handlers = Handlers::new(
            noop(JobKind::Persist),
            noop(JobKind::Callback),
            noop(JobKind::Mail),
        )
        .unwrap();

        let persist = Job::new(JobPayload::Persist(PersistPayload::from_unix(0).unwrap()));
        assert_eq!(handlers.for_job(&persist).kind(), JobKind::Persist);
        assert_eq!(handlers.for_job(&Job::callback(None)).kind(), JobKind::Callback);
        assert_eq!(handlers.for_job(&Job::mail(None)).kind(), JobKind::Mail);
    }

    #[tokio::test]
    async fn with_replaces_only_its_own_kind() {
        let handlers = Handlers::new(
            noop(JobKind::Persist),
            noop(JobKind::Callback),
            noop(JobKind::Mail),
        )
        .unwrap()
        .with(job_handler!(JobKind::Mail, |job| {
            Err(HandlerError::failed(format!("no mail for {}", job.id)))
        }));

        assert!(handlers.for_job(&Job::mail(None)).handle(&Job::mail(None)).await.is_err());
        assert!(
            handlers
                .for_job(&Job::callback(None))
                .handle(&Job::callback(None))
                .await
                .is_ok()
        );
    }
}
