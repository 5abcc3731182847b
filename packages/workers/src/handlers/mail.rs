use std::time::Duration;

use job_core::{Job, JobKind, JobPayload};

use crate::error::HandlerError;
use crate::handler::{HandlerFuture, JobHandler};

/// Simulated mail delivery. Nothing leaves the process; the send is logged.
pub struct MailHandler {
    delay: Duration,
}

impl MailHandler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl JobHandler for MailHandler {
    fn kind(&self) -> JobKind {
        JobKind::Mail
    }

    fn handle(&self, job: &Job) -> HandlerFuture {
        let JobPayload::Mail(payload) = &job.payload else {
            let got = job.kind();
            return Box::pin(async move {
                Err(HandlerError::WrongKind {
                    expected: JobKind::Mail,
                    got,
                })
            });
        };

        let delay = self.delay;
        let job_id = job.id;
        let recipient = payload.email_address.clone();

        Box::pin(async move {
            tokio::time::sleep(delay).await;
            match recipient {
                Some(to) => tracing::info!(job_id = %job_id, %to, "Mail sent"),
                None => tracing::info!(job_id = %job_id, "Mail sent to default recipient"),
            }
            Ok(())
        })
    }
}
