use std::time::Duration;

use job_core::{Job, JobKind, JobPayload, JobState};
use serde::Serialize;

use crate::error::HandlerError;
use crate::handler::{HandlerFuture, JobHandler};

/// Long-running work that reports to the job's web-hook when it is done.
pub struct CallbackHandler {
    client: reqwest::Client,
    delay: Duration,
    timeout: Duration,
}

/// Body POSTed to `callback_url`.
#[derive(Debug, Serialize)]
struct CallbackBody {
    uuid: String,
    status: JobState,
}

impl CallbackHandler {
    pub fn new(delay: Duration, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            delay,
            timeout,
        }
    }
}

impl JobHandler for CallbackHandler {
    fn kind(&self) -> JobKind {
        JobKind::Callback
    }

    fn handle(&self, job: &Job) -> HandlerFuture {
        let JobPayload::Callback(payload) = &job.payload else {
            let got = job.kind();
            return Box::pin(async move {
                Err(HandlerError::WrongKind {
                    expected: JobKind::Callback,
                    got,
                })
            });
        };

        let client = self.client.clone();
        let delay = self.delay;
        let timeout = self.timeout;
        let job_id = job.id;
        let url = payload.callback_url.clone();

        Box::pin(async move {
            tokio::time::sleep(delay).await;

            let Some(url) = url else {
                tracing::debug!(job_id = %job_id, "No callback_url, nothing to notify");
                return Ok(());
            };

            let response = client
                .post(&url)
                .timeout(timeout)
                .json(&CallbackBody {
                    uuid: job_id.to_string(),
                    status: JobState::Done,
                })
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(HandlerError::CallbackRejected {
                    url,
                    status: status.as_u16(),
                });
            }

            tracing::info!(job_id = %job_id, %url, "Callback delivered");
            Ok(())
        })
    }
}
