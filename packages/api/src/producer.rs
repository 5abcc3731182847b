//! The job server: turns requests into jobs on the queue.

use broker::{BrokerError, Channel, Connection, Message};
use job_core::{CallbackPayload, Job, JobError, JobPayload, MailPayload, PersistPayload};
use thiserror::Error;

/// Why a job was not submitted.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The caller sent a bad parameter. Nothing was published.
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Failed to encode job: {0}")]
    Encode(#[from] JobError),

    #[error("Failed to publish job: {0}")]
    Publish(#[from] BrokerError),
}

impl SubmitError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        SubmitError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Publishes jobs to one queue on its own channel.
pub struct JobServer {
    channel: Channel,
    queue: String,
}

impl JobServer {
    /// Open a channel on `connection` and declare `queue`.
    pub async fn new(connection: &Connection, queue: impl Into<String>) -> Result<Self, BrokerError> {
        let queue = queue.into();
        let channel = connection.channel().await?;
        channel.queue_declare(&queue).await?;
        Ok(Self { channel, queue })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Messages waiting on the queue.
    pub async fn queue_depth(&self) -> Result<usize, BrokerError> {
        self.channel.queue_depth(&self.queue).await
    }

    /// Build a job with a fresh id and publish it.
    ///
    /// Returns as soon as the broker has the message; the job has not run.
    pub async fn submit(&self, payload: JobPayload) -> Result<Job, SubmitError> {
        let job = Job::new(payload);
        let body = job.to_json()?;

        let published = self.channel.publish(&self.queue, Message::json(body)).await?;
        if published {
            tracing::info!(job_id = %job.id, kind = %job.kind(), queue = %self.queue, "Job queued");
        } else {
            tracing::warn!(job_id = %job.id, queue = %self.queue, "Queue not declared, job dropped");
        }

        Ok(job)
    }

    /// Submit a persist job. `client_time` is unix seconds.
    pub async fn submit_persist(&self, client_time: Option<&str>) -> Result<Job, SubmitError> {
        let raw = client_time
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SubmitError::invalid("client_time", "missing"))?;
        let secs: i64 = raw
            .parse()
            .map_err(|_| SubmitError::invalid("client_time", format!("{raw:?} is not unix seconds")))?;
        let payload = PersistPayload::from_unix(secs)
            .map_err(|e| SubmitError::invalid("client_time", e.to_string()))?;

        self.submit(JobPayload::Persist(payload)).await
    }

    /// Submit a callback job, optionally reporting to `callback_url`.
    pub async fn submit_callback(&self, callback_url: Option<String>) -> Result<Job, SubmitError> {
        let callback_url = callback_url.filter(|url| !url.trim().is_empty());
        if let Some(url) = &callback_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(SubmitError::invalid("callback_url", "must be an http(s) URL"));
        }

        self.submit(JobPayload::Callback(CallbackPayload { callback_url }))
            .await
    }

    /// Submit a mail job.
    pub async fn submit_mail(&self, email_address: Option<String>) -> Result<Job, SubmitError> {
        let email_address = email_address.filter(|addr| !addr.trim().is_empty());
        if let Some(addr) = &email_address
            && !addr.contains('@')
        {
            return Err(SubmitError::invalid("email_address", "not an email address"));
        }

        self.submit(JobPayload::Mail(MailPayload { email_address }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::{AckMode, BrokerConfig};
    use job_core::JobKind;
    use std::collections::HashSet;

    async fn server() -> (Connection, JobServer) {
        let connection = broker::connect(&BrokerConfig::memory()).await.unwrap();
        let server = JobServer::new(&connection, "job").await.unwrap();
        (connection, server)
    }

    #[tokio::test]
    async fn persist_job_is_published() {
        let (connection, server) = server().await;

        let job = server.submit_persist(Some("1700000000")).await.unwrap();
        assert_eq!(job.kind(), JobKind::Persist);
        assert_eq!(server.queue_depth().await.unwrap(), 1);

        let mut consumer = connection
            .channel()
            .await
            .unwrap()
            .consume("job", AckMode::Auto)
            .await
            .unwrap();
        let delivery = consumer.next().await.unwrap().unwrap();
        assert_eq!(delivery.message.content_type, "application/json");
        assert_eq!(Job::decode(delivery.body()).unwrap(), job);
    }

    #[tokio::test]
    async fn bad_client_time_publishes_nothing() {
        let (_connection, server) = server().await;

        for raw in [None, Some(""), Some("yesterday"), Some("1.5"), Some("99999999999999999")] {
            let result = server.submit_persist(raw).await;
            assert!(
                matches!(
                    result,
                    Err(SubmitError::InvalidParameter {
                        name: "client_time",
                        ..
                    })
                ),
                "{raw:?} was accepted"
            );
        }
        assert_eq!(server.queue_depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn optional_parameters_are_validated() {
        let (_connection, server) = server().await;

        assert!(server.submit_callback(None).await.is_ok());
        assert!(server.submit_callback(Some("ftp://x".into())).await.is_err());
        assert!(server.submit_mail(Some(String::new())).await.is_ok());
        assert!(server.submit_mail(Some("nobody".into())).await.is_err());
        assert_eq!(server.queue_depth().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let (_connection, server) = server().await;
        let mut ids = HashSet::new();
        for _ in 0..50 {
            let job = server.submit_mail(None).await.unwrap();
            assert!(ids.insert(job.id));
        }
    }
}
