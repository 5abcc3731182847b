//! The worker pool: consumes the job queue and runs each job on its handler.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use broker::{AckMode, Channel, Connection, Consumer, Delivery};
use chrono::Utc;
use db::StatusStore;
use job_core::retry::DEFAULT_RETRY_INTERVAL;
use job_core::{DEFAULT_QUEUE, DecodeError, Job, JobEvent, JobId, JobState};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinHandle;

use crate::error::DispatchError;
use crate::handler::Handlers;

/// Capacity of the event channel. Slow subscribers miss events.
const EVENT_CAPACITY: usize = 1024;

/// What to do with a message that is not a valid job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Log it, settle the delivery and keep consuming.
    #[default]
    Skip,
    /// Stop the run loop with [`DispatchError::Malformed`].
    Abort,
}

impl FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(MalformedPolicy::Skip),
            "abort" => Ok(MalformedPolicy::Abort),
            other => Err(format!("unknown malformed-message policy: {other}")),
        }
    }
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Queue to consume.
    pub queue: String,
    pub ack_mode: AckMode,
    /// Handler tasks allowed at once. `None` means no limit.
    pub max_in_flight: Option<usize>,
    /// Deliveries of one message before it is dead-lettered.
    /// Only applies with [`AckMode::AfterCompletion`].
    pub max_attempts: u32,
    pub on_malformed: MalformedPolicy,
    /// Pause after a failed receive before trying again.
    pub retry_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            ack_mode: AckMode::AfterCompletion,
            max_in_flight: Some(32),
            max_attempts: 3,
            on_malformed: MalformedPolicy::Skip,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl DispatcherConfig {
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    /// Bound concurrent handler tasks. `None` or `Some(0)` removes the bound.
    pub fn with_max_in_flight(mut self, max_in_flight: Option<usize>) -> Self {
        self.max_in_flight = max_in_flight.filter(|n| *n > 0);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_on_malformed(mut self, policy: MalformedPolicy) -> Self {
        self.on_malformed = policy;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }
}

struct Inner {
    handlers: Handlers,
    store: Arc<dyn StatusStore>,
    events: broadcast::Sender<JobEvent>,
    config: DispatcherConfig,
}

/// Routes queued jobs to their handlers and records their status.
///
/// Cloning is cheap; clones share handlers, store and event channel.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(handlers: Handlers, store: Arc<dyn StatusStore>, config: DispatcherConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                handlers,
                store,
                events,
                config,
            }),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Subscribe to job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Declare the queue and start consuming it on `channel`.
    pub async fn consume(&self, channel: &Channel) -> Result<Consumer, DispatchError> {
        let config = &self.inner.config;
        channel.queue_declare(&config.queue).await?;
        Ok(channel.consume(&config.queue, config.ack_mode).await?)
    }

    /// Consume on a fresh channel of `connection` until the broker closes.
    pub async fn run(&self, connection: &Connection) -> Result<(), DispatchError> {
        let channel = connection.channel().await?;
        let consumer = self.consume(&channel).await?;
        self.run_consumer(consumer).await
    }

    /// Run the receive loop on a background task.
    pub fn spawn(&self, consumer: Consumer) -> JoinHandle<Result<(), DispatchError>> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.run_consumer(consumer).await })
    }

    /// The receive loop.
    ///
    /// Returns `Ok(())` once the broker is closed. Each job runs on its own
    /// task; with `max_in_flight` set, no message is taken off the queue
    /// while that many are running.
    pub async fn run_consumer(&self, mut consumer: Consumer) -> Result<(), DispatchError> {
        let config = &self.inner.config;
        // Zero means no limit, whichever way the config was built
        let limit = config
            .max_in_flight
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));

        tracing::info!(
            queue = %config.queue,
            ack_mode = ?config.ack_mode,
            max_in_flight = ?config.max_in_flight,
            "Dispatcher started"
        );

        loop {
            let permit = match &limit {
                Some(semaphore) => match semaphore.clone().acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => break,
                },
                None => None,
            };

            let delivery = match consumer.next().await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Failed to receive from queue. Retrying in {:?}",
                        config.retry_interval
                    );
                    tokio::time::sleep(config.retry_interval).await;
                    continue;
                }
            };

            let job = match Job::decode(delivery.body()) {
                Ok(job) => job,
                Err(e) => {
                    self.discard(delivery, &e).await;
                    if matches!(e, DecodeError::UnknownKind { .. })
                        || config.on_malformed == MalformedPolicy::Skip
                    {
                        continue;
                    }
                    tracing::error!(error = %e, "Stopping dispatcher on malformed message");
                    return Err(DispatchError::Malformed(e));
                }
            };

            let dispatcher = self.clone();
            tokio::spawn(async move {
                dispatcher.process(job, delivery).await;
                drop(permit);
            });
        }

        tracing::info!(queue = %config.queue, "Broker closed, dispatcher stopped");
        Ok(())
    }

    /// Settle a message that never became a job.
    ///
    /// Unknown kinds are acknowledged and dropped. Anything else is
    /// dead-lettered when the broker holds it.
    async fn discard(&self, delivery: Delivery, error: &DecodeError) {
        let job_id = error.job_id();
        let settled = match error {
            DecodeError::UnknownKind { code, .. } => {
                tracing::warn!(job_id = ?job_id, code = %code, "Dropping job of unknown type");
                delivery.ack().await
            }
            _ => {
                tracing::error!(job_id = ?job_id, error = %error, "Dropping malformed message");
                delivery.nack(false).await
            }
        };
        if let Err(e) = settled {
            tracing::warn!(error = %e, "Failed to settle dropped message");
        }

        self.emit(JobEvent::MessageDropped {
            job_id,
            reason: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Run one job and settle its delivery.
    async fn process(&self, job: Job, delivery: Delivery) {
        let job_id = job.id;
        let kind = job.kind();
        let attempt = delivery.attempt;
        let store = &self.inner.store;

        self.emit(JobEvent::JobReceived {
            job_id,
            kind,
            attempt,
            timestamp: Utc::now(),
        });

        // Redelivery of a job that already finished
        match store.get(job_id).await {
            Ok(JobState::Done) => {
                tracing::info!(job_id = %job_id, %kind, attempt, "Job already done, skipping");
                self.settle(job_id, delivery, Settlement::Ack).await;
                self.emit(JobEvent::JobSkipped {
                    job_id,
                    kind,
                    timestamp: Utc::now(),
                });
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to read job status");
            }
        }

        self.record(job_id, JobState::Started).await;
        self.emit(JobEvent::JobStarted {
            job_id,
            kind,
            timestamp: Utc::now(),
        });
        tracing::debug!(job_id = %job_id, %kind, attempt, "Running job");

        let started = Instant::now();
        let handler = self.inner.handlers.for_job(&job).clone();
        let outcome = tokio::spawn(async move { handler.handle(&job).await }).await;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) if e.is_panic() => Some(format!("handler panicked: {}", panic_message(e))),
            Err(e) => Some(format!("handler task failed: {}", e)),
        };

        match error {
            None => {
                let duration_ms = started.elapsed().as_millis() as u64;
                self.record(job_id, JobState::Done).await;
                self.settle(job_id, delivery, Settlement::Ack).await;
                tracing::info!(job_id = %job_id, %kind, duration_ms, "Job done");
                self.emit(JobEvent::JobCompleted {
                    job_id,
                    kind,
                    duration_ms,
                    timestamp: Utc::now(),
                });
            }
            Some(error) => {
                let will_retry =
                    delivery.needs_settlement() && attempt < self.inner.config.max_attempts;
                self.record(job_id, JobState::Failed).await;
                tracing::error!(
                    job_id = %job_id,
                    %kind,
                    attempt,
                    will_retry,
                    error = %error,
                    "Job failed"
                );
                let settlement = if will_retry {
                    Settlement::Requeue
                } else {
                    Settlement::DeadLetter
                };
                self.settle(job_id, delivery, settlement).await;
                self.emit(JobEvent::JobFailed {
                    job_id,
                    kind,
                    error,
                    attempt,
                    will_retry,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    async fn record(&self, job_id: JobId, state: JobState) {
        if let Err(e) = self.inner.store.set(job_id, state).await {
            tracing::warn!(
                job_id = %job_id,
                %state,
                store = self.inner.store.backend(),
                error = %e,
                "Failed to write job status"
            );
        }
    }

    async fn settle(&self, job_id: JobId, delivery: Delivery, settlement: Settlement) {
        let result = match settlement {
            Settlement::Ack => delivery.ack().await,
            Settlement::Requeue => delivery.nack(true).await,
            Settlement::DeadLetter => delivery.nack(false).await,
        };
        if let Err(e) = result {
            tracing::warn!(job_id = %job_id, ?settlement, error = %e, "Failed to settle delivery");
        }
    }

    fn emit(&self, event: JobEvent) {
        tracing::trace!("{}", event.description());
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }
}

#[derive(Debug, Clone, Copy)]
enum Settlement {
    Ack,
    Requeue,
    DeadLetter,
}

fn panic_message(error: tokio::task::JoinError) -> String {
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_in_flight_means_unbounded() {
        let config = DispatcherConfig::default().with_max_in_flight(Some(0));
        assert_eq!(config.max_in_flight, None);
        let config = DispatcherConfig::default().with_max_in_flight(Some(4));
        assert_eq!(config.max_in_flight, Some(4));
    }

    #[test]
    fn parses_malformed_policy() {
        assert_eq!("Skip".parse::<MalformedPolicy>(), Ok(MalformedPolicy::Skip));
        assert_eq!(" abort ".parse::<MalformedPolicy>(), Ok(MalformedPolicy::Abort));
        assert!("retry".parse::<MalformedPolicy>().is_err());
    }

    #[tokio::test]
    async fn panic_message_is_extracted() {
        let err = tokio::spawn(async {
            let missing: Option<u32> = None;
            missing.expect("boom")
        })
        .await
        .unwrap_err();
        assert_eq!(panic_message(err), "boom");
    }
}
