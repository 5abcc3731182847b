//! In-process transport: a Ractor actor owning named FIFO queues.

use std::collections::{HashMap, VecDeque};

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};

use crate::channel::{AckMode, Acker, Delivery, Message};
use crate::error::BrokerError;

#[derive(Debug, Clone)]
struct Envelope {
    message: Message,
    attempt: u32,
}

/// A message handed from the actor to a parked consumer.
#[derive(Debug)]
pub struct MemoryDelivery {
    message: Message,
    attempt: u32,
    /// Set when the broker holds the message until it is settled.
    tag: Option<u64>,
}

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum BrokerMessage {
    /// Create a queue if it does not exist.
    Declare {
        queue: String,
        reply: RpcReplyPort<()>,
    },

    /// Append a message. Replies `false` when the queue is unknown.
    Publish {
        queue: String,
        message: Message,
        reply: RpcReplyPort<bool>,
    },

    /// Wait for the next message on a queue.
    ///
    /// The reply is held until a message is available.
    Fetch {
        queue: String,
        ack_mode: AckMode,
        reply: RpcReplyPort<Option<MemoryDelivery>>,
    },

    /// Settle a delivery as handled.
    Ack { queue: String, tag: u64 },

    /// Settle a delivery as failed.
    Nack {
        queue: String,
        tag: u64,
        requeue: bool,
    },

    /// Ready message count, `None` for an unknown queue.
    Depth {
        queue: String,
        reply: RpcReplyPort<Option<usize>>,
    },

    /// Dead letter count, `None` for an unknown queue.
    DeadLetters {
        queue: String,
        reply: RpcReplyPort<Option<usize>>,
    },

    /// Stop the actor. Parked consumers see the broker as closed.
    Shutdown,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Envelope>,
    waiters: VecDeque<(AckMode, RpcReplyPort<Option<MemoryDelivery>>)>,
    unacked: HashMap<u64, Envelope>,
    dead: Vec<Envelope>,
}

impl QueueState {
    /// Hand ready messages to parked consumers, oldest first on both sides.
    fn pump(&mut self, next_tag: &mut u64) {
        loop {
            let Some((ack_mode, reply)) = self.waiters.pop_front() else {
                break;
            };
            let Some(envelope) = self.ready.pop_front() else {
                self.waiters.push_front((ack_mode, reply));
                break;
            };

            let tag = match ack_mode {
                AckMode::Auto => None,
                AckMode::AfterCompletion => {
                    *next_tag += 1;
                    Some(*next_tag)
                }
            };

            let delivery = MemoryDelivery {
                message: envelope.message.clone(),
                attempt: envelope.attempt,
                tag,
            };

            // The consumer went away while parked
            if reply.send(Some(delivery)).is_err() {
                self.ready.push_front(envelope);
                continue;
            }

            if let Some(tag) = tag {
                self.unacked.insert(tag, envelope);
            }
        }
    }
}

/// State for the queue actor.
#[derive(Default)]
pub struct BrokerState {
    queues: HashMap<String, QueueState>,
    next_tag: u64,
}

/// Actor owning every in-memory queue of one broker.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = BrokerMessage;
    type State = BrokerState;
    type Arguments = ();

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        _args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting in-memory broker");
        Ok(BrokerState::default())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            BrokerMessage::Declare { queue, reply } => {
                if !state.queues.contains_key(&queue) {
                    tracing::debug!("Declared queue {}", queue);
                    state.queues.insert(queue, QueueState::default());
                }
                let _ = reply.send(());
            }

            BrokerMessage::Publish {
                queue,
                message,
                reply,
            } => {
                let BrokerState { queues, next_tag } = state;
                match queues.get_mut(&queue) {
                    Some(q) => {
                        q.ready.push_back(Envelope {
                            message,
                            attempt: 1,
                        });
                        q.pump(next_tag);
                        let _ = reply.send(true);
                    }
                    None => {
                        tracing::warn!("Dropping message for undeclared queue {}", queue);
                        let _ = reply.send(false);
                    }
                }
            }

            BrokerMessage::Fetch {
                queue,
                ack_mode,
                reply,
            } => {
                let BrokerState { queues, next_tag } = state;
                match queues.get_mut(&queue) {
                    Some(q) => {
                        q.waiters.push_back((ack_mode, reply));
                        q.pump(next_tag);
                    }
                    None => {
                        let _ = reply.send(None);
                    }
                }
            }

            BrokerMessage::Ack { queue, tag } => {
                if let Some(q) = state.queues.get_mut(&queue)
                    && q.unacked.remove(&tag).is_none()
                {
                    tracing::warn!("Ack for unknown delivery {} on {}", tag, queue);
                }
            }

            BrokerMessage::Nack {
                queue,
                tag,
                requeue,
            } => {
                let BrokerState { queues, next_tag } = state;
                if let Some(q) = queues.get_mut(&queue) {
                    match q.unacked.remove(&tag) {
                        Some(mut envelope) if requeue => {
                            envelope.attempt = envelope.attempt.saturating_add(1);
                            q.ready.push_front(envelope);
                            q.pump(next_tag);
                        }
                        Some(envelope) => {
                            tracing::debug!("Dead-lettering delivery {} on {}", tag, queue);
                            q.dead.push(envelope);
                        }
                        None => {
                            tracing::warn!("Nack for unknown delivery {} on {}", tag, queue);
                        }
                    }
                }
            }

            BrokerMessage::Depth { queue, reply } => {
                let _ = reply.send(state.queues.get(&queue).map(|q| q.ready.len()));
            }

            BrokerMessage::DeadLetters { queue, reply } => {
                let _ = reply.send(state.queues.get(&queue).map(|q| q.dead.len()));
            }

            BrokerMessage::Shutdown => {
                tracing::info!("Stopping in-memory broker");
                myself.stop(None);
            }
        }
        Ok(())
    }
}

/// Handle to a running [`QueueActor`]. Clones share the same queues.
#[derive(Clone)]
pub struct MemoryBroker {
    actor: ActorRef<BrokerMessage>,
}

impl MemoryBroker {
    /// Spawn a new broker actor with no queues.
    pub async fn start() -> Result<Self, BrokerError> {
        let (actor, _handle) = Actor::spawn(None, QueueActor, ())
            .await
            .map_err(|e| BrokerError::Spawn(e.to_string()))?;
        Ok(Self { actor })
    }

    /// Stop the actor. Later calls fail with [`BrokerError::Closed`].
    pub fn stop(&self) {
        let _ = self.actor.send_message(BrokerMessage::Shutdown);
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(RpcReplyPort<T>) -> BrokerMessage,
    ) -> Result<T, BrokerError>
    where
        T: Send + 'static,
    {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(build(tx.into()))
            .map_err(|_| BrokerError::Closed)?;
        rx.await.map_err(|_| BrokerError::Closed)
    }

    pub(crate) async fn declare(&self, queue: &str) -> Result<(), BrokerError> {
        let queue = queue.to_string();
        self.call(|reply| BrokerMessage::Declare { queue, reply })
            .await
    }

    pub(crate) async fn publish(&self, queue: &str, message: Message) -> Result<bool, BrokerError> {
        let queue = queue.to_string();
        self.call(|reply| BrokerMessage::Publish {
            queue,
            message,
            reply,
        })
        .await
    }

    pub(crate) async fn consume(
        &self,
        queue: &str,
        ack_mode: AckMode,
    ) -> Result<MemoryConsumer, BrokerError> {
        // Fails with QueueNotDeclared or Closed
        self.depth(queue).await?;
        Ok(MemoryConsumer {
            broker: self.clone(),
            queue: queue.to_string(),
            ack_mode,
        })
    }

    pub(crate) async fn depth(&self, queue: &str) -> Result<usize, BrokerError> {
        let name = queue.to_string();
        self.call(|reply| BrokerMessage::Depth { queue: name, reply })
            .await?
            .ok_or_else(|| BrokerError::QueueNotDeclared(queue.to_string()))
    }

    pub(crate) async fn dead_letters(&self, queue: &str) -> Result<usize, BrokerError> {
        let name = queue.to_string();
        self.call(|reply| BrokerMessage::DeadLetters { queue: name, reply })
            .await?
            .ok_or_else(|| BrokerError::QueueNotDeclared(queue.to_string()))
    }

    pub(crate) fn ack(&self, queue: String, tag: u64) -> Result<(), BrokerError> {
        self.actor
            .send_message(BrokerMessage::Ack { queue, tag })
            .map_err(|_| BrokerError::Closed)
    }

    pub(crate) fn nack(&self, queue: String, tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.actor
            .send_message(BrokerMessage::Nack {
                queue,
                tag,
                requeue,
            })
            .map_err(|_| BrokerError::Closed)
    }
}

/// Subscription to one in-memory queue.
pub struct MemoryConsumer {
    broker: MemoryBroker,
    queue: String,
    ack_mode: AckMode,
}

impl MemoryConsumer {
    pub async fn next(&mut self) -> Result<Option<Delivery>, BrokerError> {
        let (tx, rx) = ractor::concurrency::oneshot();
        let fetch = BrokerMessage::Fetch {
            queue: self.queue.clone(),
            ack_mode: self.ack_mode,
            reply: tx.into(),
        };
        if self.broker.actor.send_message(fetch).is_err() {
            return Ok(None);
        }

        // A dropped reply port means the actor stopped
        let Ok(Some(handoff)) = rx.await else {
            return Ok(None);
        };

        let acker = match handoff.tag {
            Some(tag) => Acker::Memory {
                broker: self.broker.clone(),
                queue: self.queue.clone(),
                tag,
            },
            None => Acker::Auto,
        };
        Ok(Some(Delivery::new(handoff.message, handoff.attempt, acker)))
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn ack_mode(&self) -> AckMode {
        self.ack_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn text(body: &str) -> Message {
        Message::json(body.as_bytes().to_vec())
    }

    async fn broker_with_queue() -> MemoryBroker {
        let broker = MemoryBroker::start().await.unwrap();
        broker.declare("job").await.unwrap();
        broker
    }

    #[tokio::test]
    async fn publish_to_undeclared_queue_is_dropped() {
        let broker = MemoryBroker::start().await.unwrap();
        assert!(!broker.publish("missing", text("1")).await.unwrap());
        assert!(matches!(
            broker.depth("missing").await,
            Err(BrokerError::QueueNotDeclared(_))
        ));
    }

    #[tokio::test]
    async fn consume_undeclared_queue_fails() {
        let broker = MemoryBroker::start().await.unwrap();
        let result = broker.consume("missing", AckMode::Auto).await;
        assert!(matches!(result, Err(BrokerError::QueueNotDeclared(_))));
    }

    #[tokio::test]
    async fn consume_after_stop_reports_closed() {
        let broker = broker_with_queue().await;
        broker.stop();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            match broker.consume("job", AckMode::Auto).await {
                Err(BrokerError::Closed) => break,
                Err(other) => panic!("unexpected error {other:?}"),
                // The actor may still be draining the shutdown message
                Ok(_) => assert!(tokio::time::Instant::now() < deadline, "broker never closed"),
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let broker = broker_with_queue().await;
        for body in ["1", "2", "3"] {
            assert!(broker.publish("job", text(body)).await.unwrap());
        }
        assert_eq!(broker.depth("job").await.unwrap(), 3);

        let mut consumer = broker.consume("job", AckMode::Auto).await.unwrap();
        for expected in ["1", "2", "3"] {
            let delivery = consumer.next().await.unwrap().unwrap();
            assert_eq!(delivery.body(), expected.as_bytes());
            assert_eq!(delivery.attempt, 1);
            assert!(!delivery.needs_settlement());
        }
        assert_eq!(broker.depth("job").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn declare_is_idempotent() {
        let broker = broker_with_queue().await;
        broker.publish("job", text("kept")).await.unwrap();
        broker.declare("job").await.unwrap();
        assert_eq!(broker.depth("job").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn nack_with_requeue_redelivers_with_next_attempt() {
        let broker = broker_with_queue().await;
        broker.publish("job", text("a")).await.unwrap();
        broker.publish("job", text("b")).await.unwrap();

        let mut consumer = broker.consume("job", AckMode::AfterCompletion).await.unwrap();
        let first = consumer.next().await.unwrap().unwrap();
        assert_eq!(first.body(), b"a");
        first.nack(true).await.unwrap();

        // Requeued messages go back to the head of the queue
        let again = consumer.next().await.unwrap().unwrap();
        assert_eq!(again.body(), b"a");
        assert_eq!(again.attempt, 2);
        again.ack().await.unwrap();

        let second = consumer.next().await.unwrap().unwrap();
        assert_eq!(second.body(), b"b");
        second.ack().await.unwrap();

        assert_eq!(broker.depth("job").await.unwrap(), 0);
        assert_eq!(broker.dead_letters("job").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn nack_without_requeue_dead_letters() {
        let broker = broker_with_queue().await;
        broker.publish("job", text("poison")).await.unwrap();

        let mut consumer = broker.consume("job", AckMode::AfterCompletion).await.unwrap();
        let delivery = consumer.next().await.unwrap().unwrap();
        delivery.nack(false).await.unwrap();

        assert_eq!(broker.dead_letters("job").await.unwrap(), 1);
        assert_eq!(broker.depth("job").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn parked_consumer_receives_later_publish() {
        let broker = broker_with_queue().await;
        let mut consumer = broker.consume("job", AckMode::Auto).await.unwrap();

        let waiting = tokio::spawn(async move { consumer.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.publish("job", text("late")).await.unwrap();

        let delivery = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(delivery.body(), b"late");
    }

    #[tokio::test]
    async fn abandoned_fetch_does_not_lose_messages() {
        let broker = broker_with_queue().await;
        let mut abandoned = broker.consume("job", AckMode::Auto).await.unwrap();

        // Park a fetch, then drop it before anything is published
        let parked = tokio::time::timeout(Duration::from_millis(20), abandoned.next()).await;
        assert!(parked.is_err());

        broker.publish("job", text("kept")).await.unwrap();

        let mut consumer = broker.consume("job", AckMode::Auto).await.unwrap();
        let delivery = consumer.next().await.unwrap().unwrap();
        assert_eq!(delivery.body(), b"kept");
    }

    #[tokio::test]
    async fn stop_closes_consumers() {
        let broker = broker_with_queue().await;
        let mut consumer = broker.consume("job", AckMode::Auto).await.unwrap();

        let waiting = tokio::spawn(async move { consumer.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.stop();

        let next = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(next.is_none());
    }
}
