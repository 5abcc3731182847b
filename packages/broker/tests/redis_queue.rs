//! Requires a running Redis: `REDIS_URL=redis://localhost:6379 cargo test -- --ignored`

#![allow(clippy::disallowed_methods)]

use std::error::Error;
use std::time::Duration;

use broker::{AckMode, BrokerConfig, BrokerError, Channel, Connection, Message};
use job_core::JobId;

type TestResult = Result<(), Box<dyn Error>>;

async fn connect() -> Result<(Connection, Channel, String), Box<dyn Error>> {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
    let config = BrokerConfig::new(url)
        .with_retry_interval(Duration::from_millis(200))
        .with_poll_timeout(Duration::from_millis(200));
    let connection = broker::connect(&config).await?;
    let channel = connection.channel().await?;

    // Fresh queue per test so runs do not see each other's messages
    let queue = format!("test-{}", JobId::new());
    channel.queue_declare(&queue).await?;
    Ok((connection, channel, queue))
}

fn text(body: &str) -> Message {
    Message::json(body.as_bytes().to_vec())
}

#[tokio::test]
#[ignore]
async fn test_redis_delivers_in_publish_order() -> TestResult {
    let (connection, channel, queue) = connect().await?;
    for body in ["1", "2", "3"] {
        assert!(channel.publish(&queue, text(body)).await?);
    }
    assert_eq!(channel.queue_depth(&queue).await?, 3);

    let mut consumer = connection.channel().await?.consume(&queue, AckMode::Auto).await?;
    for expected in ["1", "2", "3"] {
        let delivery = consumer.next().await?.ok_or("consumer closed")?;
        assert_eq!(delivery.body(), expected.as_bytes());
        assert_eq!(delivery.attempt, 1);
        assert!(!delivery.needs_settlement());
    }
    assert_eq!(channel.queue_depth(&queue).await?, 0);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_requeue_goes_to_head_with_next_attempt() -> TestResult {
    let (connection, channel, queue) = connect().await?;
    channel.publish(&queue, text("a")).await?;
    channel.publish(&queue, text("b")).await?;

    let mut consumer = connection
        .channel()
        .await?
        .consume(&queue, AckMode::AfterCompletion)
        .await?;

    let first = consumer.next().await?.ok_or("consumer closed")?;
    assert_eq!(first.body(), b"a");
    assert!(first.needs_settlement());
    first.nack(true).await?;

    let again = consumer.next().await?.ok_or("consumer closed")?;
    assert_eq!(again.body(), b"a");
    assert_eq!(again.attempt, 2);
    again.ack().await?;

    let second = consumer.next().await?.ok_or("consumer closed")?;
    assert_eq!(second.body(), b"b");
    second.ack().await?;

    assert_eq!(channel.queue_depth(&queue).await?, 0);
    assert_eq!(channel.dead_letter_count(&queue).await?, 0);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_nack_without_requeue_dead_letters() -> TestResult {
    let (connection, channel, queue) = connect().await?;
    channel.publish(&queue, text("poison")).await?;

    let mut consumer = connection
        .channel()
        .await?
        .consume(&queue, AckMode::AfterCompletion)
        .await?;
    let delivery = consumer.next().await?.ok_or("consumer closed")?;
    delivery.nack(false).await?;

    assert_eq!(channel.dead_letter_count(&queue).await?, 1);
    assert_eq!(channel.queue_depth(&queue).await?, 0);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_undeclared_queue_is_refused() -> TestResult {
    let (_connection, channel, _queue) = connect().await?;
    let missing = format!("missing-{}", JobId::new());

    assert!(!channel.publish(&missing, text("lost")).await?);
    assert!(matches!(
        channel.consume(&missing, AckMode::Auto).await,
        Err(BrokerError::QueueNotDeclared(_))
    ));
    assert!(matches!(
        channel.queue_depth(&missing).await,
        Err(BrokerError::QueueNotDeclared(_))
    ));
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_close_ends_consumers() -> TestResult {
    let (connection, _channel, queue) = connect().await?;
    let mut consumer = connection.channel().await?.consume(&queue, AckMode::Auto).await?;

    let waiting = tokio::spawn(async move { consumer.next().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    connection.close();

    let next = tokio::time::timeout(Duration::from_secs(2), waiting).await???;
    assert!(next.is_none());
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_refuses_non_utf8_bodies() -> TestResult {
    let (_connection, channel, queue) = connect().await?;
    let result = channel
        .publish(&queue, Message::json(vec![b'{', 0xff, b'}']))
        .await;
    assert!(matches!(result, Err(BrokerError::NonUtf8Body(_))));
    assert_eq!(channel.queue_depth(&queue).await?, 0);
    Ok(())
}
