//! Fixed-interval waiting for infrastructure that may not be up yet.

use std::future::Future;
use std::time::Duration;

/// Backoff between connection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Run `attempt` until it succeeds, sleeping `interval` between failures.
///
/// There is no attempt limit: a dependency that never comes up keeps the
/// caller waiting until the process is stopped.
pub async fn wait_for<T, E, F, Fut>(service: &str, interval: Duration, mut attempt: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts: u64 = 0;
    loop {
        attempts += 1;
        match attempt().await {
            Ok(value) => {
                if attempts > 1 {
                    tracing::info!(service, attempts, "{} is available", service);
                }
                return value;
            }
            Err(e) => {
                tracing::warn!(
                    service,
                    attempt = attempts,
                    error = %e,
                    "Waiting for {}. Sleeping for {:?}",
                    service,
                    interval
                );
                tokio::time::sleep(interval).await;
            }
        }
    }
}
