#![allow(dead_code)]

use std::error::Error;
use std::time::Duration;

use api::{AppConfig, Runtime};
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

pub type TestResult = Result<(), Box<dyn Error>>;

/// Defaults with every simulated delay removed.
pub fn fast_config() -> AppConfig {
    AppConfig {
        persist_delay: Duration::ZERO,
        callback_delay: Duration::ZERO,
        mail_delay: Duration::ZERO,
        ..AppConfig::default()
    }
}

pub async fn start(config: AppConfig) -> Result<(Runtime, Router), Box<dyn Error>> {
    let runtime = Runtime::start(config).await?;
    let router = runtime.router();
    Ok((runtime, router))
}

/// Send one request through the router and decode the JSON body.
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
) -> Result<(StatusCode, Value), Box<dyn Error>> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())?;
    let response = router.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

pub async fn get(router: &Router, uri: &str) -> Result<(StatusCode, Value), Box<dyn Error>> {
    send(router, Method::GET, uri).await
}

/// Poll `/job/status` until the job reports `expected`.
pub async fn wait_for_status(router: &Router, uuid: &str, expected: &str) -> TestResult {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let (_, body) = get(router, &format!("/job/status?uuid={uuid}")).await?;
        if body["Status"] == expected {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            return Err(format!("job {uuid} stuck at {}", body["Status"]).into());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
