//! HTTP routes of the job server.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use job_core::{Job, StatusResponse};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::monitor::DispatcherState;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PersistParams {
    pub client_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub callback_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MailParams {
    pub email_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusParams {
    pub uuid: Option<String>,
}

/// Health check response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the queue cannot be inspected or nothing
    /// consumes it.
    pub status: &'static str,
    /// `running`, `stopped` or `failed`.
    pub dispatcher: &'static str,
    pub version: &'static str,
    pub broker: &'static str,
    pub status_store: &'static str,
    pub queue: String,
    pub queue_depth: Option<usize>,
}

/// Refuse new jobs once nothing consumes the queue.
fn ensure_dispatching(state: &AppState) -> AppResult<()> {
    match state.dispatcher.state() {
        DispatcherState::Running => Ok(()),
        other => Err(AppError::DispatcherStopped(other.as_str())),
    }
}

/// GET|POST /job/database?client_time=<unix seconds>
async fn submit_persist(
    State(state): State<AppState>,
    Query(params): Query<PersistParams>,
) -> AppResult<Json<Job>> {
    ensure_dispatching(&state)?;
    let job = state
        .jobs
        .submit_persist(params.client_time.as_deref())
        .await?;
    Ok(Json(job))
}

/// GET|POST /job/callback[?callback_url=]
async fn submit_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> AppResult<Json<Job>> {
    ensure_dispatching(&state)?;
    Ok(Json(state.jobs.submit_callback(params.callback_url).await?))
}

/// GET|POST /job/mail[?email_address=]
async fn submit_mail(
    State(state): State<AppState>,
    Query(params): Query<MailParams>,
) -> AppResult<Json<Job>> {
    ensure_dispatching(&state)?;
    Ok(Json(state.jobs.submit_mail(params.email_address).await?))
}

/// GET /job/status?uuid=<id>
async fn job_status(
    State(state): State<AppState>,
    Query(params): Query<StatusParams>,
) -> AppResult<Json<StatusResponse>> {
    let raw_id = params.uuid.unwrap_or_default();
    Ok(Json(state.status.status(&raw_id).await?))
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let queue_depth = state.jobs.queue_depth().await.ok();
    let dispatcher = state.dispatcher.state();
    let healthy = queue_depth.is_some() && dispatcher == DispatcherState::Running;

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        dispatcher: dispatcher.as_str(),
        version: env!("CARGO_PKG_VERSION"),
        broker: state.broker.transport(),
        status_store: state.status.backend(),
        queue: state.jobs.queue().to_string(),
        queue_depth,
    })
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/job/database", get(submit_persist).post(submit_persist))
        .route("/job/callback", get(submit_callback).post(submit_callback))
        .route("/job/mail", get(submit_mail).post(submit_mail))
        .route("/job/status", get(job_status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
