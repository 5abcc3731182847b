use std::sync::Arc;

use broker::Connection;

use crate::monitor::DispatcherMonitor;
use crate::producer::JobServer;
use crate::status::StatusQuery;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: every field is a handle.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobServer>,
    pub status: StatusQuery,
    pub broker: Connection,
    pub dispatcher: DispatcherMonitor,
}
