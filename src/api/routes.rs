//! API routes configuration module

use crate::api::handlers::{
    approve_plan, cancel_task, get_history, get_report, get_task, start_research, stream_events,
};
use crate::api::ApiState;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;

/// Creates and configures the API router with all routes
///
/// # Arguments
/// * `state` - Store, approval gate and bridge shared across handlers
///
/// # Returns
/// * `Router` - Configured router with all API endpoints and middleware
pub fn app(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/research/start", post(start_research))
        .route("/research/history", get(get_history))
        .route("/research/:id", get(get_task).delete(cancel_task))
        .route("/research/:id/report", get(get_report))
        .route("/research/:id/approve", post(approve_plan))
        .route("/research/:id/events", get(stream_events))
        .layer(Extension(state))
}
