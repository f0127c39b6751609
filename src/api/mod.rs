/// API error types and handling
pub mod errors;
/// HTTP handlers for the research endpoints
pub mod handlers;
/// Routes configuration and setup
pub mod routes;
/// HTTP server implementation
pub mod server;

use crate::bridge::EventBridge;
use crate::config::WorkflowConfig;
use crate::core::{ApprovalGate, TaskManager};
use crate::db::TaskRepository;
use std::sync::Arc;

/// Shared state of the HTTP handlers
pub struct ApiState {
    pub store: TaskRepository,
    pub gate: Arc<ApprovalGate>,
    pub bridge: Arc<dyn EventBridge>,
    /// Defaults applied to new research requests
    pub defaults: WorkflowConfig,
    /// Executes new tasks in this process; `None` leaves them to a worker
    pub executor: Option<Arc<TaskManager>>,
}
