use crate::api::errors::{api_error, ApiError};
use crate::api::ApiState;
use crate::constants::{MAX_ALLOWED_ITERATIONS, MAX_APPROVAL_TIMEOUT_SECS};
use crate::core::{
    ApprovalDecision, DecideOutcome, NewTask, OutputFormat, Progress, TaskRecord, TaskStatus,
};
use crate::event::{EventKind, TaskEvent};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Request payload starting a research task
#[derive(Debug, Deserialize)]
pub struct StartResearchRequest {
    pub query: String,
    pub max_iterations: Option<u32>,
    pub auto_approve: Option<bool>,
    pub output_format: Option<String>,
    pub approval_timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StartResearchResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
}

/// Task summary exposed to operators
#[derive(Debug, Serialize)]
pub struct TaskInfo {
    pub task_id: String,
    pub query: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub progress: Progress,
    /// Human-readable failure reason of a failed task
    pub error: Option<String>,
}

impl From<&TaskRecord> for TaskInfo {
    fn from(record: &TaskRecord) -> Self {
        TaskInfo {
            task_id: record.id.clone(),
            query: record.query.clone(),
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            progress: record.progress(),
            error: record.failure.as_ref().map(|f| f.message.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub total: i64,
    pub tasks: Vec<TaskInfo>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub task_id: String,
    pub format: OutputFormat,
    pub report: String,
    pub output_path: Option<String>,
}

/// Human decision on the current plan
#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub approved: bool,
    pub feedback: Option<String>,
    pub round: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub task_id: String,
    pub status: String,
    pub message: String,
}

/// Creates a research task and, when this process executes tasks, starts it
///
/// # Arguments
/// * `state` - Shared API state
/// * `payload` - Query and optional per-task settings
///
/// # Returns
/// * `Result<Json<StartResearchResponse>, ApiError>` - Id of the new task or error
#[axum::debug_handler]
pub async fn start_research(
    Extension(state): Extension<Arc<ApiState>>,
    Json(payload): Json<StartResearchRequest>,
) -> Result<Json<StartResearchResponse>, ApiError> {
    let query = payload.query.trim();
    if query.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "query must not be empty"));
    }

    let max_iterations = payload
        .max_iterations
        .unwrap_or(state.defaults.max_iterations);
    if !(1..=MAX_ALLOWED_ITERATIONS).contains(&max_iterations) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            &format!("max_iterations must be between 1 and {}", MAX_ALLOWED_ITERATIONS),
        ));
    }

    let approval_timeout_secs = payload
        .approval_timeout_secs
        .unwrap_or(state.defaults.approval_timeout.as_secs());
    if !(1..=MAX_APPROVAL_TIMEOUT_SECS).contains(&approval_timeout_secs) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            &format!(
                "approval_timeout_secs must be between 1 and {}",
                MAX_APPROVAL_TIMEOUT_SECS
            ),
        ));
    }

    let output_format = match payload.output_format.as_deref() {
        Some(raw) => raw
            .parse::<OutputFormat>()
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, &e))?,
        None => OutputFormat::default(),
    };

    let record = TaskRecord::new(
        Uuid::new_v4().to_string(),
        NewTask {
            query: query.to_string(),
            max_iterations,
            output_format,
            auto_approve: payload
                .auto_approve
                .unwrap_or(state.defaults.auto_approve_plan),
            approval_timeout_secs,
        },
    );
    state.store.create(&record)?;
    info!("Created research task {}", record.id);

    let message = match &state.executor {
        Some(executor) => {
            executor
                .claim_and_execute(&record.id)
                .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
            "Research started".to_string()
        }
        None => "Research queued for a worker".to_string(),
    };

    Ok(Json(StartResearchResponse {
        task_id: record.id,
        status: record.status,
        message,
    }))
}

/// Lists tasks, newest first
#[axum::debug_handler]
pub async fn get_history(
    Extension(state): Extension<Arc<ApiState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = params.limit.clamp(1, 100);
    let offset = params.offset.max(0);
    let (total, records) = state.store.list(limit, offset)?;
    Ok(Json(HistoryResponse {
        total,
        tasks: records.iter().map(TaskInfo::from).collect(),
    }))
}

/// Retrieves task information by its ID
#[axum::debug_handler]
pub async fn get_task(
    Extension(state): Extension<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskInfo>, ApiError> {
    let record = state.store.get(&id)?;
    Ok(Json(TaskInfo::from(&record)))
}

/// Retrieves the final report of a completed task
#[axum::debug_handler]
pub async fn get_report(
    Extension(state): Extension<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<ReportResponse>, ApiError> {
    let record = state.store.get(&id)?;
    match (record.status, record.final_report) {
        (TaskStatus::Completed, Some(report)) => Ok(Json(ReportResponse {
            task_id: record.id,
            format: record.output_format,
            report,
            output_path: record.output_path,
        })),
        (status, _) => Err(api_error(
            StatusCode::CONFLICT,
            &format!("Report not available, task is {}", status),
        )),
    }
}

/// Records a plan decision through the approval gate and relays it to the
/// process executing the task
///
/// # Arguments
/// * `state` - Shared API state
/// * `id` - Task awaiting approval
/// * `payload` - Decision, optional feedback and approval round
///
/// # Returns
/// * `Result<Json<ActionResponse>, ApiError>` - Acknowledgement, or 409 when
///   the decision does not apply to an open approval round
#[axum::debug_handler]
pub async fn approve_plan(
    Extension(state): Extension<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(payload): Json<ApprovalRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let decision = ApprovalDecision {
        approved: payload.approved,
        feedback: payload.feedback.filter(|f| !f.trim().is_empty()),
        round: payload.round,
        decided_at: Utc::now(),
    };

    let outcome = state.gate.decide(&id, decision.clone())?;
    if let DecideOutcome::Ignored(reason) = outcome {
        warn!("Decision for task {} ignored: {}", id, reason);
        return Err(api_error(StatusCode::CONFLICT, reason));
    }

    state
        .bridge
        .publish(&TaskEvent::new(
            &id,
            EventKind::ApprovalReceived {
                approved: decision.approved,
                feedback: decision.feedback,
                round: decision.round,
            },
        ))
        .await;

    Ok(Json(ActionResponse {
        task_id: id,
        status: if decision.approved { "approved" } else { "rejected" }.to_string(),
        message: "Decision recorded".to_string(),
    }))
}

/// Cancels a task that has not finished yet
#[axum::debug_handler]
pub async fn cancel_task(
    Extension(state): Extension<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    if !state.gate.cancel(&id)? {
        return Err(api_error(StatusCode::CONFLICT, "Task already finished"));
    }

    state
        .bridge
        .publish(&TaskEvent::new(
            &id,
            EventKind::StatusUpdate {
                step: TaskStatus::Cancelled,
                message: "Task cancelled".to_string(),
            },
        ))
        .await;

    Ok(Json(ActionResponse {
        task_id: id,
        status: TaskStatus::Cancelled.to_string(),
        message: "Task cancelled".to_string(),
    }))
}

/// Streams the task's events as Server-Sent Events
#[axum::debug_handler]
pub async fn stream_events(
    Extension(state): Extension<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    state.store.get(&id)?;
    let events = state.bridge.subscribe(Some(&id));

    let stream = stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        let sse = Event::default()
            .event(event.kind.name())
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().comment(format!("unencodable event: {}", e)));
        Some((Ok::<_, Infallible>(sse), events))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LocalBridge;
    use crate::config::WorkflowConfig;
    use crate::core::ApprovalGate;
    use crate::db::test_support::temp_database;
    use crate::db::{Patch, TaskRepository};
    use tempfile::TempDir;

    fn state() -> (TempDir, Arc<ApiState>) {
        let (dir, db) = temp_database();
        let store = TaskRepository::new(db);
        let state = ApiState {
            gate: Arc::new(ApprovalGate::new(store.clone(), Duration::from_millis(50))),
            store,
            bridge: Arc::new(LocalBridge::new(16)),
            defaults: WorkflowConfig::default(),
            executor: None,
        };
        (dir, Arc::new(state))
    }

    fn request(query: &str) -> StartResearchRequest {
        StartResearchRequest {
            query: query.to_string(),
            max_iterations: Some(3),
            auto_approve: None,
            output_format: Some("html".to_string()),
            approval_timeout_secs: None,
        }
    }

    #[tokio::test]
    async fn start_creates_a_pending_task() {
        let (_dir, state) = state();
        let Json(started) = start_research(Extension(state.clone()), Json(request("rust")))
            .await
            .unwrap();
        assert_eq!(started.status, TaskStatus::Pending);

        let Json(info) = get_task(Extension(state.clone()), Path(started.task_id.clone()))
            .await
            .unwrap();
        assert_eq!(info.query, "rust");
        assert_eq!(info.progress.max_iterations, 3);

        let stored = state.store.get(&started.task_id).unwrap();
        assert_eq!(stored.output_format, OutputFormat::Html);
        assert_eq!(stored.approval_timeout_secs, 300);
    }

    #[tokio::test]
    async fn start_rejects_invalid_requests() {
        let (_dir, state) = state();
        let empty = start_research(Extension(state.clone()), Json(request("  "))).await;
        assert_eq!(empty.unwrap_err().code, 400);

        let mut too_many = request("rust");
        too_many.max_iterations = Some(50);
        let result = start_research(Extension(state.clone()), Json(too_many)).await;
        assert_eq!(result.unwrap_err().code, 400);

        for timeout in [0, MAX_APPROVAL_TIMEOUT_SECS + 1, u64::MAX] {
            let mut bad_timeout = request("rust");
            bad_timeout.approval_timeout_secs = Some(timeout);
            let result = start_research(Extension(state.clone()), Json(bad_timeout)).await;
            assert_eq!(result.unwrap_err().code, 400);
        }
        let (total, _) = state.store.list(10, 0).unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (_dir, state) = state();
        let result = get_task(Extension(state), Path("missing".to_string())).await;
        assert_eq!(result.unwrap_err().code, 404);
    }

    #[tokio::test]
    async fn approval_is_recorded_once_per_round() {
        let (_dir, state) = state();
        let Json(started) = start_research(Extension(state.clone()), Json(request("rust")))
            .await
            .unwrap();
        let id = started.task_id;
        state
            .store
            .put(
                &id,
                &Patch::new()
                    .set("status", &TaskStatus::AwaitingApproval)
                    .set("approval_round", &1u32),
            )
            .unwrap();

        let decision = || ApprovalRequest {
            approved: false,
            feedback: Some("more sources".to_string()),
            round: None,
        };
        let Json(first) = approve_plan(Extension(state.clone()), Path(id.clone()), Json(decision()))
            .await
            .unwrap();
        assert_eq!(first.status, "rejected");
        let second = approve_plan(Extension(state.clone()), Path(id.clone()), Json(decision())).await;
        assert_eq!(second.unwrap_err().code, 409);

        let stored = state.store.get(&id).unwrap();
        assert_eq!(stored.user_feedback.as_deref(), Some("more sources"));
    }

    #[tokio::test]
    async fn cancel_then_report_conflicts() {
        let (_dir, state) = state();
        let Json(started) = start_research(Extension(state.clone()), Json(request("rust")))
            .await
            .unwrap();
        let id = started.task_id;

        let Json(cancelled) = cancel_task(Extension(state.clone()), Path(id.clone()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, "cancelled");
        let again = cancel_task(Extension(state.clone()), Path(id.clone())).await;
        assert_eq!(again.unwrap_err().code, 409);

        let report = get_report(Extension(state.clone()), Path(id)).await;
        assert_eq!(report.unwrap_err().code, 409);

        let Json(history) = get_history(
            Extension(state),
            Query(HistoryParams {
                limit: 10,
                offset: 0,
            }),
        )
        .await
        .unwrap();
        assert_eq!(history.total, 1);
        assert_eq!(history.tasks[0].status, TaskStatus::Cancelled);
    }
}
