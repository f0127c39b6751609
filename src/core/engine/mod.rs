/// Approval state: auto-approve, suspend, callback
mod approve;
/// Coordinate and planning states
mod planning;
/// Report state and artifact writing
mod report;
/// One research iteration per step
mod research;


use super::approval::ApprovalGate;
use super::checkpoint::Checkpoint;
use super::plan_builder::PlanBuilder;
use super::task::{Failure, TaskRecord};
use super::task_state::TaskStatus;
use crate::agents::{Coordinator, Planner, Rapporteur};
use crate::bridge::EventBridge;
use crate::db::{CheckpointRepository, Patch, TaskRepository};
use crate::errors::{GateError, WorkflowError};
use crate::event::{EventKind, TaskEvent};
use crate::tools::ToolRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// In-process approval callback: receives the task awaiting approval and
/// returns `(approved, feedback)`. An `Err` cancels the task.
pub type ApprovalCallback =
    Arc<dyn Fn(&TaskRecord) -> Result<(bool, Option<String>), String> + Send + Sync>;

/// How the approval state obtains its decision
#[derive(Clone)]
pub enum ApprovalMode {
    /// Suspend on the approval gate until a decision, cancellation or timeout
    Wait,
    /// Return `Suspended` instead of waiting; `resume` continues later
    Detach,
    /// Ask a synchronous in-process callback
    Callback(ApprovalCallback),
}

/// How a call to `run` or `resume` ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(TaskRecord),
    Failed(TaskRecord),
    Cancelled(TaskRecord),
    /// Checkpointed at `AwaitingApproval` without a decision
    Suspended(TaskRecord),
}

impl RunOutcome {
    pub fn record(&self) -> &TaskRecord {
        match self {
            RunOutcome::Completed(r)
            | RunOutcome::Failed(r)
            | RunOutcome::Cancelled(r)
            | RunOutcome::Suspended(r) => r,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.record().status
    }
}

/// External collaborators invoked by the engine
#[derive(Clone)]
pub struct Collaborators {
    pub coordinator: Arc<dyn Coordinator>,
    pub planner: Arc<dyn Planner>,
    pub rapporteur: Arc<dyn Rapporteur>,
    pub tools: Arc<ToolRegistry>,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Directory receiving report artifacts
    pub output_dir: PathBuf,
    /// Source used by fallback plans and by subtasks naming none
    pub default_source: String,
}

/// What the driver does after a step completed
pub(crate) enum Flow {
    /// Commit the step together with the extra decision fields it touched
    Advance(Patch),
    /// Stop without committing; the task stays resumable
    Suspend,
}

/// Drives the fixed research pipeline of one task at a time.
///
/// Every step runs against the record of the latest checkpoint and is
/// committed together with the next checkpoint before its events are
/// published, so a crash always resumes at the first step whose commit is
/// missing.
pub struct WorkflowEngine {
    store: TaskRepository,
    checkpoints: CheckpointRepository,
    gate: Arc<ApprovalGate>,
    bridge: Arc<dyn EventBridge>,
    collaborators: Collaborators,
    plan_builder: PlanBuilder,
    output_dir: PathBuf,
}

impl WorkflowEngine {
    /// Creates a new workflow engine
    ///
    /// # Arguments
    /// * `store` - Task record store shared with the approval path
    /// * `gate` - Approval gate of this process
    /// * `bridge` - Event bridge receiving task events
    /// * `collaborators` - Coordinator, planner, rapporteur and search tools
    /// * `settings` - Output directory and default search source
    pub fn new(
        store: TaskRepository,
        gate: Arc<ApprovalGate>,
        bridge: Arc<dyn EventBridge>,
        collaborators: Collaborators,
        settings: EngineSettings,
    ) -> Result<Self, WorkflowError> {
        let plan_builder = PlanBuilder::new(&settings.default_source)
            .map_err(|e| WorkflowError::Execution(e.to_string()))?;
        Ok(WorkflowEngine {
            checkpoints: CheckpointRepository::new(store.database().clone()),
            store,
            gate,
            bridge,
            collaborators,
            plan_builder,
            output_dir: settings.output_dir,
        })
    }

    pub fn store(&self) -> &TaskRepository {
        &self.store
    }

    pub fn gate(&self) -> &Arc<ApprovalGate> {
        &self.gate
    }

    /// Runs a task from its latest checkpoint, or from the start when none
    /// was written yet, until it finishes or suspends
    pub async fn run(&self, task_id: &str, mode: ApprovalMode) -> Result<RunOutcome, WorkflowError> {
        let checkpoint = match self.checkpoints.load(task_id)? {
            Some(checkpoint) => checkpoint,
            None => Checkpoint::initial(self.store.get(task_id)?),
        };
        info!(
            "Running task {} from step {} (checkpoint {})",
            task_id,
            checkpoint.step(),
            checkpoint.sequence
        );
        self.drive(checkpoint, mode).await
    }

    /// Continues a task from its persisted checkpoint
    ///
    /// # Errors
    ///
    /// `WorkflowError::Execution` when the task never wrote a checkpoint
    pub async fn resume(
        &self,
        task_id: &str,
        mode: ApprovalMode,
    ) -> Result<RunOutcome, WorkflowError> {
        let checkpoint = self.checkpoints.load(task_id)?.ok_or_else(|| {
            WorkflowError::Execution(format!("no checkpoint stored for task {}", task_id))
        })?;
        info!(
            "Resuming task {} at step {} (checkpoint {})",
            task_id,
            checkpoint.step(),
            checkpoint.sequence
        );
        self.drive(checkpoint, mode).await
    }

    async fn drive(
        &self,
        mut checkpoint: Checkpoint,
        mode: ApprovalMode,
    ) -> Result<RunOutcome, WorkflowError> {
        let task_id = checkpoint.task_id.clone();

        loop {
            let stored = self.store.get(&task_id)?;
            if stored.status == TaskStatus::Cancelled {
                return Ok(self.cancelled(stored).await);
            }
            if stored.status.is_terminal() {
                return Ok(finished(stored));
            }

            let mut record = checkpoint.record.clone();
            // decisions are written by the approval path, never by the engine
            record.decision = stored.decision.clone();
            let before = record.clone();
            let mut events = Vec::new();

            debug!("Task {}: executing step {}", task_id, record.status);
            let flow = match self.step(&mut record, &mode, &mut events).await {
                Ok(flow) => flow,
                Err(WorkflowError::Cancelled(_)) => {
                    let stored = self.store.get(&task_id)?;
                    return Ok(self.cancelled(stored).await);
                }
                Err(WorkflowError::Gate(GateError::AlreadyWaiting(id))) => {
                    warn!("Task {} is already waiting for approval elsewhere in this process", id);
                    return Err(GateError::AlreadyWaiting(id).into());
                }
                Err(e) => return self.fail(&checkpoint, &before, e).await,
            };

            match flow {
                Flow::Suspend => {
                    info!("Task {} suspended at {}", task_id, record.status);
                    return Ok(RunOutcome::Suspended(self.store.get(&task_id)?));
                }
                Flow::Advance(extra) => {
                    let next = checkpoint.next(record);
                    let patch = engine_patch(&next.record).extend(extra);
                    if !self.store.commit_step(&task_id, &patch, &next)? {
                        let stored = self.store.get(&task_id)?;
                        return Ok(self.cancelled(stored).await);
                    }
                    debug!(
                        "Task {}: checkpoint {} written at {}",
                        task_id,
                        next.sequence,
                        next.step()
                    );
                    checkpoint = next;
                    self.publish_all(&task_id, events).await;
                }
            }
        }
    }

    async fn step(
        &self,
        record: &mut TaskRecord,
        mode: &ApprovalMode,
        events: &mut Vec<EventKind>,
    ) -> Result<Flow, WorkflowError> {
        match record.status {
            TaskStatus::Pending => self.coordinate(record, events).await,
            TaskStatus::Planning => self.plan(record, events).await,
            TaskStatus::AwaitingApproval => self.approve(record, mode, events).await,
            TaskStatus::Researching => self.research(record, events).await,
            TaskStatus::GeneratingReport => self.report(record, events).await,
            status => Err(WorkflowError::Execution(format!(
                "no step for terminal status {}",
                status
            ))),
        }
    }

    /// Moves the task to `Failed`, attaching the pre-step snapshot
    async fn fail(
        &self,
        checkpoint: &Checkpoint,
        snapshot: &TaskRecord,
        error: WorkflowError,
    ) -> Result<RunOutcome, WorkflowError> {
        error!("Task {} failed at {}: {}", snapshot.id, snapshot.status, error);

        let debug = serde_json::to_string(snapshot).ok();
        let mut record = snapshot.clone();
        record.status = TaskStatus::Failed;
        record.failure = Some(Failure {
            reason: error.reason().to_string(),
            message: error.to_string(),
            debug: debug.clone(),
        });

        let next = checkpoint.next(record);
        if !self
            .store
            .commit_step(&snapshot.id, &engine_patch(&next.record), &next)?
        {
            let stored = self.store.get(&snapshot.id)?;
            return Ok(self.cancelled(stored).await);
        }

        self.publish(
            &snapshot.id,
            EventKind::Error {
                message: error.to_string(),
                debug,
            },
        )
        .await;
        Ok(RunOutcome::Failed(self.store.get(&snapshot.id)?))
    }

    async fn cancelled(&self, stored: TaskRecord) -> RunOutcome {
        info!("Task {} is cancelled, stopping", stored.id);
        self.publish(
            &stored.id,
            EventKind::StatusUpdate {
                step: TaskStatus::Cancelled,
                message: "Task cancelled".to_string(),
            },
        )
        .await;
        RunOutcome::Cancelled(stored)
    }

    pub(crate) async fn publish(&self, task_id: &str, kind: EventKind) {
        self.bridge.publish(&TaskEvent::new(task_id, kind)).await;
    }

    async fn publish_all(&self, task_id: &str, events: Vec<EventKind>) {
        for kind in events {
            self.publish(task_id, kind).await;
        }
    }
}

fn finished(stored: TaskRecord) -> RunOutcome {
    match stored.status {
        TaskStatus::Completed => RunOutcome::Completed(stored),
        TaskStatus::Cancelled => RunOutcome::Cancelled(stored),
        _ => RunOutcome::Failed(stored),
    }
}

/// Fields owned by the engine, written on every step commit
fn engine_patch(record: &TaskRecord) -> Patch {
    Patch::new()
        .set("status", &record.status)
        .set("query_kind", &record.query_kind)
        .set("plan", &record.plan)
        .set("results", &record.results)
        .set("current_task", &record.current_task)
        .set("iteration_count", &record.iteration_count)
        .set("final_report", &record.final_report)
        .set("output_path", &record.output_path)
        .set("failure", &record.failure)
        .set("approval_round", &record.approval_round)
        .set("consumed_round", &record.consumed_round)
        .set("approval_deadline", &record.approval_deadline)
}
