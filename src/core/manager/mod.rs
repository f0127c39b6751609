mod run;

use crate::bridge::EventBridge;
use crate::constants::EVENT_RETENTION_DAYS;
use crate::core::{ApprovalMode, RunOutcome, TaskStatus, WorkflowEngine};
use crate::db::EventRepository;
use crate::errors::WorkflowError;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};

/// Executes tasks from the shared store in this process.
///
/// A manager claims pending tasks, resumes the unfinished tasks it claimed
/// before a restart, and relays approval events from the event bridge to the
/// engine's approval gate. Each task runs on its own tokio task.
pub struct TaskManager {
    /// Identifier recorded in `claimed_by` on claimed tasks
    pub worker_id: String,
    engine: Arc<WorkflowEngine>,
    bridge: Arc<dyn EventBridge>,
    poll_interval: Duration,
    running: Arc<Mutex<HashSet<String>>>,
}

impl TaskManager {
    /// Creates a new TaskManager
    ///
    /// # Arguments
    /// * `worker_id` - Identifier used when claiming tasks
    /// * `engine` - Engine executing the claimed tasks
    /// * `bridge` - Event bridge carrying approval events
    /// * `poll_interval` - Interval between scans for pending tasks
    pub fn new(
        worker_id: &str,
        engine: Arc<WorkflowEngine>,
        bridge: Arc<dyn EventBridge>,
        poll_interval: Duration,
    ) -> Self {
        TaskManager {
            worker_id: worker_id.to_string(),
            engine,
            bridge,
            poll_interval,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        self.lock_running().contains(task_id)
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.running.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Claims every unclaimed pending task and starts it
    ///
    /// # Returns
    /// * `usize` - Number of tasks claimed by this call
    pub fn claim_pending_tasks(&self) -> Result<usize, WorkflowError> {
        let store = self.engine.store();
        let mut claimed = 0;
        for record in store.list_by_status(&[TaskStatus::Pending])? {
            if record.claimed_by.is_some() {
                continue;
            }
            if store.claim(&record.id, &self.worker_id)? {
                info!("Worker {} claimed task {}", self.worker_id, record.id);
                self.execute(&record.id);
                claimed += 1;
            }
        }
        Ok(claimed)
    }

    /// Restarts the unfinished tasks this worker claimed earlier
    pub fn resume_claimed_tasks(&self) -> Result<usize, WorkflowError> {
        let unfinished: Vec<TaskStatus> = TaskStatus::ALL
            .iter()
            .filter(|status| !status.is_terminal())
            .copied()
            .collect();

        let mut resumed = 0;
        for record in self.engine.store().list_by_status(&unfinished)? {
            if record.claimed_by.as_deref() == Some(self.worker_id.as_str()) {
                info!(
                    "Worker {} resuming task {} at {}",
                    self.worker_id, record.id, record.status
                );
                self.execute(&record.id);
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    /// Deletes outbox events of tasks that finished more than
    /// `EVENT_RETENTION_DAYS` ago
    pub fn prune_events(&self) -> Result<usize, WorkflowError> {
        let cutoff = Utc::now() - chrono::Duration::days(EVENT_RETENTION_DAYS);
        let events = EventRepository::new(self.engine.store().database().clone());
        let pruned = events.prune_finished(cutoff)?;
        if pruned > 0 {
            info!("Pruned {} events of finished tasks", pruned);
        }
        Ok(pruned)
    }

    /// Claims a freshly created task for this process and starts it, so no
    /// worker picks it up as well
    pub fn claim_and_execute(&self, task_id: &str) -> Result<bool, WorkflowError> {
        if !self.engine.store().claim(task_id, &self.worker_id)? {
            return Ok(false);
        }
        Ok(self.execute(task_id))
    }

    /// Runs `task_id` on a new tokio task unless it is already running here.
    /// Approval waits suspend on the engine's gate.
    pub fn execute(&self, task_id: &str) -> bool {
        if !self.lock_running().insert(task_id.to_string()) {
            debug!("Task {} is already running in this process", task_id);
            return false;
        }

        let engine = self.engine.clone();
        let running = self.running.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            let run = {
                let task_id = task_id.clone();
                tokio::spawn(async move { engine.run(&task_id, ApprovalMode::Wait).await })
            };
            match run.await {
                Ok(Ok(RunOutcome::Completed(_))) => info!("Task {} completed", task_id),
                Ok(Ok(RunOutcome::Failed(record))) => error!(
                    "Task {} failed: {}",
                    task_id,
                    record
                        .failure
                        .map(|f| f.message)
                        .unwrap_or_else(|| "unknown reason".to_string())
                ),
                Ok(Ok(RunOutcome::Cancelled(_))) => info!("Task {} cancelled", task_id),
                Ok(Ok(RunOutcome::Suspended(_))) => info!("Task {} suspended", task_id),
                Ok(Err(e)) => error!("Error running task {}: {}", task_id, e),
                Err(e) => error!("Task {} aborted: {}", task_id, e),
            }
            running
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&task_id);
        });
        true
    }
}
