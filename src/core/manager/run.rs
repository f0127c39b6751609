use super::TaskManager;
use crate::constants::EVENT_PRUNE_INTERVAL;
use crate::core::TaskStatus;
use crate::event::EventKind;
use std::future::Future;
use tracing::{debug, error, info};

impl TaskManager {
    /// Runs the worker loop until `shutdown` resolves
    ///
    /// # Details
    ///
    /// - Resumes the unfinished tasks this worker claimed before a restart
    /// - Relays `approval_received` and cancellation events from the bridge
    ///   to the approval gate, so a suspended task re-reads the store
    ///   immediately
    /// - Claims pending tasks on every poll interval
    /// - Prunes old events of finished tasks from the outbox
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        info!("Worker {} started", self.worker_id);
        if let Err(e) = self.resume_claimed_tasks() {
            error!("Error resuming claimed tasks: {}", e);
        }

        let mut approvals = self.bridge.subscribe(None);
        let mut approvals_open = true;
        let mut pending_tasks_interval = tokio::time::interval(self.poll_interval);
        let mut prune_interval = tokio::time::interval(EVENT_PRUNE_INTERVAL);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Worker {} shutting down", self.worker_id);
                    break;
                }
                event = approvals.recv(), if approvals_open => {
                    match event {
                        Some(event) => {
                            if wakes_waiter(&event.kind) && self.engine.gate().wake(&event.task_id) {
                                debug!(
                                    "Relayed {} of task {} to its waiter",
                                    event.kind.name(),
                                    event.task_id
                                );
                            }
                        }
                        None => {
                            debug!("Event bridge closed, relying on store polling");
                            approvals_open = false;
                        }
                    }
                }
                _ = pending_tasks_interval.tick() => {
                    if let Err(e) = self.claim_pending_tasks() {
                        error!("Error claiming pending tasks: {}", e);
                    }
                }
                _ = prune_interval.tick() => {
                    if let Err(e) = self.prune_events() {
                        error!("Error pruning task events: {}", e);
                    }
                }
            }
        }
    }
}

/// Events after which a suspended approval has something new to read
fn wakes_waiter(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::ApprovalReceived { .. }
            | EventKind::StatusUpdate {
                step: TaskStatus::Cancelled,
                ..
            }
    )
}
