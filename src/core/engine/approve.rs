use super::planning::status_update;
use super::{ApprovalCallback, ApprovalMode, Flow, WorkflowEngine};
use crate::constants::{DEFAULT_REJECTION_FEEDBACK, MAX_APPROVAL_TIMEOUT_SECS};
use crate::core::approval::ApprovalOutcome;
use crate::core::task::{ApprovalDecision, TaskRecord};
use crate::core::task_state::TaskStatus;
use crate::db::Patch;
use crate::errors::{CollaboratorError, WorkflowError};
use crate::event::EventKind;
use chrono::Utc;
use std::time::Duration;
use tracing::{info, warn};

impl WorkflowEngine {
    /// Obtains the decision for the open approval round and consumes it
    pub(super) async fn approve(
        &self,
        record: &mut TaskRecord,
        mode: &ApprovalMode,
        events: &mut Vec<EventKind>,
    ) -> Result<Flow, WorkflowError> {
        if record.auto_approve {
            info!("Auto-approving plan of task {}", record.id);
            let decision = ApprovalDecision::approve().for_round(record.approval_round);
            return Ok(consume(record, decision, events));
        }

        if let Some(decision) = record.pending_decision().cloned() {
            return Ok(consume(record, decision, events));
        }

        match mode {
            ApprovalMode::Detach => {
                if deadline_passed(record) {
                    return Err(WorkflowError::ApprovalTimeout);
                }
                Ok(Flow::Suspend)
            }
            ApprovalMode::Wait => {
                let decision = self.wait_for_decision(record).await?;
                Ok(consume(record, decision, events))
            }
            ApprovalMode::Callback(callback) => {
                let decision = self.ask_callback(record, callback.clone()).await?;
                Ok(consume(record, decision, events))
            }
        }
    }

    async fn wait_for_decision(
        &self,
        record: &TaskRecord,
    ) -> Result<ApprovalDecision, WorkflowError> {
        let remaining = remaining_time(record);
        let handle = self.gate.register(&record.id, remaining)?;
        info!(
            "Task {} waiting for approval of round {} ({:?} left)",
            record.id, record.approval_round, remaining
        );

        match self.gate.wait(&handle).await? {
            ApprovalOutcome::Decided(decision) => Ok(decision),
            ApprovalOutcome::Timeout => Err(WorkflowError::ApprovalTimeout),
            ApprovalOutcome::Cancelled => Err(WorkflowError::Cancelled(record.id.clone())),
        }
    }

    /// Runs the blocking callback off the runtime and records its answer
    /// through the gate like any other decision
    async fn ask_callback(
        &self,
        record: &TaskRecord,
        callback: ApprovalCallback,
    ) -> Result<ApprovalDecision, WorkflowError> {
        let snapshot = record.clone();
        let answer = tokio::task::spawn_blocking(move || callback(&snapshot))
            .await
            .map_err(|e| WorkflowError::Execution(format!("approval callback panicked: {}", e)))?;

        let (approved, feedback) = match answer {
            Ok(answer) => answer,
            Err(reason) => {
                warn!(
                    "Task {}: {}",
                    record.id,
                    CollaboratorError::Cancelled(reason)
                );
                self.gate.cancel(&record.id)?;
                return Err(WorkflowError::Cancelled(record.id.clone()));
            }
        };

        let decision = ApprovalDecision {
            approved,
            feedback,
            round: Some(record.approval_round),
            decided_at: Utc::now(),
        };
        self.gate.decide(&record.id, decision.clone())?;

        // a decision recorded concurrently for this round wins over ours
        let stored = self.store.get(&record.id)?;
        if stored.status == TaskStatus::Cancelled {
            return Err(WorkflowError::Cancelled(record.id.clone()));
        }
        Ok(stored.pending_decision().cloned().unwrap_or(decision))
    }
}

/// Applies a decision to the record and closes the approval round
fn consume(record: &mut TaskRecord, decision: ApprovalDecision, events: &mut Vec<EventKind>) -> Flow {
    record.consumed_round = record.approval_round;
    record.decision = None;
    record.approval_deadline = None;

    events.push(EventKind::ApprovalReceived {
        approved: decision.approved,
        feedback: decision.feedback.clone(),
        round: Some(record.approval_round),
    });

    let patch = if decision.approved {
        info!("Plan of task {} approved", record.id);
        record.plan_approved = true;
        record.user_feedback = None;
        record.status = TaskStatus::Researching;
        events.push(status_update(TaskStatus::Researching, "Plan approved, starting research"));
        Patch::new().set("plan_approved", &true).set_null("user_feedback")
    } else {
        let feedback = decision
            .feedback
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REJECTION_FEEDBACK.to_string());
        info!("Plan of task {} rejected: {}", record.id, feedback);
        record.plan_approved = false;
        record.user_feedback = Some(feedback.clone());
        record.status = TaskStatus::Planning;
        events.push(status_update(TaskStatus::Planning, "Plan rejected, revising"));
        Patch::new()
            .set("plan_approved", &false)
            .set("user_feedback", &feedback)
    };

    Flow::Advance(patch.set_null("decision"))
}

fn deadline_passed(record: &TaskRecord) -> bool {
    record.approval_deadline.is_some_and(|deadline| Utc::now() >= deadline)
}

/// Time left until the persisted deadline, so a restarted waiter does not
/// start a fresh timeout
fn remaining_time(record: &TaskRecord) -> Duration {
    match record.approval_deadline {
        Some(deadline) => (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO),
        None => Duration::from_secs(record.approval_timeout_secs.min(MAX_APPROVAL_TIMEOUT_SECS)),
    }
}
