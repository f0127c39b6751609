use super::{Flow, WorkflowEngine};
use crate::core::task::{QueryKind, TaskRecord};
use crate::core::task_state::TaskStatus;
use crate::db::Patch;
use crate::errors::WorkflowError;
use crate::event::EventKind;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

impl WorkflowEngine {
    /// Classifies the query. Non-research queries are answered directly and
    /// complete the task without a plan.
    pub(super) async fn coordinate(
        &self,
        record: &mut TaskRecord,
        events: &mut Vec<EventKind>,
    ) -> Result<Flow, WorkflowError> {
        let kind = match self.collaborators.coordinator.classify(&record.query).await {
            Ok(kind) => kind,
            Err(e) => {
                warn!(
                    "Classification of task {} failed ({}), treating it as research",
                    record.id, e
                );
                QueryKind::Research
            }
        };
        record.query_kind = Some(kind);

        if kind != QueryKind::Research {
            info!("Task {} classified as {:?}, answering directly", record.id, kind);
            let answer = self
                .collaborators
                .coordinator
                .respond(&record.query, kind)
                .await?;
            record.final_report = Some(answer.clone());
            record.status = TaskStatus::Completed;
            events.push(EventKind::ReportReady {
                report: answer,
                format: record.output_format,
                output_path: None,
            });
            events.push(status_update(TaskStatus::Completed, "Answered without research"));
            return Ok(Flow::Advance(Patch::new()));
        }

        record.status = TaskStatus::Planning;
        events.push(status_update(TaskStatus::Planning, "Creating research plan"));
        Ok(Flow::Advance(Patch::new()))
    }

    /// Creates the plan, or revises it when feedback from a rejection is
    /// pending, then opens a new approval round
    pub(super) async fn plan(
        &self,
        record: &mut TaskRecord,
        events: &mut Vec<EventKind>,
    ) -> Result<Flow, WorkflowError> {
        let planner = self.collaborators.planner.as_ref();
        let feedback = record.user_feedback.take();

        let plan = match (&record.plan, feedback.as_deref()) {
            (None, feedback) => {
                info!("Creating plan for task {}", record.id);
                self.plan_builder.build(planner, &record.query, feedback).await
            }
            (Some(current), Some(feedback)) => {
                info!("Revising plan of task {} after feedback", record.id);
                self.plan_builder
                    .modify(planner, &record.query, current, feedback)
                    .await
            }
            (Some(current), None) => {
                let mut plan = current.clone();
                plan.reset_statuses();
                plan
            }
        };

        record.plan = Some(plan.clone());
        record.plan_approved = false;
        record.approval_round += 1;
        record.approval_deadline = Some(approval_deadline(record.approval_timeout_secs)?);
        record.status = TaskStatus::AwaitingApproval;

        info!(
            "Task {} plan ready with {} subtasks (approval round {})",
            record.id,
            plan.sub_tasks.len(),
            record.approval_round
        );
        events.push(status_update(
            TaskStatus::AwaitingApproval,
            "Research plan ready for approval",
        ));
        events.push(EventKind::PlanReady {
            plan,
            round: record.approval_round,
        });
        Ok(Flow::Advance(Patch::new().set_null("user_feedback")))
    }
}

/// Deadline of an approval round opened now
fn approval_deadline(timeout_secs: u64) -> Result<DateTime<Utc>, WorkflowError> {
    i64::try_from(timeout_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|timeout| Utc::now().checked_add_signed(timeout))
        .ok_or_else(|| {
            WorkflowError::Execution(format!(
                "approval timeout of {}s is out of range",
                timeout_secs
            ))
        })
}

pub(super) fn status_update(step: TaskStatus, message: &str) -> EventKind {
    EventKind::StatusUpdate {
        step,
        message: message.to_string(),
    }
}
