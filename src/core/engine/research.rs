use super::planning::status_update;
use super::{Flow, WorkflowEngine};
use crate::core::iteration::{next_action, NextAction};
use crate::core::task::{Plan, TaskRecord};
use crate::core::task_state::TaskStatus;
use crate::db::Patch;
use crate::errors::WorkflowError;
use crate::event::EventKind;
use serde_json::json;
use tracing::{info, warn};

impl WorkflowEngine {
    /// Runs at most one research iteration. The loop over subtasks is the
    /// driver's: every iteration is committed with its own checkpoint, so a
    /// resumed task never searches a completed subtask again.
    pub(super) async fn research(
        &self,
        record: &mut TaskRecord,
        events: &mut Vec<EventKind>,
    ) -> Result<Flow, WorkflowError> {
        let mut plan = record.plan.clone().ok_or_else(|| {
            WorkflowError::Execution(format!("task {} is researching without a plan", record.id))
        })?;

        let sufficient = self.is_sufficient(record, &plan).await;
        match next_action(
            &plan.sub_tasks,
            record.iteration_count,
            record.max_iterations,
            sufficient,
        ) {
            NextAction::Research(sub_task) => {
                info!(
                    "Task {} iteration {}/{}: {}",
                    record.id,
                    record.iteration_count + 1,
                    record.max_iterations,
                    sub_task.description
                );
                let found = self.collaborators.tools.search_sub_task(&sub_task).await;
                let failed = found.iter().filter(|r| r.error.is_some()).count();

                plan.mark_completed(sub_task.id);
                record.results.extend(found.iter().cloned());
                record.plan = Some(plan);
                record.iteration_count += 1;
                record.current_task = Some(sub_task.clone());

                events.push(EventKind::Progress {
                    step: TaskStatus::Researching,
                    iteration: record.iteration_count,
                    max_iterations: record.max_iterations,
                    current_task: Some(sub_task.description),
                    data: Some(json!({
                        "sub_task_id": sub_task.id,
                        "new_results": found.len(),
                        "failed_searches": failed,
                        "total_results": record.results.len(),
                    })),
                });
            }
            NextAction::GenerateReport(reason) => {
                info!(
                    "Task {} stops researching after {} iterations: {}",
                    record.id,
                    record.iteration_count,
                    reason.as_str()
                );
                record.status = TaskStatus::GeneratingReport;
                events.push(status_update(
                    TaskStatus::GeneratingReport,
                    &format!("Generating report ({})", reason.as_str()),
                ));
            }
        }
        Ok(Flow::Advance(Patch::new()))
    }

    /// Sufficiency is only asked when another iteration is allowed and
    /// something was found; a collaborator error counts as insufficient
    async fn is_sufficient(&self, record: &TaskRecord, plan: &Plan) -> bool {
        if record.iteration_count >= record.max_iterations || record.results.is_empty() {
            return false;
        }
        match self
            .collaborators
            .planner
            .is_sufficient(plan, &record.results)
            .await
        {
            Ok(sufficient) => sufficient,
            Err(e) => {
                warn!("Sufficiency check of task {} failed: {}", record.id, e);
                false
            }
        }
    }
}
