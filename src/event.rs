use crate::constants::TASK_CHANNEL_PREFIX;
use crate::core::{OutputFormat, Plan, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happened to a task, as delivered to user-facing consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// The task moved to another step
    StatusUpdate { step: TaskStatus, message: String },

    /// A plan awaits a decision for approval round `round`
    PlanReady { plan: Plan, round: u32 },

    /// One research iteration finished
    Progress {
        step: TaskStatus,
        iteration: u32,
        max_iterations: u32,
        current_task: Option<String>,
        #[serde(default)]
        data: Option<Value>,
    },

    /// The task completed with a report
    ReportReady {
        report: String,
        format: OutputFormat,
        #[serde(default)]
        output_path: Option<String>,
    },

    /// The task failed
    Error {
        message: String,
        #[serde(default)]
        debug: Option<String>,
    },

    /// A human decision was recorded for the task
    ApprovalReceived {
        approved: bool,
        #[serde(default)]
        feedback: Option<String>,
        #[serde(default)]
        round: Option<u32>,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::StatusUpdate { .. } => "status_update",
            EventKind::PlanReady { .. } => "plan_ready",
            EventKind::Progress { .. } => "progress",
            EventKind::ReportReady { .. } => "report_ready",
            EventKind::Error { .. } => "error",
            EventKind::ApprovalReceived { .. } => "approval_received",
        }
    }
}

/// A task event as carried by the event bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl TaskEvent {
    pub fn new(task_id: &str, kind: EventKind) -> Self {
        TaskEvent {
            task_id: task_id.to_string(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Per-task channel name
    pub fn channel(&self) -> String {
        task_channel(&self.task_id)
    }

    /// Consumers needing exactly-once behaviour deduplicate on this key
    pub fn dedup_key(&self) -> (String, &'static str, DateTime<Utc>) {
        (self.task_id.clone(), self.kind.name(), self.timestamp)
    }
}

pub fn task_channel(task_id: &str) -> String {
    format!("{}{}", TASK_CHANNEL_PREFIX, task_id)
}

/// Wire form of an approval decision relayed between processes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalMessage {
    pub task_id: String,
    pub payload: ApprovalPayload,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalPayload {
    pub plan_approved: bool,
    pub user_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
}

impl ApprovalMessage {
    /// Wire form of an `approval_received` event; `None` for other kinds
    pub fn from_event(event: &TaskEvent) -> Option<Self> {
        match &event.kind {
            EventKind::ApprovalReceived {
                approved,
                feedback,
                round,
            } => Some(ApprovalMessage {
                task_id: event.task_id.clone(),
                payload: ApprovalPayload {
                    plan_approved: *approved,
                    user_feedback: feedback.clone(),
                    round: *round,
                },
                updated_at: event.timestamp,
            }),
            _ => None,
        }
    }

    pub fn into_event(self) -> TaskEvent {
        TaskEvent {
            task_id: self.task_id,
            kind: EventKind::ApprovalReceived {
                approved: self.payload.plan_approved,
                feedback: self.payload.user_feedback,
                round: self.payload.round,
            },
            timestamp: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = TaskEvent::new(
            "t1",
            EventKind::StatusUpdate {
                step: TaskStatus::Planning,
                message: "Creating research plan".into(),
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "status_update");
        assert_eq!(value["step"], "planning");
        assert_eq!(value["task_id"], "t1");
        assert_eq!(event.channel(), "tasks:updates:t1");

        let back: TaskEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn approval_wire_format_matches_relay_contract() {
        let event = TaskEvent::new(
            "t1",
            EventKind::ApprovalReceived {
                approved: false,
                feedback: Some("more sources".into()),
                round: None,
            },
        );
        let message = ApprovalMessage::from_event(&event).unwrap();
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value["payload"],
            json!({"plan_approved": false, "user_feedback": "more sources"})
        );
        assert_eq!(value["task_id"], "t1");
        assert_eq!(message.into_event(), event);
    }
}
