use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a research task.
///
/// The non-terminal variants double as the workflow step the engine executes
/// next when a checkpoint is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet picked up; the coordinate step runs next
    #[default]
    Pending,
    /// A plan is being created or revised
    Planning,
    /// Suspended until a human approves or rejects the plan
    AwaitingApproval,
    /// Iterating over subtasks
    Researching,
    /// Composing the final report
    GeneratingReport,
    /// Finished with a final report
    Completed,
    /// Ended with an unrecoverable error
    Failed,
    /// Stopped by an explicit request
    Cancelled,
}

impl TaskStatus {
    pub const ALL: &[TaskStatus] = &[
        TaskStatus::Pending,
        TaskStatus::Planning,
        TaskStatus::AwaitingApproval,
        TaskStatus::Researching,
        TaskStatus::GeneratingReport,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Planning => "planning",
            TaskStatus::AwaitingApproval => "awaiting_approval",
            TaskStatus::Researching => "researching",
            TaskStatus::GeneratingReport => "generating_report",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// No further transition is possible from a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Only `Completed` and `Failed` count as resolved outcomes
    pub fn is_resolved(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown task status '{}'", s))
    }
}
