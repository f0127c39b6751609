use super::task::TaskRecord;
use super::task_state::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable snapshot of a task's working state.
///
/// `record.status` names the step the engine runs next: a checkpoint written
/// after step N completes carries the status of step N+1, so a crash between
/// the write and the next step resumes exactly there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub task_id: String,
    /// Monotonic per task, incremented on every write
    pub sequence: u64,
    pub record: TaskRecord,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn initial(record: TaskRecord) -> Self {
        Checkpoint {
            task_id: record.id.clone(),
            sequence: 0,
            record,
            saved_at: Utc::now(),
        }
    }

    /// Snapshot that supersedes this one
    pub fn next(&self, record: TaskRecord) -> Self {
        Checkpoint {
            task_id: self.task_id.clone(),
            sequence: self.sequence + 1,
            record,
            saved_at: Utc::now(),
        }
    }

    pub fn step(&self) -> TaskStatus {
        self.record.status
    }
}
