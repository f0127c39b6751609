use super::task_state::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Report format requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Html,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Html => "html",
        }
    }

    /// File extension used for the report artifact
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Html => "html",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "html" => Ok(OutputFormat::Html),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

/// Classification of the incoming query made by the coordinate step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Research,
    Greeting,
    Inappropriate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskStatus {
    #[default]
    Pending,
    Completed,
}

/// One unit of search work inside a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    #[serde(rename = "task_id", alias = "id")]
    pub id: u32,
    pub description: String,
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub sources: BTreeSet<String>,
    #[serde(default)]
    pub status: SubTaskStatus,
    #[serde(default)]
    pub priority: Option<i32>,
}

impl SubTask {
    pub fn is_pending(&self) -> bool {
        self.status == SubTaskStatus::Pending
    }
}

/// Structured breakdown of a query into prioritized subtasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub research_goal: String,
    pub sub_tasks: Vec<SubTask>,
    #[serde(default)]
    pub completion_criteria: String,
    #[serde(default = "default_estimated_iterations")]
    pub estimated_iterations: u32,
}

fn default_estimated_iterations() -> u32 {
    crate::constants::FALLBACK_ESTIMATED_ITERATIONS
}

impl Plan {
    /// Resets every subtask to `pending`
    pub fn reset_statuses(&mut self) {
        for sub_task in &mut self.sub_tasks {
            sub_task.status = SubTaskStatus::Pending;
        }
    }

    pub fn mark_completed(&mut self, sub_task_id: u32) -> bool {
        match self.sub_tasks.iter_mut().find(|t| t.id == sub_task_id) {
            Some(sub_task) => {
                sub_task.status = SubTaskStatus::Completed;
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.sub_tasks.iter().filter(|t| t.is_pending()).count()
    }
}

/// A single hit returned by a search tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchItem {
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Outcome of one (query, source) search for a subtask. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub task_id: u32,
    pub query: String,
    pub source: String,
    #[serde(default)]
    pub items: Vec<SearchItem>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A human decision on the current plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    #[serde(default)]
    pub feedback: Option<String>,
    /// Approval round this decision answers; `None` targets the open or next round
    #[serde(default)]
    pub round: Option<u32>,
    pub decided_at: DateTime<Utc>,
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        Self {
            approved: true,
            feedback: None,
            round: None,
            decided_at: Utc::now(),
        }
    }

    pub fn reject(feedback: impl Into<String>) -> Self {
        Self {
            approved: false,
            feedback: Some(feedback.into()),
            round: None,
            decided_at: Utc::now(),
        }
    }

    pub fn for_round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }
}

/// Why a task ended in `Failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub reason: String,
    pub message: String,
    /// Last observed state snapshot, kept for operators
    #[serde(default)]
    pub debug: Option<String>,
}

/// Operator-facing progress summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub step: TaskStatus,
    pub iteration: u32,
    pub max_iterations: u32,
    pub current_task: Option<String>,
}

/// Parameters of a new research request
#[derive(Debug, Clone)]
pub struct NewTask {
    pub query: String,
    pub max_iterations: u32,
    pub output_format: OutputFormat,
    pub auto_approve: bool,
    pub approval_timeout_secs: u64,
}

/// Durable record of one research request, keyed by `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub query: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub query_kind: Option<QueryKind>,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub plan_approved: bool,
    #[serde(default)]
    pub user_feedback: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub current_task: Option<SubTask>,
    #[serde(default)]
    pub iteration_count: u32,
    pub max_iterations: u32,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub final_report: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub auto_approve: bool,
    pub approval_timeout_secs: u64,
    /// Number of approval instances opened so far
    #[serde(default)]
    pub approval_round: u32,
    /// Highest approval round whose decision the engine has consumed
    #[serde(default)]
    pub consumed_round: u32,
    #[serde(default)]
    pub approval_deadline: Option<DateTime<Utc>>,
    /// Recorded but not yet consumed decision
    #[serde(default)]
    pub decision: Option<ApprovalDecision>,
    #[serde(default)]
    pub failure: Option<Failure>,
    #[serde(default)]
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(id: String, request: NewTask) -> Self {
        let now = Utc::now();
        Self {
            id,
            query: request.query,
            status: TaskStatus::Pending,
            query_kind: None,
            plan: None,
            plan_approved: false,
            user_feedback: None,
            results: Vec::new(),
            current_task: None,
            iteration_count: 0,
            max_iterations: request.max_iterations,
            output_format: request.output_format,
            final_report: None,
            output_path: None,
            auto_approve: request.auto_approve,
            approval_timeout_secs: request.approval_timeout_secs,
            approval_round: 0,
            consumed_round: 0,
            approval_deadline: None,
            decision: None,
            failure: None,
            claimed_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            step: self.status,
            iteration: self.iteration_count,
            max_iterations: self.max_iterations,
            current_task: self.current_task.as_ref().map(|t| t.description.clone()),
        }
    }

    /// Decision applicable to the currently open approval round, if any
    pub fn pending_decision(&self) -> Option<&ApprovalDecision> {
        self.decision
            .as_ref()
            .filter(|d| d.round.map_or(true, |r| r == self.approval_round))
    }

    /// Round an incoming decision without an explicit round should target
    pub fn decision_target_round(&self) -> u32 {
        if self.status == TaskStatus::AwaitingApproval {
            self.approval_round
        } else {
            self.approval_round + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TaskRecord {
        TaskRecord::new(
            "t-1".to_string(),
            NewTask {
                query: "rust async runtimes".to_string(),
                max_iterations: 3,
                output_format: OutputFormat::Markdown,
                auto_approve: false,
                approval_timeout_secs: 300,
            },
        )
    }

    #[test]
    fn subtask_accepts_task_id_and_id_keys() {
        let a: SubTask =
            serde_json::from_str(r#"{"task_id": 4, "description": "a", "priority": 2}"#).unwrap();
        let b: SubTask = serde_json::from_str(r#"{"id": 4, "description": "a"}"#).unwrap();
        assert_eq!(a.id, 4);
        assert_eq!(b.id, 4);
        assert_eq!(a.status, SubTaskStatus::Pending);
        assert_eq!(b.priority, None);
    }

    #[test]
    fn record_survives_json_roundtrip_with_defaults() {
        let rec = record();
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["output_format"], "markdown");
        let back: TaskRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn pending_decision_ignores_other_rounds() {
        let mut rec = record();
        rec.status = TaskStatus::AwaitingApproval;
        rec.approval_round = 2;
        rec.decision = Some(ApprovalDecision::approve().for_round(1));
        assert!(rec.pending_decision().is_none());
        rec.decision = Some(ApprovalDecision::approve().for_round(2));
        assert!(rec.pending_decision().is_some());
        rec.decision = Some(ApprovalDecision::approve());
        assert!(rec.pending_decision().is_some());
    }

    #[test]
    fn decision_target_round_depends_on_status() {
        let mut rec = record();
        assert_eq!(rec.decision_target_round(), 1);
        rec.status = TaskStatus::AwaitingApproval;
        rec.approval_round = 1;
        assert_eq!(rec.decision_target_round(), 1);
    }

    #[test]
    fn mark_completed_only_touches_matching_subtask() {
        let mut plan = Plan {
            research_goal: "g".into(),
            sub_tasks: vec![
                SubTask {
                    id: 1,
                    description: "one".into(),
                    search_queries: vec![],
                    sources: BTreeSet::new(),
                    status: SubTaskStatus::Pending,
                    priority: None,
                },
                SubTask {
                    id: 2,
                    description: "two".into(),
                    search_queries: vec![],
                    sources: BTreeSet::new(),
                    status: SubTaskStatus::Pending,
                    priority: None,
                },
            ],
            completion_criteria: String::new(),
            estimated_iterations: 2,
        };
        assert!(plan.mark_completed(2));
        assert!(!plan.mark_completed(9));
        assert_eq!(plan.pending_count(), 1);
        plan.reset_statuses();
        assert_eq!(plan.pending_count(), 2);
    }
}
