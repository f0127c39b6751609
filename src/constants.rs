use std::time::Duration;

/// Default cap on research iterations
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Upper bound accepted for `max_iterations`
pub const MAX_ALLOWED_ITERATIONS: u32 = 20;

/// Default time a plan may wait for a human decision
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound accepted for a per-task approval timeout (one week)
pub const MAX_APPROVAL_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Interval at which a suspended approval re-reads the task store
pub const DEFAULT_APPROVAL_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Interval at which workers look for pending tasks
pub const WORKER_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Events of finished tasks older than this are pruned from the outbox
pub const EVENT_RETENTION_DAYS: i64 = 7;

/// Interval at which workers prune the event outbox
pub const EVENT_PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Interval at which the SQLite event bridge polls for new events
pub const BRIDGE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Source used by the fallback plan and by subtasks that name none
pub const DEFAULT_SOURCE: &str = "tavily";

/// Estimated iterations of the fallback plan
pub const FALLBACK_ESTIMATED_ITERATIONS: u32 = 2;

pub const FALLBACK_COMPLETION_CRITERIA: &str =
    "Gather sufficient information to answer the query";

/// Channel prefix for per-task bridge events
pub const TASK_CHANNEL_PREFIX: &str = "tasks:updates:";

/// Number of result items given to the sufficiency and report prompts
pub const MAX_PROMPT_ITEMS: usize = 30;

/// Schema a parsed plan must satisfy before it is accepted
pub const PLAN_SCHEMA: &str = r#"{
  "type": "object",
  "required": ["research_goal", "sub_tasks"],
  "properties": {
    "research_goal": { "type": "string", "minLength": 1 },
    "completion_criteria": { "type": "string" },
    "estimated_iterations": { "type": "integer", "minimum": 1 },
    "sub_tasks": {
      "type": "array",
      "minItems": 1,
      "items": {
        "type": "object",
        "required": ["task_id", "description"],
        "properties": {
          "task_id": { "type": "integer", "minimum": 0 },
          "description": { "type": "string" },
          "search_queries": { "type": "array", "items": { "type": "string" } },
          "sources": { "type": "array", "items": { "type": "string" } },
          "priority": { "type": ["integer", "null"] }
        }
      }
    }
  }
}"#;

pub const COORDINATOR_SYSTEM_PROMPT: &str = "You are the coordinator of a research assistant. You triage incoming requests before any research is planned.";

pub const COORDINATOR_CLASSIFY_PROMPT: &str = "Classify the following user request. Answer with exactly one word: GREETING if it is small talk, INAPPROPRIATE if it asks for harmful or disallowed content, RESEARCH otherwise.\n\nRequest:\n";

pub const COORDINATOR_RESPOND_PROMPT: &str = "The following request does not need research. Reply briefly and politely. If it is inappropriate, decline and explain that you can help with research questions.\n\nRequest:\n";

pub const PLANNER_SYSTEM_PROMPT: &str = "You are a meticulous research planner. You break research questions into focused subtasks with concrete search queries, and you answer with JSON only.";

pub const PLANNER_CREATE_PROMPT: &str = "Create a research plan for the query below. Answer with a single JSON object of the form:\n{\"research_goal\": string, \"sub_tasks\": [{\"task_id\": int, \"description\": string, \"search_queries\": [string], \"sources\": [string], \"priority\": int}], \"completion_criteria\": string, \"estimated_iterations\": int}\nSources are \"tavily\" (web search) and \"arxiv\" (academic papers); name one or both per subtask.\nLower priority numbers run first.";

pub const PLANNER_MODIFY_PROMPT: &str = "Revise the research plan below according to the user's feedback. Keep the same JSON structure and answer with the complete revised plan only.";

pub const PLANNER_SUFFICIENCY_PROMPT: &str = "Decide whether the findings below are sufficient to satisfy the completion criteria. Answer with exactly YES or NO.";

pub const RAPPORTEUR_SYSTEM_PROMPT: &str = "You are a rigorous research writer. You turn raw search findings into a structured, well-sourced report and cite the URLs you rely on.";

pub const RAPPORTEUR_MARKDOWN_PROMPT: &str = "Write the final research report in Markdown with a title, an executive summary, sections per research subtask, and a references list.";

pub const RAPPORTEUR_HTML_PROMPT: &str = "Write the final research report as a standalone HTML document with a title, an executive summary, sections per research subtask, and a references list. Answer with the HTML only.";

/// Feedback handed to the planner when a plan is rejected without comments
pub const DEFAULT_REJECTION_FEEDBACK: &str =
    "Plan rejected without comments; propose a different plan.";
