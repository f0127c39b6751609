use super::task::{Plan, SubTask, SubTaskStatus};
use crate::agents::Planner;
use crate::constants::{FALLBACK_COMPLETION_CRITERIA, FALLBACK_ESTIMATED_ITERATIONS, PLAN_SCHEMA};
use crate::errors::PlanParseError;
use crate::llm::{build_validator, extract_json_object};
use jsonschema::Validator;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Turns free-form planner output into a structured `Plan`.
///
/// Parsing never fails the task: `build` falls back to a one-subtask plan,
/// `modify` keeps the current plan.
pub struct PlanBuilder {
    validator: Validator,
    /// Source assigned to fallback subtasks and to subtasks naming none
    default_source: String,
}

impl PlanBuilder {
    pub fn new(default_source: &str) -> Result<Self, PlanParseError> {
        Ok(PlanBuilder {
            validator: build_validator(PLAN_SCHEMA)?,
            default_source: default_source.to_string(),
        })
    }

    /// Creates a plan for `query`, optionally guided by user feedback
    pub async fn build(&self, planner: &dyn Planner, query: &str, feedback: Option<&str>) -> Plan {
        let text = match planner.draft_plan(query, feedback).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Planner failed ({}), using fallback plan", e);
                return fallback_plan(query, &self.default_source);
            }
        };

        match self.parse(&text) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Could not parse planner output ({}), using fallback plan", e);
                debug!("Unparsable planner output: {}", text);
                fallback_plan(query, &self.default_source)
            }
        }
    }

    /// Revises `current` according to `feedback`. Any failure keeps `current`,
    /// with its subtasks reset to pending.
    pub async fn modify(
        &self,
        planner: &dyn Planner,
        query: &str,
        current: &Plan,
        feedback: &str,
    ) -> Plan {
        let revised = match planner.revise_plan(query, current, feedback).await {
            Ok(text) => self.parse(&text).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match revised {
            Ok(plan) => plan,
            Err(reason) => {
                warn!("Plan revision failed ({}), keeping current plan", reason);
                let mut plan = current.clone();
                plan.reset_statuses();
                plan
            }
        }
    }

    /// Parses the first JSON object of `text` into a validated plan with
    /// every subtask pending
    pub fn parse(&self, text: &str) -> Result<Plan, PlanParseError> {
        let json = extract_json_object(text).ok_or(PlanParseError::NoJsonObject)?;
        let mut value: Value = serde_json::from_str(json)?;
        if !self.validator.is_valid(&value) {
            return Err(PlanParseError::Invalid);
        }

        if let Some(sub_tasks) = value.get_mut("sub_tasks").and_then(Value::as_array_mut) {
            for sub_task in sub_tasks.iter_mut().filter_map(Value::as_object_mut) {
                sub_task.insert("status".to_string(), Value::String("pending".to_string()));
            }
        }

        let mut plan: Plan = serde_json::from_value(value)?;
        let mut seen = HashSet::new();
        for sub_task in &mut plan.sub_tasks {
            if !seen.insert(sub_task.id) {
                return Err(PlanParseError::DuplicateSubTaskId(sub_task.id));
            }
            normalize(sub_task, &self.default_source);
        }
        Ok(plan)
    }
}

fn normalize(sub_task: &mut SubTask, default_source: &str) {
    sub_task
        .search_queries
        .retain(|query| !query.trim().is_empty());
    if sub_task.search_queries.is_empty() {
        sub_task.search_queries.push(sub_task.description.clone());
    }
    if sub_task.sources.is_empty() {
        sub_task.sources.insert(default_source.to_string());
    }
}

/// Deterministic minimal plan used when planner output is unusable
pub fn fallback_plan(query: &str, source: &str) -> Plan {
    Plan {
        research_goal: query.to_string(),
        sub_tasks: vec![SubTask {
            id: 1,
            description: format!("Research: {}", query),
            search_queries: vec![query.to_string()],
            sources: BTreeSet::from([source.to_string()]),
            status: SubTaskStatus::Pending,
            priority: Some(1),
        }],
        completion_criteria: FALLBACK_COMPLETION_CRITERIA.to_string(),
        estimated_iterations: FALLBACK_ESTIMATED_ITERATIONS,
    }
}
