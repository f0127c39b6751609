use super::{Coordinator, Planner, Rapporteur};
use crate::core::{OutputFormat, Plan, QueryKind, SearchResult};
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Coordinator with a fixed classification
pub(crate) struct ScriptedCoordinator {
    pub kind: QueryKind,
}

#[async_trait]
impl Coordinator for ScriptedCoordinator {
    async fn classify(&self, _query: &str) -> Result<QueryKind, CollaboratorError> {
        Ok(self.kind)
    }

    async fn respond(&self, query: &str, _kind: QueryKind) -> Result<String, CollaboratorError> {
        Ok(format!("Hello! You said: {}", query))
    }
}

/// Planner replaying scripted outputs; once the script runs out it keeps
/// answering with unparsable text.
#[derive(Default)]
pub(crate) struct ScriptedPlanner {
    outputs: Mutex<VecDeque<String>>,
    /// Sufficient once at least this many results were gathered
    pub sufficient_after: Option<usize>,
    pub draft_calls: AtomicUsize,
    pub revise_calls: AtomicUsize,
    pub feedback_seen: Mutex<Vec<String>>,
}

impl ScriptedPlanner {
    pub fn with_plans(outputs: Vec<&str>) -> Self {
        ScriptedPlanner {
            outputs: Mutex::new(outputs.into_iter().map(String::from).collect()),
            ..Default::default()
        }
    }

    fn next_output(&self) -> String {
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "no plan available".to_string())
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn draft_plan(
        &self,
        _query: &str,
        feedback: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        self.draft_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(feedback) = feedback {
            self.feedback_seen.lock().unwrap().push(feedback.to_string());
        }
        Ok(self.next_output())
    }

    async fn revise_plan(
        &self,
        _query: &str,
        _plan: &Plan,
        feedback: &str,
    ) -> Result<String, CollaboratorError> {
        self.revise_calls.fetch_add(1, Ordering::SeqCst);
        self.feedback_seen.lock().unwrap().push(feedback.to_string());
        Ok(self.next_output())
    }

    async fn is_sufficient(
        &self,
        _plan: &Plan,
        results: &[SearchResult],
    ) -> Result<bool, CollaboratorError> {
        Ok(self
            .sufficient_after
            .is_some_and(|n| !results.is_empty() && results.len() >= n))
    }
}

/// Deterministic report listing every result in order
#[derive(Default)]
pub(crate) struct ListingRapporteur {
    pub fail: bool,
}

#[async_trait]
impl Rapporteur for ListingRapporteur {
    async fn compose(
        &self,
        query: &str,
        _plan: &Plan,
        results: &[SearchResult],
        format: OutputFormat,
    ) -> Result<String, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Unavailable("writer offline".to_string()));
        }
        let lines = results
            .iter()
            .map(|r| format!("- {} {} {}", r.task_id, r.source, r.query))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(format!("# {} ({})\n{}", query, format, lines))
    }
}
