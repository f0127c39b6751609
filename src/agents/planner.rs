use super::Planner;
use crate::constants::{
    MAX_PROMPT_ITEMS, PLANNER_CREATE_PROMPT, PLANNER_MODIFY_PROMPT, PLANNER_SUFFICIENCY_PROMPT,
    PLANNER_SYSTEM_PROMPT,
};
use crate::core::{Plan, SearchResult};
use crate::errors::{CollaboratorError, LlmError};
use crate::llm::{ChatMessage, LlmClient};
use crate::utils::format_results_for_prompt;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// LLM-backed planner
#[derive(Debug, Clone)]
pub struct LlmPlanner {
    llm: Arc<LlmClient>,
}

impl LlmPlanner {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        LlmPlanner { llm }
    }
}

fn is_yes_no(answer: &str) -> bool {
    let upper = answer.trim().to_ascii_uppercase();
    upper.starts_with("YES") || upper.starts_with("NO")
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn draft_plan(
        &self,
        query: &str,
        feedback: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        let mut prompt = format!("{}\n\nQuery: {}", PLANNER_CREATE_PROMPT, query);
        if let Some(feedback) = feedback {
            prompt.push_str(&format!("\n\nTake this user feedback into account: {}", feedback));
        }
        let messages = vec![
            ChatMessage::system(PLANNER_SYSTEM_PROMPT),
            ChatMessage::user(&prompt),
        ];
        Ok(self.llm.call_llm_api(&messages).await?)
    }

    async fn revise_plan(
        &self,
        query: &str,
        plan: &Plan,
        feedback: &str,
    ) -> Result<String, CollaboratorError> {
        let current = serde_json::to_string_pretty(plan)
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;
        let prompt = format!(
            "{}\n\nQuery: {}\n\nCurrent plan:\n{}\n\nUser feedback: {}",
            PLANNER_MODIFY_PROMPT, query, current, feedback
        );
        let messages = vec![
            ChatMessage::system(PLANNER_SYSTEM_PROMPT),
            ChatMessage::user(&prompt),
        ];
        Ok(self.llm.call_llm_api(&messages).await?)
    }

    async fn is_sufficient(
        &self,
        plan: &Plan,
        results: &[SearchResult],
    ) -> Result<bool, CollaboratorError> {
        if results.is_empty() {
            return Ok(false);
        }

        let prompt = format!(
            "{}\n\nResearch goal: {}\nCompletion criteria: {}\n\nFindings:\n{}",
            PLANNER_SUFFICIENCY_PROMPT,
            plan.research_goal,
            plan.completion_criteria,
            format_results_for_prompt(results, MAX_PROMPT_ITEMS)
        );
        let mut messages = vec![
            ChatMessage::system(PLANNER_SYSTEM_PROMPT),
            ChatMessage::user(&prompt),
        ];

        match self
            .llm
            .call_llm_with_format_check(&mut messages, is_yes_no, "Answer with YES or NO.", 2)
            .await
        {
            Ok(answer) => {
                let sufficient = answer.trim().to_ascii_uppercase().starts_with("YES");
                debug!("Sufficiency check answered {}", sufficient);
                Ok(sufficient)
            }
            Err(LlmError::FormatNotFollowed(_)) => {
                warn!("Sufficiency answer unreadable, continuing research");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
