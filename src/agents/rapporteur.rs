use super::Rapporteur;
use crate::constants::{
    MAX_PROMPT_ITEMS, RAPPORTEUR_HTML_PROMPT, RAPPORTEUR_MARKDOWN_PROMPT, RAPPORTEUR_SYSTEM_PROMPT,
};
use crate::core::{OutputFormat, Plan, SearchResult};
use crate::errors::CollaboratorError;
use crate::llm::{ChatMessage, LlmClient};
use crate::utils::format_results_for_prompt;
use async_trait::async_trait;
use std::sync::Arc;

/// LLM-backed report writer
#[derive(Debug, Clone)]
pub struct LlmRapporteur {
    llm: Arc<LlmClient>,
}

impl LlmRapporteur {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        LlmRapporteur { llm }
    }
}

#[async_trait]
impl Rapporteur for LlmRapporteur {
    async fn compose(
        &self,
        query: &str,
        plan: &Plan,
        results: &[SearchResult],
        format: OutputFormat,
    ) -> Result<String, CollaboratorError> {
        let instructions = match format {
            OutputFormat::Markdown => RAPPORTEUR_MARKDOWN_PROMPT,
            OutputFormat::Html => RAPPORTEUR_HTML_PROMPT,
        };
        let subtasks = plan
            .sub_tasks
            .iter()
            .map(|t| format!("- [{}] {}", t.id, t.description))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "{}\n\nQuery: {}\nResearch goal: {}\nSubtasks:\n{}\n\nFindings:\n{}",
            instructions,
            query,
            plan.research_goal,
            subtasks,
            format_results_for_prompt(results, MAX_PROMPT_ITEMS)
        );
        let messages = vec![
            ChatMessage::system(RAPPORTEUR_SYSTEM_PROMPT),
            ChatMessage::user(&prompt),
        ];

        let report = self.llm.call_llm_api(&messages).await?;
        if report.trim().is_empty() {
            return Err(CollaboratorError::Unavailable(
                "report writer returned an empty report".to_string(),
            ));
        }
        Ok(report)
    }
}
