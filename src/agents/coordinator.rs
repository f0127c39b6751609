use super::Coordinator;
use crate::constants::{
    COORDINATOR_CLASSIFY_PROMPT, COORDINATOR_RESPOND_PROMPT, COORDINATOR_SYSTEM_PROMPT,
};
use crate::core::QueryKind;
use crate::errors::{CollaboratorError, LlmError};
use crate::llm::{ChatMessage, LlmClient};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// LLM-backed triage of incoming queries
#[derive(Debug, Clone)]
pub struct LlmCoordinator {
    llm: Arc<LlmClient>,
}

impl LlmCoordinator {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        LlmCoordinator { llm }
    }
}

/// Reads the classification word out of a model answer
pub fn parse_query_kind(answer: &str) -> Option<QueryKind> {
    let word = answer
        .trim()
        .trim_matches(|c: char| !c.is_ascii_alphabetic())
        .to_ascii_uppercase();
    match word.as_str() {
        "RESEARCH" => Some(QueryKind::Research),
        "GREETING" => Some(QueryKind::Greeting),
        "INAPPROPRIATE" => Some(QueryKind::Inappropriate),
        _ => None,
    }
}

#[async_trait]
impl Coordinator for LlmCoordinator {
    async fn classify(&self, query: &str) -> Result<QueryKind, CollaboratorError> {
        let mut messages = vec![
            ChatMessage::system(COORDINATOR_SYSTEM_PROMPT),
            ChatMessage::user(&format!("{}{}", COORDINATOR_CLASSIFY_PROMPT, query)),
        ];
        let answer = self
            .llm
            .call_llm_with_format_check(
                &mut messages,
                |r| parse_query_kind(r).is_some(),
                "Answer with exactly one word: GREETING, INAPPROPRIATE or RESEARCH.",
                2,
            )
            .await;

        match answer {
            Ok(answer) => {
                let kind = parse_query_kind(&answer).unwrap_or(QueryKind::Research);
                debug!("Query classified as {:?}", kind);
                Ok(kind)
            }
            Err(LlmError::FormatNotFollowed(attempts)) => {
                warn!(
                    "Unclear classification after {} attempts, treating query as research",
                    attempts
                );
                Ok(QueryKind::Research)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn respond(&self, query: &str, _kind: QueryKind) -> Result<String, CollaboratorError> {
        let messages = vec![
            ChatMessage::system(COORDINATOR_SYSTEM_PROMPT),
            ChatMessage::user(&format!("{}{}", COORDINATOR_RESPOND_PROMPT, query)),
        ];
        Ok(self.llm.call_llm_api(&messages).await?)
    }
}
