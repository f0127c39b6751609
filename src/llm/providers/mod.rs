use crate::errors::LlmError;
use crate::llm::ChatMessage;
use async_trait::async_trait;
use std::fmt::Debug;

pub mod anthropic;
pub mod openai_compat;

#[async_trait]
pub trait LlmProvider: Debug + Send + Sync {
    async fn call_llm_api(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, LlmError>;
}
