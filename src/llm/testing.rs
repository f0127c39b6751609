use crate::errors::LlmError;
use crate::llm::{ChatMessage, LlmProvider};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Provider replaying canned answers and recording the prompts it saw
#[derive(Debug, Default)]
pub(crate) struct CannedProvider {
    answers: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl CannedProvider {
    pub fn new(answers: &[&str]) -> Self {
        CannedProvider {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmProvider for CannedProvider {
    async fn call_llm_api(
        &self,
        messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::EmptyResponse("canned".to_string()))
    }
}
