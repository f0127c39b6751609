use crate::config::LlmConfig;
use crate::errors::LlmError;
use crate::llm::providers::anthropic::AnthropicProvider;
use crate::llm::providers::openai_compat::OpenAiCompatProvider;
use crate::llm::providers::LlmProvider;
use crate::llm::ChatMessage;
use tracing::{debug, info};

/// Generic LLM client that delegates work to a concrete provider.
#[derive(Debug)]
pub struct LlmClient {
    provider: Box<dyn LlmProvider>,
    temperature: f32,
}

impl LlmClient {
    /// Creates a client for the provider named in `config`.
    ///
    /// # Arguments
    /// * `config` - LLM section of the application configuration
    ///
    /// # Returns
    /// * `Result<LlmClient, LlmError>` - New client or error for unknown providers and missing keys
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider: Box<dyn LlmProvider> = match config.provider.as_str() {
            "anthropic" => Box::new(AnthropicProvider::new(&config.model)?),
            "openai" | "deepseek" | "openai_compatible" => Box::new(OpenAiCompatProvider::new(
                &config.provider,
                &config.model,
                config.base_url.as_deref(),
            )?),
            other => return Err(LlmError::UnknownProvider(other.to_string())),
        };

        Ok(LlmClient {
            provider,
            temperature: config.temperature,
        })
    }

    pub fn with_provider(provider: Box<dyn LlmProvider>, temperature: f32) -> Self {
        LlmClient {
            provider,
            temperature,
        }
    }

    /// Calls the LLM and returns the raw response text
    pub async fn call_llm_api(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.provider
            .call_llm_api(messages, self.temperature)
            .await
    }

    /// Calls the LLM with format validation and automatic retries if the
    /// format check fails.
    ///
    /// # Arguments
    /// * `messages` - Conversation so far; retry reminders are appended to it
    /// * `validate_response` - Function to validate response format
    /// * `format_reminder` - Format instructions to include in retry attempts
    /// * `max_retries` - Maximum number of attempts
    ///
    /// # Returns
    /// * `Result<String, LlmError>` - Validated LLM response or error
    pub async fn call_llm_with_format_check<F>(
        &self,
        messages: &mut Vec<ChatMessage>,
        validate_response: F,
        format_reminder: &str,
        max_retries: usize,
    ) -> Result<String, LlmError>
    where
        F: Fn(&str) -> bool,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;
            let response = self.call_llm_api(messages).await?;
            debug!("LLM response: {}", response);

            if validate_response(&response) {
                return Ok(response);
            }
            if attempts >= max_retries {
                info!(
                    "LLM did not follow the format after {} attempts, last response: {}",
                    max_retries, response
                );
                return Err(LlmError::FormatNotFollowed(attempts));
            }

            messages.push(ChatMessage::new("assistant", &response));
            messages.push(ChatMessage::user(&format!(
                "Your last answer did not follow the required format.\n{}\nPlease answer again following exactly these formatting rules.",
                format_reminder
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::CannedProvider;

    #[tokio::test]
    async fn format_check_retries_with_reminder() {
        let client = LlmClient::with_provider(
            Box::new(CannedProvider::new(&["maybe", "YES"])),
            0.0,
        );
        let mut messages = vec![ChatMessage::user("answer YES or NO")];
        let answer = client
            .call_llm_with_format_check(
                &mut messages,
                |r| r == "YES" || r == "NO",
                "Answer YES or NO.",
                3,
            )
            .await
            .unwrap();

        assert_eq!(answer, "YES");
        assert_eq!(messages.len(), 3);
        assert!(messages[2].content.contains("Answer YES or NO."));
    }

    #[tokio::test]
    async fn format_check_gives_up_after_max_retries() {
        let client = LlmClient::with_provider(
            Box::new(CannedProvider::new(&["a", "b", "c"])),
            0.0,
        );
        let mut messages = vec![ChatMessage::user("answer YES or NO")];
        let err = client
            .call_llm_with_format_check(&mut messages, |r| r == "YES", "YES", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::FormatNotFollowed(2)));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = LlmConfig {
            provider: "mystery".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            LlmClient::new(&config),
            Err(LlmError::UnknownProvider(_))
        ));
    }
}
