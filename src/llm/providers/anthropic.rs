use super::LlmProvider;
use crate::errors::LlmError;
use crate::llm::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Provider implementation for Anthropic's messages API
#[derive(Debug)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(model: &str) -> Result<Self, LlmError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| LlmError::MissingApiKey("ANTHROPIC_API_KEY".to_string()))?;
        Ok(AnthropicProvider {
            client: Client::new(),
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    /// System messages are lifted into the top-level `system` field; the
    /// remaining messages are sent in order.
    async fn call_llm_api(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, LlmError> {
        let (system_messages, chat_messages): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
            messages.iter().partition(|msg| msg.is_system());
        let system_content = system_messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let request_body = json!({
            "model": self.model,
            "system": system_content,
            "max_tokens": 4096,
            "temperature": temperature,
            "messages": chat_messages,
        });

        let res = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request_body)
            .send()
            .await?;

        if !res.status().is_success() {
            let body = res.text().await?;
            return Err(LlmError::Api {
                provider: "anthropic".to_string(),
                body,
            });
        }

        let json_resp: serde_json::Value = res.json().await?;
        match json_resp["content"][0]["text"].as_str() {
            Some(content) => {
                debug!("Anthropic response: {}", content);
                Ok(content.trim().to_string())
            }
            None => Err(LlmError::EmptyResponse("anthropic".to_string())),
        }
    }
}
