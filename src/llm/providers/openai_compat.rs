use super::LlmProvider;
use crate::errors::LlmError;
use crate::llm::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

/// Provider for any OpenAI-compatible chat completions endpoint (OpenAI,
/// DeepSeek, or a self-hosted gateway given by `base_url`)
#[derive(Debug)]
pub struct OpenAiCompatProvider {
    client: Client,
    /// Provider label used in error messages
    provider: String,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiCompatProvider {
    /// Creates a provider instance
    ///
    /// # Arguments
    /// * `provider` - "openai", "deepseek", or "openai_compatible"
    /// * `model` - The model identifier to use
    /// * `base_url` - Overrides the provider's default endpoint
    ///
    /// # Returns
    /// * `Result<Self, LlmError>` - Provider instance or error if the API key is missing
    pub fn new(provider: &str, model: &str, base_url: Option<&str>) -> Result<Self, LlmError> {
        let (key_var, default_url) = match provider {
            "openai" => ("OPENAI_API_KEY", Some("https://api.openai.com/v1")),
            "deepseek" => ("DEEPSEEK_API_KEY", Some("https://api.deepseek.com/v1")),
            "openai_compatible" => ("LLM_API_KEY", None),
            other => return Err(LlmError::UnknownProvider(other.to_string())),
        };

        let api_key = std::env::var(key_var).ok().filter(|k| !k.is_empty());
        // self-hosted gateways may run without a key
        if api_key.is_none() && default_url.is_some() {
            return Err(LlmError::MissingApiKey(key_var.to_string()));
        }

        let base_url = base_url
            .or(default_url)
            .ok_or_else(|| LlmError::Api {
                provider: provider.to_string(),
                body: "base_url is required for openai_compatible".to_string(),
            })?
            .trim_end_matches('/')
            .to_string();

        Ok(OpenAiCompatProvider {
            client: Client::new(),
            provider: provider.to_string(),
            api_key,
            model: model.to_string(),
            base_url,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn call_llm_api(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, LlmError> {
        let request_body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request_body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let res = request.send().await?;

        if !res.status().is_success() {
            let body = res.text().await?;
            return Err(LlmError::Api {
                provider: self.provider.clone(),
                body,
            });
        }

        let json_resp: serde_json::Value = res.json().await?;
        match json_resp["choices"][0]["message"]["content"].as_str() {
            Some(content) => {
                debug!("{} response: {}", self.provider, content);
                Ok(content.trim().to_string())
            }
            None => Err(LlmError::EmptyResponse(self.provider.clone())),
        }
    }
}
