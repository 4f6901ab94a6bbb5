use serde::{Deserialize, Serialize};
use std::time::Duration;

use common::OpenAiConfig;

use super::{non_empty, LlmProvider, LlmRequest, LlmResponse, UsageMetadata};
use crate::error::ProviderError;

/// Remote LLM provider using OpenAI-compatible HTTP API
pub struct RemoteLlmProvider {
    base_url: String,
    api_key: String,
    model: String,
    default_timeout: Duration,
    default_max_tokens: Option<usize>,
    default_temperature: f32,
    client: reqwest::Client,
}

impl RemoteLlmProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            default_timeout: Duration::from_secs(60),
            default_max_tokens: None,
            default_temperature: 0.7,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_defaults(
        mut self,
        timeout_secs: u64,
        max_tokens: Option<usize>,
        temperature: f32,
    ) -> Self {
        self.default_timeout = Duration::from_secs(timeout_secs);
        self.default_max_tokens = max_tokens;
        self.default_temperature = temperature;
        self
    }

    /// Build from config; `None` when no credential was resolved.
    pub fn from_config(config: &OpenAiConfig) -> Option<Self> {
        let api_key = config.api_key.as_deref().filter(|k| !k.is_empty())?;
        Some(
            Self::new(&config.api_url, api_key, &config.model).with_defaults(
                config.timeout_seconds,
                config.max_tokens,
                config.temperature,
            ),
        )
    }
}

#[async_trait::async_trait]
impl LlmProvider for RemoteLlmProvider {
    fn name(&self) -> String {
        format!("openai:{}", self.model)
    }

    fn timeout(&self) -> Duration {
        self.default_timeout
    }

    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError> {
        let name = self.name();
        let timeout = self.default_timeout;

        let max_tokens = request.max_tokens.or(self.default_max_tokens);
        let temperature = self.default_temperature;

        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(Message {
                role: "system".to_string(),
                content: request.system_prompt,
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: request.prompt,
        });

        // Build OpenAI-compatible request
        let req_body = OpenAiRequest {
            model: self.model.clone(),
            messages,
            max_tokens,
            temperature: Some(temperature),
        };

        // Bound the whole exchange, body included
        let exchange = async {
            let response = self
                .client
                .post(&self.base_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&req_body)
                .send()
                .await
                .map_err(|e| ProviderError::from_reqwest(&name, timeout.as_secs(), e))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Status {
                    provider: name.clone(),
                    status: status.as_u16(),
                    body,
                });
            }

            response
                .json::<OpenAiResponse>()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: name.clone(),
                    message: format!("failed to parse LLM response: {}", e),
                })
        };

        let resp_body = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: name.clone(),
                seconds: timeout.as_secs(),
            })??;

        let choice = resp_body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: name.clone(),
                message: "LLM response has no choices".to_string(),
            })?;

        let usage = resp_body
            .usage
            .map(|u| UsageMetadata {
                prompt_tokens: u.prompt_tokens.unwrap_or(0),
                completion_tokens: u.completion_tokens.unwrap_or(0),
                total_tokens: u.total_tokens.unwrap_or(0),
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content: non_empty(&name, choice.message.content)?,
            usage,
            model: resp_body.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

// OpenAI API request/response structures
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<usize>,
    #[serde(default)]
    completion_tokens: Option<usize>,
    #[serde(default)]
    total_tokens: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_needs_a_credential() {
        let mut config = OpenAiConfig::default();
        assert!(RemoteLlmProvider::from_config(&config).is_none());

        config.api_key = Some("sk-test".to_string());
        let provider = RemoteLlmProvider::from_config(&config).expect("provider");
        assert_eq!(provider.name(), "openai:gpt-4o");
        assert_eq!(provider.timeout(), Duration::from_secs(60));
    }
}
