use serde::{Deserialize, Serialize};
use std::time::Duration;

use common::OllamaConfig;

use super::{non_empty, LlmProvider, LlmRequest, LlmResponse, UsageMetadata};
use crate::error::ProviderError;

/// Self-hosted provider speaking the Ollama `/api/generate` protocol.
pub struct OllamaProvider {
    base_url: String,
    model: String,
    default_timeout: Duration,
    temperature: f32,
    top_p: f32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            default_timeout: Duration::from_secs(300),
            temperature: 0.7,
            top_p: 0.9,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &OllamaConfig) -> Self {
        let mut provider = Self::new(&config.base_url, &config.model);
        provider.default_timeout = Duration::from_secs(config.timeout_seconds);
        provider.temperature = config.temperature;
        provider.top_p = config.top_p;
        provider
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> String {
        format!("ollama:{}", self.model)
    }

    fn timeout(&self) -> Duration {
        self.default_timeout
    }

    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError> {
        let name = self.name();
        let timeout = self.default_timeout;

        let body = GenerateRequest {
            model: &self.model,
            system: Some(request.system_prompt.as_str()).filter(|s| !s.is_empty()),
            prompt: &request.prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                top_p: self.top_p,
                num_predict: request.max_tokens,
            },
        };

        let exchange = async {
            let response = self
                .client
                .post(self.generate_url())
                .json(&body)
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
                .json::<GenerateResponse>()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: name.clone(),
                    message: format!("failed to parse Ollama response: {}", e),
                })
        };

        let parsed = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: name.clone(),
                seconds: timeout.as_secs(),
            })??;

        let prompt_tokens = parsed.prompt_eval_count.unwrap_or(0);
        let completion_tokens = parsed.eval_count.unwrap_or(0);

        Ok(LlmResponse {
            content: non_empty(&name, parsed.response)?,
            usage: UsageMetadata {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}
