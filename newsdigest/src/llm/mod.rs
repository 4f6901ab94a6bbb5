use std::time::Duration;

use crate::error::ProviderError;

/// Core trait for LLM providers (self-hosted or remote)
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short label used in logs and attempt records, e.g. `openai:gpt-4o`
    fn name(&self) -> String;

    /// Upper bound for one `generate` call
    fn timeout(&self) -> Duration;

    /// Generate a completion for a system + user prompt pair
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError>;
}

/// Request structure for LLM generation
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub prompt: String,
    /// Completion length cap; providers fall back to their own default
    pub max_tokens: Option<usize>,
}

impl LlmRequest {
    pub fn new(system_prompt: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl From<crate::prompts::PromptPair> for LlmRequest {
    fn from(pair: crate::prompts::PromptPair) -> Self {
        LlmRequest::new(pair.system, pair.user)
    }
}

/// Response from LLM generation
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: UsageMetadata,
    pub model: String,
}

/// Token usage metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageMetadata {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

pub mod ollama;
pub mod remote;
pub mod router;

/// Reject blank completions so callers never pass empty text on as a result.
pub(crate) fn non_empty(provider: &str, content: String) -> Result<String, ProviderError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        Err(ProviderError::InvalidResponse {
            provider: provider.to_string(),
            message: "empty completion".to_string(),
        })
    } else {
        Ok(trimmed.to_string())
    }
}
