use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use common::{LlmConfig, ProviderKind};

use super::ollama::OllamaProvider;
use super::remote::RemoteLlmProvider;
use super::{LlmProvider, LlmRequest, LlmResponse};
use crate::error::{ProviderError, SummariseError};

/// Position of a provider in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    Primary,
    Secondary,
}

impl fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderRole::Primary => f.write_str("primary"),
            ProviderRole::Secondary => f.write_str("secondary"),
        }
    }
}

/// One provider call made while routing a request.
#[derive(Debug, Clone)]
pub struct ProviderAttempt {
    pub role: ProviderRole,
    pub provider: String,
    /// `None` when this attempt produced the result
    pub error: Option<ProviderError>,
}

/// Successful routing result.
#[derive(Debug, Clone)]
pub struct RoutedResponse {
    pub response: LlmResponse,
    pub role: ProviderRole,
    pub provider: String,
    /// Every attempt in call order, the successful one last
    pub attempts: Vec<ProviderAttempt>,
}

impl RoutedResponse {
    pub fn text(&self) -> &str {
        &self.response.content
    }
}

struct Route {
    role: ProviderRole,
    provider: Arc<dyn LlmProvider>,
}

/// Sends prompt pairs to an ordered list of providers, falling back to the
/// next one on any failure. The order is fixed at construction.
pub struct ProviderRouter {
    routes: Vec<Route>,
}

impl ProviderRouter {
    /// The first provider is primary, the rest secondary, tried in order.
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> anyhow::Result<Self> {
        if providers.is_empty() {
            anyhow::bail!("no usable LLM provider configured");
        }
        let routes = providers
            .into_iter()
            .enumerate()
            .map(|(i, provider)| Route {
                role: if i == 0 { ProviderRole::Primary } else { ProviderRole::Secondary },
                provider,
            })
            .collect();
        Ok(Self { routes })
    }

    /// Build the chain from config: the configured adapter first, then the
    /// other kind when fallback is enabled. OpenAI is skipped without a credential.
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let mut order = vec![config.adapter];
        if config.fallback {
            order.extend(ProviderKind::ALL.iter().copied().filter(|k| *k != config.adapter));
        }

        let mut providers: Vec<Arc<dyn LlmProvider>> = Vec::new();
        for kind in order {
            match build_provider(kind, config) {
                Some(provider) => {
                    info!(
                        kind = %kind,
                        provider = %provider.name(),
                        position = providers.len(),
                        "LLM provider configured"
                    );
                    providers.push(provider);
                }
                None => warn!(kind = %kind, "LLM provider skipped: no credentials configured"),
            }
        }

        Self::new(providers)
    }

    /// Provider names in the order they are tried.
    pub fn provider_names(&self) -> Vec<String> {
        self.routes.iter().map(|r| r.provider.name()).collect()
    }

    /// Try each provider in order until one succeeds. Each call is bounded by
    /// that provider's own timeout; a timeout counts as an ordinary failure.
    pub async fn route(&self, request: LlmRequest) -> Result<RoutedResponse, SummariseError> {
        let mut attempts: Vec<ProviderAttempt> = Vec::with_capacity(self.routes.len());

        for route in &self.routes {
            let name = route.provider.name();
            let limit = route.provider.timeout();

            let call = route.provider.generate(request.clone());
            let outcome = match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    provider: name.clone(),
                    seconds: limit.as_secs(),
                }),
            };

            match outcome {
                Ok(response) => {
                    attempts.push(ProviderAttempt {
                        role: route.role,
                        provider: name.clone(),
                        error: None,
                    });
                    info!(
                        provider = %name,
                        role = %route.role,
                        attempts = attempts.len(),
                        total_tokens = response.usage.total_tokens,
                        "LLM generation succeeded"
                    );
                    return Ok(RoutedResponse {
                        response,
                        role: route.role,
                        provider: name,
                        attempts,
                    });
                }
                Err(e) => {
                    warn!(
                        provider = %name,
                        role = %route.role,
                        error = %e,
                        "LLM provider failed, trying next"
                    );
                    attempts.push(ProviderAttempt {
                        role: route.role,
                        provider: name,
                        error: Some(e),
                    });
                }
            }
        }

        let count = attempts.len();
        match attempts.pop().and_then(|a| a.error) {
            Some(last) => Err(SummariseError::AllProvidersFailed { attempts: count, last }),
            // `new` rejects an empty chain, so at least one attempt failed
            None => Err(SummariseError::AllProvidersFailed {
                attempts: count,
                last: ProviderError::Transport {
                    provider: "router".to_string(),
                    message: "no providers attempted".to_string(),
                },
            }),
        }
    }
}

fn build_provider(kind: ProviderKind, config: &LlmConfig) -> Option<Arc<dyn LlmProvider>> {
    match kind {
        ProviderKind::OpenAi => RemoteLlmProvider::from_config(&config.openai)
            .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
        ProviderKind::Ollama => Some(Arc::new(OllamaProvider::from_config(&config.ollama))),
    }
}
