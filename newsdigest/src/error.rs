use thiserror::Error;

/// Failure of a single LLM provider call. The router treats every variant as
/// a reason to try the next provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{provider} timed out after {seconds}s")]
    Timeout { provider: String, seconds: u64 },

    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} returned an unusable response: {message}")]
    InvalidResponse { provider: String, message: String },
}

impl ProviderError {
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Timeout { provider, .. }
            | ProviderError::Transport { provider, .. }
            | ProviderError::Status { provider, .. }
            | ProviderError::InvalidResponse { provider, .. } => provider,
        }
    }

    /// Classify a reqwest error, keeping timeouts distinct from other transport failures.
    pub(crate) fn from_reqwest(provider: &str, seconds: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: provider.to_string(),
                seconds,
            }
        } else {
            ProviderError::Transport {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Content fetching failures. Both are absorbed before reaching a caller:
/// an unavailable feed becomes an empty article list and a failed scrape
/// falls back to the feed summary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("failed to scrape {url}: {reason}")]
    ArticleScrapeFailed { url: String, reason: String },
}

/// Errors visible to callers of the summariser.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SummariseError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("all {attempts} LLM providers failed; last error: {last}")]
    AllProvidersFailed { attempts: usize, last: ProviderError },
}

impl SummariseError {
    /// True for errors caused by the request itself rather than a backend.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            SummariseError::UnsupportedLanguage(_) | SummariseError::InvalidRequest(_)
        )
    }
}
