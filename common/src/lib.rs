/*!
common/src/lib.rs

Shared configuration types for newsdigest.

This file provides:
- Config data structures (deserialized from TOML, every section defaulted)
- An async loader merging a default file with an override file
- Environment overrides for provider selection and credentials
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Which LLM backend a provider slot talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions API (hosted)
    #[serde(alias = "remote")]
    OpenAi,
    /// Ollama `/api/generate` (self-hosted)
    #[serde(alias = "local")]
    Ollama,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Ollama];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "remote" => Ok(ProviderKind::OpenAi),
            "ollama" | "local" => Ok(ProviderKind::Ollama),
            other => anyhow::bail!(
                "Unknown LLM provider '{}' (expected 'openai' or 'ollama')",
                other
            ),
        }
    }
}

/// Syndication feed search endpoint and politeness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Search endpoint; the query goes into `q`
    pub search_url: String,
    /// Interface language (`hl`)
    pub language: String,
    /// Region (`gl`)
    pub region: String,
    /// Edition id (`ceid`)
    pub edition: String,
    pub timeout_seconds: u64,
    /// Total attempts for transient failures (5xx, 429, network)
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles afterwards
    pub retry_backoff_ms: u64,
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            search_url: "https://news.google.com/rss/search".to_string(),
            language: "en-IN".to_string(),
            region: "IN".to_string(),
            edition: "IN:en".to_string(),
            timeout_seconds: 10,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            user_agent: "newsdigest/0.1.0".to_string(),
        }
    }
}

/// Full-page article scraping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub timeout_seconds: u64,
    /// Extracted text is cut to this many characters
    pub max_content_chars: usize,
    pub user_agent: String,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            max_content_chars: 5000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
        }
    }
}

/// OpenAI-compatible provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// Resolved credential; filled from `api_key_env` by `Config::apply_env`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_tokens: Option<usize>,
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            timeout_seconds: 60,
            max_tokens: None,
            temperature: 0.7,
        }
    }
}

/// Self-hosted Ollama provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            timeout_seconds: 300,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

/// LLM top-level config: which adapter is primary, and whether the other one backs it up
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub adapter: ProviderKind,
    pub fallback: bool,
    pub openai: OpenAiConfig,
    pub ollama: OllamaConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            adapter: ProviderKind::OpenAi,
            fallback: true,
            openai: OpenAiConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Upper bound per session on cached translations and on memoised page
    /// text, least recently used dropped first; unbounded when unset
    pub max_entries: Option<usize>,
    /// Characters of the article summary sent for a brief translation
    pub summary_chars: usize,
    /// Completion token cap for a brief translation
    pub brief_max_tokens: usize,
    /// Sessions unused for this long are discarded; 0 keeps them forever
    pub session_idle_seconds: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            max_entries: None,
            summary_chars: 500,
            brief_max_tokens: 300,
            session_idle_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub scraping: ScrapingConfig,
    pub llm: LlmConfig,
    pub translation: TranslationConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        if let Some(path) = default_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await.with_context(|| {
                    format!("Failed to read default config: {}", path.display())
                })?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse default configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        if let Some(path) = override_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await.with_context(|| {
                    format!("Failed to read override config: {}", path.display())
                })?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse override configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` as the environment.
    ///
    /// The API key is always resolved through `llm.openai.api_key_env`, so a
    /// config file never has to carry the credential itself.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(provider) = var("AI_PROVIDER") {
            self.llm.adapter = provider
                .parse()
                .context("Invalid AI_PROVIDER environment variable")?;
        }
        if let Some(fallback) = var("AI_FALLBACK") {
            self.llm.fallback = !matches!(
                fallback.to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            );
        }

        if let Some(key) = var(&self.llm.openai.api_key_env) {
            self.llm.openai.api_key = Some(key);
        }
        if let Some(model) = var("OPENAI_MODEL") {
            self.llm.openai.model = model;
        }
        if let Some(url) = var("OPENAI_API_URL") {
            self.llm.openai.api_url = url;
        }

        if let Some(url) = var("OLLAMA_BASE_URL") {
            self.llm.ollama.base_url = url;
        }
        if let Some(model) = var("OLLAMA_DEFAULT_MODEL") {
            self.llm.ollama.model = model;
        }

        if let Some(url) = var("NEWS_FEED_URL") {
            self.feed.search_url = url;
        }

        Ok(())
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").expect("parse config");
        assert_eq!(cfg.llm.adapter, ProviderKind::OpenAi);
        assert!(cfg.llm.fallback);
        assert_eq!(cfg.scraping.max_content_chars, 5000);
        assert_eq!(cfg.feed.edition, "IN:en");
        assert_eq!(cfg.server.port, 8000);
        assert!(cfg.translation.max_entries.is_none());
        assert_eq!(cfg.translation.session_idle_seconds, 3600);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let toml = r#"
            [llm]
            adapter = "ollama"

            [llm.ollama]
            model = "qwen2.5:7b"
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.llm.adapter, ProviderKind::Ollama);
        assert_eq!(cfg.llm.ollama.model, "qwen2.5:7b");
        assert_eq!(cfg.llm.ollama.base_url, "http://localhost:11434");
        assert_eq!(cfg.llm.openai.model, "gpt-4o");
    }

    #[test]
    fn env_overrides_provider_and_credentials() {
        let vars = env(&[
            ("AI_PROVIDER", "Ollama"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OLLAMA_BASE_URL", "http://gpu-box:11434"),
            ("OLLAMA_DEFAULT_MODEL", "mistral"),
            ("AI_FALLBACK", "off"),
        ]);

        let mut cfg = Config::default();
        cfg.apply_env_with(|k| vars.get(k).cloned()).expect("apply env");

        assert_eq!(cfg.llm.adapter, ProviderKind::Ollama);
        assert_eq!(cfg.llm.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.llm.ollama.base_url, "http://gpu-box:11434");
        assert_eq!(cfg.llm.ollama.model, "mistral");
        assert!(!cfg.llm.fallback);
    }

    #[test]
    fn api_key_follows_configured_env_name() {
        let vars = env(&[("GROQ_KEY", "gsk-1"), ("OPENAI_API_KEY", "ignored")]);

        let mut cfg = Config::default();
        cfg.llm.openai.api_key_env = "GROQ_KEY".to_string();
        cfg.apply_env_with(|k| vars.get(k).cloned()).expect("apply env");

        assert_eq!(cfg.llm.openai.api_key.as_deref(), Some("gsk-1"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let vars = env(&[("AI_PROVIDER", "bard")]);
        let mut cfg = Config::default();
        let err = cfg.apply_env_with(|k| vars.get(k).cloned()).unwrap_err();
        assert!(format!("{:#}", err).contains("bard"));
    }

    #[tokio::test]
    async fn override_file_wins_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("config.default.toml");
        let override_path = dir.path().join("config.toml");

        tokio::fs::write(
            &default_path,
            "[feed]\ntimeout_seconds = 20\nmax_attempts = 5\n\n[server]\nport = 9000\n",
        )
        .await
        .expect("write default");
        tokio::fs::write(&override_path, "[feed]\nmax_attempts = 1\n")
            .await
            .expect("write override");

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load config");

        assert_eq!(cfg.feed.timeout_seconds, 20);
        assert_eq!(cfg.feed.max_attempts, 1);
        assert_eq!(cfg.server.port, 9000);
    }

    #[tokio::test]
    async fn missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");

        let cfg = Config::load_with_defaults(Some(&missing), None)
            .await
            .expect("load config");
        assert_eq!(cfg.feed.search_url, "https://news.google.com/rss/search");

        let from_file = Config::from_file(&missing).await;
        assert!(from_file.is_err());
    }
}
