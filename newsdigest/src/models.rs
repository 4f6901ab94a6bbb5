use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SummariseError;

/// A normalized feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Plain-text title (markup stripped)
    pub title: String,
    pub link: String,
    /// Plain-text feed excerpt (markup stripped)
    pub summary: String,
    /// Scraped page text, filled on demand
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            summary: summary.into(),
            full_content: None,
            published: None,
        }
    }

    /// Stable identity used for caching derived content: the link when there
    /// is one, otherwise the title and summary text.
    pub fn identity(&self) -> String {
        if self.link.trim().is_empty() {
            format!("{}\n{}", self.title, self.summary)
        } else {
            self.link.clone()
        }
    }
}

/// Languages with prompt templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    English,
    Hindi,
}

impl Language {
    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "Hindi",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = SummariseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "hindi" | "hi" | "हिंदी" | "हिन्दी" => Ok(Language::Hindi),
            _ => Err(SummariseError::UnsupportedLanguage(s.to_string())),
        }
    }
}

fn default_max_articles() -> usize {
    10
}

fn default_language() -> String {
    Language::Hindi.name().to_string()
}

/// Input to `NewsSummariser::summarize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub query: String,
    #[serde(default)]
    pub location: String,
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
    /// Language name or code, validated against the template table
    #[serde(default = "default_language")]
    pub language: String,
    /// Optional recency window such as `1d` or `7d`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

impl SummaryRequest {
    pub fn new(
        query: impl Into<String>,
        location: impl Into<String>,
        max_articles: usize,
        language: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            location: location.into(),
            max_articles,
            language: language.into(),
            when: None,
        }
    }

    pub fn with_when(mut self, when: impl Into<String>) -> Self {
        self.when = Some(when.into());
        self
    }

    /// Check the request without touching the network and resolve its language.
    pub fn validate(&self) -> Result<Language, SummariseError> {
        let language: Language = self.language.parse()?;
        if self.max_articles == 0 {
            return Err(SummariseError::InvalidRequest(
                "max_articles must be greater than zero".to_string(),
            ));
        }
        if self.query.trim().is_empty() && self.location.trim().is_empty() {
            return Err(SummariseError::InvalidRequest(
                "query and location are both empty".to_string(),
            ));
        }
        Ok(language)
    }
}

/// How the `summary` field of a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    Summarized,
    NoArticles,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub status: SummaryStatus,
    pub articles: Vec<Article>,
    pub articles_found: usize,
    pub query_used: String,
    pub language: Language,
    /// Provider that produced the summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_parses_names_and_codes() {
        assert_eq!("Hindi".parse::<Language>().unwrap(), Language::Hindi);
        assert_eq!(" english ".parse::<Language>().unwrap(), Language::English);
        assert_eq!("hi".parse::<Language>().unwrap(), Language::Hindi);
        assert_eq!("EN".parse::<Language>().unwrap(), Language::English);
    }

    #[test]
    fn unknown_language_is_unsupported() {
        let err = "xx".parse::<Language>().unwrap_err();
        assert_eq!(err, SummariseError::UnsupportedLanguage("xx".to_string()));
    }

    #[test]
    fn validate_rejects_zero_articles() {
        let req = SummaryRequest::new("gaya", "Bihar", 0, "Hindi");
        assert!(matches!(req.validate(), Err(SummariseError::InvalidRequest(_))));
    }

    #[test]
    fn validate_checks_language_first() {
        let req = SummaryRequest::new("gaya", "Bihar", 0, "xx");
        assert!(matches!(req.validate(), Err(SummariseError::UnsupportedLanguage(_))));
    }

    #[test]
    fn request_defaults_from_json() {
        let req: SummaryRequest = serde_json::from_str(r#"{"query": "elections"}"#).unwrap();
        assert_eq!(req.max_articles, 10);
        assert_eq!(req.language, "Hindi");
        assert_eq!(req.location, "");
        assert!(req.when.is_none());
    }

    #[test]
    fn identity_prefers_link() {
        let linked = Article::new("T", "https://example.com/a", "S");
        assert_eq!(linked.identity(), "https://example.com/a");

        let unlinked = Article::new("T", "", "S");
        assert_eq!(unlinked.identity(), "T\nS");
    }
}
