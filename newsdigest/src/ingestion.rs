use anyhow::Context;
use common::FeedConfig;
use feed_rs::model::{Entry, Feed};
use feed_rs::parser;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::error::FetchError;
use crate::models::Article;
use crate::scraping::strip_html;

/// Build the feed search string: location first, then the topic.
pub fn search_query(query: &str, location: &str) -> String {
    let query = query.trim();
    let location = location.trim();
    if location.is_empty() {
        query.to_string()
    } else {
        format!("{} {}", location, query).trim().to_string()
    }
}

/// Normalize one feed entry. Markup in the title and summary is stripped.
pub fn article_from_entry(entry: &Entry) -> Article {
    let title = entry
        .title
        .as_ref()
        .map(|t| strip_html(&t.content))
        .unwrap_or_default();
    let link = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();
    let summary = entry
        .summary
        .as_ref()
        .map(|s| s.content.as_str())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.as_deref()))
        .map(strip_html)
        .unwrap_or_default();

    Article {
        title,
        link,
        summary,
        full_content: None,
        published: entry.published.or(entry.updated),
    }
}

/// Retrieves a bounded, ordered list of articles from a syndication search feed.
pub struct NewsFetcher {
    client: Client,
    config: FeedConfig,
}

impl NewsFetcher {
    pub fn new(config: FeedConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { client, config })
    }

    /// Feed URL for a search string, with locale parameters and an optional
    /// recency window (`all` means none).
    pub fn feed_url(&self, search_query: &str, when: Option<&str>) -> Result<Url, FetchError> {
        let mut q = search_query.trim().to_string();
        if let Some(window) = when
            .map(str::trim)
            .filter(|w| !w.is_empty() && !w.eq_ignore_ascii_case("all"))
        {
            q = format!("{} when:{}", q, window);
        }

        let mut url = Url::parse(&self.config.search_url).map_err(|e| {
            FetchError::FeedUnavailable(format!(
                "invalid feed URL {}: {}",
                self.config.search_url, e
            ))
        })?;
        url.query_pairs_mut()
            .append_pair("q", &q)
            .append_pair("hl", &self.config.language)
            .append_pair("gl", &self.config.region)
            .append_pair("ceid", &self.config.edition);
        Ok(url)
    }

    /// Articles for `(query, location)`, at most `max_articles`, in feed order.
    /// An unavailable feed yields an empty list.
    pub async fn fetch_articles(
        &self,
        query: &str,
        location: &str,
        max_articles: usize,
    ) -> Vec<Article> {
        self.search(&search_query(query, location), None, max_articles).await
    }

    /// Like `fetch_articles`, for an already-built search string.
    pub async fn search(
        &self,
        search_query: &str,
        when: Option<&str>,
        max_articles: usize,
    ) -> Vec<Article> {
        match self.try_search(search_query, when, max_articles).await {
            Ok(articles) => articles,
            Err(e) => {
                warn!(query = %search_query, error = %e, "feed unavailable, returning no articles");
                Vec::new()
            }
        }
    }

    pub async fn try_search(
        &self,
        search_query: &str,
        when: Option<&str>,
        max_articles: usize,
    ) -> Result<Vec<Article>, FetchError> {
        if max_articles == 0 {
            return Ok(Vec::new());
        }

        let url = self.feed_url(search_query, when)?;
        let feed = self.fetch_feed(&url).await?;
        let total = feed.entries.len();

        let articles: Vec<Article> = feed
            .entries
            .iter()
            .take(max_articles)
            .map(article_from_entry)
            .collect();

        info!(
            query = %search_query,
            entries = total,
            kept = articles.len(),
            "fetched news feed"
        );
        Ok(articles)
    }

    /// Fetch and parse the feed, retrying transient failures (5xx, 429,
    /// network) with exponential backoff. Other client errors are permanent.
    async fn fetch_feed(&self, url: &Url) -> Result<Feed, FetchError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let backoff = retry_backoff(self.config.retry_backoff_ms, attempt);
                info!(
                    "Retrying feed fetch for {} (attempt {}/{}) after {:?}...",
                    url, attempt, max_attempts, backoff
                );
                tokio::time::sleep(backoff).await;
            }

            match self.client.get(url.as_str()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let bytes = response.bytes().await.map_err(|e| {
                            FetchError::FeedUnavailable(format!("failed to read feed body: {}", e))
                        })?;
                        return parser::parse(bytes.as_ref()).map_err(|e| {
                            FetchError::FeedUnavailable(format!("failed to parse feed: {}", e))
                        });
                    } else if status.is_server_error()
                        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    {
                        last_error = Some(format!("feed server returned {}", status));
                    } else {
                        return Err(FetchError::FeedUnavailable(format!(
                            "feed fetch failed with status: {}",
                            status
                        )));
                    }
                }
                Err(e) => {
                    last_error = Some(format!("network error during fetch: {}", e));
                }
            }
        }

        Err(FetchError::FeedUnavailable(
            last_error.unwrap_or_else(|| "unknown error after retries".to_string()),
        ))
    }
}

/// Delay before `attempt` (2 or later): the base doubled per earlier retry,
/// saturating instead of overflowing on long retry chains.
fn retry_backoff(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(2));
    Duration::from_millis(base_ms.saturating_mul(factor))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>"Bihar gaya" - Google News</title>
    <link>https://news.google.com</link>
    <description>Google News</description>
    <item>
      <title>Gaya airport &lt;b&gt;expansion&lt;/b&gt; approved - Times of India</title>
      <link>https://example.com/a1</link>
      <pubDate>Mon, 19 Oct 2026 08:00:00 GMT</pubDate>
      <description>&lt;a href="https://example.com/a1"&gt;Gaya airport expansion approved&lt;/a&gt;&amp;nbsp;&amp;nbsp;&lt;font color="#6f6f6f"&gt;Times of India&lt;/font&gt;</description>
    </item>
    <item>
      <title>Second story</title>
      <link>https://example.com/a2</link>
      <description>Plain excerpt</description>
    </item>
  </channel>
</rss>"##;

    fn fetcher(search_url: &str) -> NewsFetcher {
        let config = FeedConfig {
            search_url: search_url.to_string(),
            ..FeedConfig::default()
        };
        NewsFetcher::new(config).expect("fetcher")
    }

    #[test]
    fn search_query_puts_location_first() {
        assert_eq!(search_query("gaya", "Bihar"), "Bihar gaya");
        assert_eq!(search_query(" elections ", "  "), "elections");
        assert_eq!(search_query("", "Patna"), "Patna");
    }

    #[test]
    fn feed_url_encodes_query_and_locale() {
        let f = fetcher("https://news.google.com/rss/search");
        let url = f.feed_url("Bihar gaya & more", None).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs[0], ("q".to_string(), "Bihar gaya & more".to_string()));
        assert_eq!(pairs[1], ("hl".to_string(), "en-IN".to_string()));
        assert_eq!(pairs[3], ("ceid".to_string(), "IN:en".to_string()));
        assert!(url.as_str().contains("q=Bihar+gaya+%26+more"));
    }

    #[test]
    fn feed_url_appends_recency_window() {
        let f = fetcher("https://news.google.com/rss/search");
        let url = f.feed_url("Bihar gaya", Some("7d")).unwrap();
        let q = url.query_pairs().find(|(k, _)| k == "q").map(|(_, v)| v.into_owned());
        assert_eq!(q.as_deref(), Some("Bihar gaya when:7d"));

        let all = f.feed_url("Bihar gaya", Some("all")).unwrap();
        let q = all.query_pairs().find(|(k, _)| k == "q").map(|(_, v)| v.into_owned());
        assert_eq!(q.as_deref(), Some("Bihar gaya"));
    }

    #[test]
    fn invalid_search_url_is_feed_unavailable() {
        let f = fetcher("not a url");
        assert!(matches!(f.feed_url("x", None), Err(FetchError::FeedUnavailable(_))));
    }

    #[test]
    fn entries_are_normalized_in_order() {
        let feed = parser::parse(RSS.as_bytes()).expect("parse rss");
        let articles: Vec<Article> = feed.entries.iter().map(article_from_entry).collect();

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "Gaya airport expansion approved - Times of India");
        assert_eq!(articles[0].link, "https://example.com/a1");
        assert!(articles[0].summary.contains("Gaya airport expansion approved"));
        assert!(articles[0].summary.contains("Times of India"));
        assert!(!articles[0].summary.contains('<'));
        assert!(articles[0].published.is_some());
        assert!(articles[0].full_content.is_none());

        assert_eq!(articles[1].title, "Second story");
        assert_eq!(articles[1].summary, "Plain excerpt");
    }

    #[test]
    fn backoff_doubles_then_saturates() {
        assert_eq!(retry_backoff(1000, 2), Duration::from_millis(1000));
        assert_eq!(retry_backoff(1000, 4), Duration::from_millis(4000));
        assert_eq!(retry_backoff(0, 70), Duration::ZERO);
        assert_eq!(retry_backoff(1000, 70), Duration::from_millis(u64::MAX));
    }

    #[tokio::test]
    async fn long_retry_chain_gives_up_without_overflow() {
        let f = NewsFetcher::new(FeedConfig {
            search_url: "http://127.0.0.1:1/rss/search".to_string(),
            timeout_seconds: 1,
            max_attempts: 70,
            retry_backoff_ms: 0,
            ..FeedConfig::default()
        })
        .expect("fetcher");

        let result = f.try_search("gaya", None, 5).await;
        assert!(matches!(result, Err(FetchError::FeedUnavailable(_))));
    }
}
