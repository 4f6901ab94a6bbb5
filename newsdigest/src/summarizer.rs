use anyhow::Context;
use common::Config;
use tracing::{info, warn};

use crate::error::SummariseError;
use crate::ingestion::{search_query, NewsFetcher};
use crate::llm::router::ProviderRouter;
use crate::llm::LlmRequest;
use crate::models::{Article, Language, SummaryRequest, SummaryResponse, SummaryStatus};
use crate::prompts;
use crate::scraping::ArticleScraper;
use crate::sessions::Session;
use crate::translation::TranslationCache;

/// Fetch → compose → route pipeline plus the on-demand translation paths.
///
/// Holds no per-request state; derived content is cached in the caller's
/// [`Session`] or [`TranslationCache`].
pub struct NewsSummariser {
    fetcher: NewsFetcher,
    scraper: ArticleScraper,
    router: ProviderRouter,
    summary_chars: usize,
    brief_max_tokens: Option<usize>,
}

impl NewsSummariser {
    pub fn new(
        fetcher: NewsFetcher,
        scraper: ArticleScraper,
        router: ProviderRouter,
        summary_chars: usize,
    ) -> Self {
        Self {
            fetcher,
            scraper,
            router,
            summary_chars,
            brief_max_tokens: None,
        }
    }

    /// Cap the completion length of brief translations.
    pub fn with_brief_max_tokens(mut self, max_tokens: usize) -> Self {
        self.brief_max_tokens = Some(max_tokens);
        self
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let fetcher =
            NewsFetcher::new(config.feed.clone()).context("failed to create news fetcher")?;
        let scraper = ArticleScraper::new(config.scraping.clone())
            .context("failed to create article scraper")?;
        let router = ProviderRouter::from_config(&config.llm)
            .context("failed to configure LLM providers")?;
        Ok(
            Self::new(fetcher, scraper, router, config.translation.summary_chars)
                .with_brief_max_tokens(config.translation.brief_max_tokens),
        )
    }

    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }

    /// Summarise the news for a request.
    ///
    /// Request errors are returned before any network call. An empty feed and
    /// an exhausted provider chain both produce a well-formed response; in the
    /// latter case the fetched articles are still included.
    pub async fn summarize(
        &self,
        request: &SummaryRequest,
    ) -> Result<SummaryResponse, SummariseError> {
        let language = request.validate()?;
        let query_used = search_query(&request.query, &request.location);

        info!(
            query = %query_used,
            max_articles = request.max_articles,
            language = %language,
            "fetching articles"
        );
        let articles = self
            .fetcher
            .search(&query_used, request.when.as_deref(), request.max_articles)
            .await;

        if articles.is_empty() {
            info!(query = %query_used, "no articles found");
            return Ok(SummaryResponse {
                summary: prompts::no_articles_message(language)?.to_string(),
                status: SummaryStatus::NoArticles,
                articles,
                articles_found: 0,
                query_used,
                language,
                provider: None,
                error: None,
            });
        }

        let prompt = prompts::compose_summary(&articles, language)?;
        info!(
            articles = articles.len(),
            prompt_chars = prompt.user.chars().count(),
            "composed summary prompt"
        );

        match self.router.route(prompt.into()).await {
            Ok(routed) => {
                info!(
                    provider = %routed.provider,
                    role = %routed.role,
                    attempts = routed.attempts.len(),
                    "summary generated"
                );
                Ok(SummaryResponse {
                    summary: routed.response.content,
                    status: SummaryStatus::Summarized,
                    articles_found: articles.len(),
                    articles,
                    query_used,
                    language,
                    provider: Some(routed.provider),
                    error: None,
                })
            }
            Err(e @ SummariseError::AllProvidersFailed { .. }) => {
                warn!(error = %e, "summarization failed, returning articles without a summary");
                Ok(SummaryResponse {
                    summary: prompts::summary_failed_message(language)?.to_string(),
                    status: SummaryStatus::Failed,
                    articles_found: articles.len(),
                    articles,
                    query_used,
                    language,
                    provider: None,
                    error: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Articles without summarisation; an unavailable feed yields an empty list.
    pub async fn fetch_articles(
        &self,
        query: &str,
        location: &str,
        max_articles: usize,
    ) -> Vec<Article> {
        self.fetcher.fetch_articles(query, location, max_articles).await
    }

    /// Translate an article's title and excerpt, served from `cache` when
    /// the same article was already translated into `language`.
    pub async fn translate(
        &self,
        article: &Article,
        language: &str,
        cache: &TranslationCache,
    ) -> Result<String, SummariseError> {
        let language = prompts::resolve_language(language)?;
        cache
            .get_or_translate(article, language, || self.translate_brief(article, language))
            .await
    }

    async fn translate_brief(
        &self,
        article: &Article,
        language: Language,
    ) -> Result<String, SummariseError> {
        let prompt = prompts::compose_brief_translation(article, language, self.summary_chars)?;
        let mut request = LlmRequest::from(prompt);
        if let Some(max_tokens) = self.brief_max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        let routed = self.router.route(request).await?;
        info!(
            link = %article.link,
            language = %language,
            provider = %routed.provider,
            "article translated"
        );
        Ok(routed.response.content)
    }

    /// Scraped page text for `article`, memoised in the session. Falls back to
    /// the feed summary when the page cannot be read; failures are not cached.
    pub async fn full_content(&self, article: &Article, session: &Session) -> String {
        if article.link.trim().is_empty() {
            return article.summary.clone();
        }

        let result = session
            .contents
            .get_or_try_insert(article.link.clone(), || {
                self.scraper.try_fetch_full_content(&article.link)
            })
            .await;

        match result {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "using feed summary instead of full content");
                article.summary.clone()
            }
        }
    }

    /// Translate and condense the full article page. Cached per session
    /// separately from the brief translation.
    pub async fn translate_full(
        &self,
        article: &Article,
        language: &str,
        session: &Session,
    ) -> Result<String, SummariseError> {
        let language = prompts::resolve_language(language)?;
        session
            .translations
            .get_or_translate_full(article, language, || async {
                let content = self.full_content(article, session).await;
                let prompt = prompts::compose_full_translation(article, &content, language)?;
                let routed = self.router.route(prompt.into()).await?;
                info!(
                    link = %article.link,
                    language = %language,
                    provider = %routed.provider,
                    "full article translated"
                );
                Ok(routed.response.content)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::router::tests::{chain, FakeProvider};
    use common::{FeedConfig, ScrapingConfig};

    fn summariser(providers: &[&std::sync::Arc<FakeProvider>]) -> NewsSummariser {
        // unreachable endpoints: these tests must never touch the network
        let feed = FeedConfig {
            search_url: "http://127.0.0.1:9/rss/search".to_string(),
            max_attempts: 1,
            timeout_seconds: 1,
            ..FeedConfig::default()
        };
        let scraping = ScrapingConfig {
            timeout_seconds: 1,
            ..ScrapingConfig::default()
        };
        NewsSummariser::new(
            NewsFetcher::new(feed).unwrap(),
            ArticleScraper::new(scraping).unwrap(),
            ProviderRouter::new(chain(providers)).unwrap(),
            500,
        )
    }

    #[tokio::test]
    async fn unsupported_language_fails_before_any_call() {
        let provider = FakeProvider::ok("fake", "summary");
        let s = summariser(&[&provider]);

        let err = s
            .summarize(&SummaryRequest::new("gaya", "Bihar", 5, "xx"))
            .await
            .unwrap_err();

        assert_eq!(err, SummariseError::UnsupportedLanguage("xx".to_string()));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn zero_max_articles_is_a_request_error() {
        let provider = FakeProvider::ok("fake", "summary");
        let s = summariser(&[&provider]);

        let err = s
            .summarize(&SummaryRequest::new("gaya", "Bihar", 0, "Hindi"))
            .await
            .unwrap_err();

        assert!(matches!(err, SummariseError::InvalidRequest(_)));
        assert!(err.is_caller_error());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn translate_calls_provider_once_per_key() {
        let provider = FakeProvider::ok("fake", "गया हवाई अड्डा");
        let s = summariser(&[&provider]);
        let cache = TranslationCache::new();
        let article =
            Article::new("Gaya airport", "https://example.com/gaya", "Expansion approved.");

        let first = s.translate(&article, "Hindi", &cache).await.unwrap();
        let second = s.translate(&article, "hi", &cache).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn translate_rejects_unknown_language() {
        let provider = FakeProvider::ok("fake", "text");
        let s = summariser(&[&provider]);
        let article = Article::new("t", "https://example.com/t", "s");

        let err = s
            .translate(&article, "klingon", &TranslationCache::new())
            .await
            .unwrap_err();

        assert_eq!(err, SummariseError::UnsupportedLanguage("klingon".to_string()));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn full_content_without_link_uses_summary() {
        let provider = FakeProvider::ok("fake", "text");
        let s = summariser(&[&provider]);
        let session = Session::new("test", None);
        let article = Article::new("t", "", "feed excerpt");

        assert_eq!(s.full_content(&article, &session).await, "feed excerpt");
        assert!(session.contents.is_empty());
    }

    #[tokio::test]
    async fn brief_translation_is_token_capped() {
        let provider = FakeProvider::ok("fake", "गया");
        let s = summariser(&[&provider]).with_brief_max_tokens(300);
        let article = Article::new("Gaya", "https://example.com/gaya", "Expansion approved.");

        s.translate(&article, "Hindi", &TranslationCache::new())
            .await
            .unwrap();
        assert_eq!(
            provider.last_max_tokens.load(std::sync::atomic::Ordering::SeqCst),
            300
        );

        // no cap configured: the provider default applies
        let uncapped = FakeProvider::ok("fake", "गया");
        let plain = summariser(&[&uncapped]);
        plain
            .translate(&article, "Hindi", &TranslationCache::new())
            .await
            .unwrap();
        assert_eq!(
            uncapped.last_max_tokens.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }
}
