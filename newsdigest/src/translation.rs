use std::future::Future;

use tracing::debug;

use crate::cache::SingleFlight;
use crate::error::SummariseError;
use crate::models::{Article, Language};

/// Which derived text a cache entry holds for an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranslationKind {
    /// Translated title and excerpt
    Brief,
    /// Translated summary of the scraped page
    FullArticle,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranslationKey {
    pub article: String,
    pub language: Language,
    pub kind: TranslationKind,
}

impl TranslationKey {
    pub fn new(article: &Article, language: Language, kind: TranslationKind) -> Self {
        Self {
            article: article.identity(),
            language,
            kind,
        }
    }
}

/// Session-scoped store of translated text.
///
/// A hit never calls the provider. Concurrent misses on one key share a
/// single translation call, and a failed call is not stored.
pub struct TranslationCache {
    entries: SingleFlight<TranslationKey, String, SummariseError>,
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// `Some(n)` keeps at most `n` completed translations, least recently used dropped first.
    pub fn with_capacity(max_entries: Option<usize>) -> Self {
        Self {
            entries: SingleFlight::new(max_entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &TranslationKey) -> Option<String> {
        self.entries.get(key)
    }

    pub async fn get_or_translate<F, Fut>(
        &self,
        article: &Article,
        language: Language,
        translate: F,
    ) -> Result<String, SummariseError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, SummariseError>>,
    {
        self.lookup(TranslationKey::new(article, language, TranslationKind::Brief), translate)
            .await
    }

    pub async fn get_or_translate_full<F, Fut>(
        &self,
        article: &Article,
        language: Language,
        translate: F,
    ) -> Result<String, SummariseError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, SummariseError>>,
    {
        self.lookup(
            TranslationKey::new(article, language, TranslationKind::FullArticle),
            translate,
        )
        .await
    }

    async fn lookup<F, Fut>(
        &self,
        key: TranslationKey,
        translate: F,
    ) -> Result<String, SummariseError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, SummariseError>>,
    {
        if let Some(text) = self.entries.get(&key) {
            debug!(
                article = %key.article,
                language = %key.language,
                kind = ?key.kind,
                "translation cache hit"
            );
            return Ok(text);
        }
        self.entries.get_or_try_insert(key, translate).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn article() -> Article {
        Article::new("Gaya airport expansion", "https://example.com/gaya", "New terminal approved.")
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let cache = TranslationCache::new();
        let calls = AtomicUsize::new(0);
        let translate = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("गया हवाई अड्डा".to_string())
        };

        let first = cache.get_or_translate(&article(), Language::Hindi, translate).await.unwrap();
        let second = cache.get_or_translate(&article(), Language::Hindi, translate).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn language_and_kind_are_part_of_the_key() {
        let cache = TranslationCache::new();
        let a = article();

        cache
            .get_or_translate(&a, Language::Hindi, || async { Ok("hi brief".to_string()) })
            .await
            .unwrap();
        cache
            .get_or_translate(&a, Language::English, || async { Ok("en brief".to_string()) })
            .await
            .unwrap();
        let full = cache
            .get_or_translate_full(&a, Language::Hindi, || async { Ok("hi full".to_string()) })
            .await
            .unwrap();

        assert_eq!(full, "hi full");
        assert_eq!(cache.len(), 3);
        let key = TranslationKey::new(&a, Language::Hindi, TranslationKind::Brief);
        assert_eq!(cache.get(&key).as_deref(), Some("hi brief"));
    }

    #[tokio::test]
    async fn concurrent_misses_issue_one_call() {
        let cache = TranslationCache::new();
        let calls = AtomicUsize::new(0);
        let a = article();
        let translate = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok("shared".to_string())
        };

        let (x, y) = tokio::join!(
            cache.get_or_translate(&a, Language::Hindi, translate),
            cache.get_or_translate(&a, Language::Hindi, translate),
        );

        assert_eq!(x.unwrap(), "shared");
        assert_eq!(y.unwrap(), "shared");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = TranslationCache::new();
        let err = SummariseError::AllProvidersFailed {
            attempts: 1,
            last: ProviderError::Transport {
                provider: "fake".to_string(),
                message: "down".to_string(),
            },
        };

        let failed = cache
            .get_or_translate(&article(), Language::Hindi, || async { Err(err.clone()) })
            .await;
        assert_eq!(failed, Err(err.clone()));
        assert!(cache.is_empty());

        let ok = cache
            .get_or_translate(&article(), Language::Hindi, || async { Ok("later".to_string()) })
            .await;
        assert_eq!(ok.as_deref(), Ok("later"));
    }

    #[tokio::test]
    async fn bounded_cache_drops_least_recently_used() {
        let cache = TranslationCache::with_capacity(Some(1));
        let first = Article::new("one", "https://example.com/1", "");
        let second = Article::new("two", "https://example.com/2", "");

        cache
            .get_or_translate(&first, Language::Hindi, || async { Ok("एक".to_string()) })
            .await
            .unwrap();
        cache
            .get_or_translate(&second, Language::Hindi, || async { Ok("दो".to_string()) })
            .await
            .unwrap();

        assert_eq!(cache.len(), 1);
        assert!(cache
            .get(&TranslationKey::new(&first, Language::Hindi, TranslationKind::Brief))
            .is_none());
    }

    #[tokio::test]
    async fn recently_read_translation_survives_eviction() {
        let cache = TranslationCache::with_capacity(Some(2));
        let first = Article::new("one", "https://example.com/1", "");
        let second = Article::new("two", "https://example.com/2", "");
        let third = Article::new("three", "https://example.com/3", "");

        for (article, text) in [(&first, "एक"), (&second, "दो")] {
            cache
                .get_or_translate(article, Language::Hindi, || async move {
                    Ok(text.to_string())
                })
                .await
                .unwrap();
        }
        let reread = cache
            .get_or_translate(&first, Language::Hindi, || async { Ok("फिर".to_string()) })
            .await
            .unwrap();
        assert_eq!(reread, "एक");

        cache
            .get_or_translate(&third, Language::Hindi, || async { Ok("तीन".to_string()) })
            .await
            .unwrap();

        let key = |article: &Article| {
            TranslationKey::new(article, Language::Hindi, TranslationKind::Brief)
        };
        assert_eq!(cache.get(&key(&first)).as_deref(), Some("एक"));
        assert!(cache.get(&key(&second)).is_none());
        assert!(cache.get(&key(&third)).is_some());
    }
}
