use anyhow::Context;
use common::ScrapingConfig;
use reqwest::Client;
use scraper::{ElementRef, Html, Node};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::models::Article;

/// Elements whose text never belongs to the article body.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form",
];

/// Reduce an HTML fragment to plain text with collapsed whitespace.
/// Malformed markup degrades to whatever text the parser recovers.
pub fn strip_html(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return collapse_whitespace(html);
    }
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment.root_element().text().collect();
    collapse_whitespace(&text.join(" "))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> String {
    let text: Vec<&str> = element.text().collect();
    collapse_whitespace(&text.join(" "))
}

fn is_skipped_node(node: &Node) -> bool {
    node.as_element()
        .map(|e| SKIPPED_ELEMENTS.contains(&e.name()))
        .unwrap_or(false)
}

fn is_skipped(element: ElementRef<'_>) -> bool {
    SKIPPED_ELEMENTS.contains(&element.value().name())
        || element.ancestors().any(|a| is_skipped_node(a.value()))
}

/// Text of `element` minus anything inside scripts, navigation and similar chrome.
fn visible_text(element: ElementRef<'_>) -> String {
    let parts: Vec<&str> = element
        .descendants()
        .filter_map(|node| node.value().as_text().map(|text| (node, text)))
        .filter(|(node, _)| !node.ancestors().any(|a| is_skipped_node(a.value())))
        .map(|(_, text)| &**text)
        .collect();
    collapse_whitespace(&parts.join(" "))
}

/// Extract the primary readable text of a page: the largest run of
/// consecutive `<p>` siblings inside `<body>`. Pages without paragraphs fall
/// back to the text of the largest `article`/`main` element, then the whole
/// body. Returns `None` when nothing readable is found.
pub fn extract_main_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let body = root
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "body")
        .unwrap_or(root);

    let mut best = String::new();
    for parent in body.descendants().filter_map(ElementRef::wrap) {
        if is_skipped(parent) {
            continue;
        }
        let mut run: Vec<String> = Vec::new();
        for child in parent.children() {
            match ElementRef::wrap(child) {
                Some(el) if el.value().name() == "p" => {
                    let text = element_text(el);
                    if !text.is_empty() {
                        run.push(text);
                    }
                }
                Some(_) => {
                    consider_run(&mut run, &mut best);
                }
                // text and comment nodes between paragraphs keep the run going
                None => {}
            }
        }
        consider_run(&mut run, &mut best);
    }

    if best.is_empty() {
        best = body
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|e| matches!(e.value().name(), "article" | "main"))
            .map(visible_text)
            .max_by_key(|t| t.chars().count())
            .unwrap_or_default();
    }
    if best.is_empty() && !is_skipped(body) {
        best = visible_text(body);
    }

    if best.is_empty() {
        None
    } else {
        Some(best)
    }
}

fn consider_run(run: &mut Vec<String>, best: &mut String) {
    if run.is_empty() {
        return;
    }
    let joined = run.join("\n\n");
    if joined.chars().count() > best.chars().count() {
        *best = joined;
    }
    run.clear();
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Best-effort full-article retrieval.
pub struct ArticleScraper {
    client: Client,
    config: ScrapingConfig,
}

impl ArticleScraper {
    pub fn new(config: ScrapingConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self { client, config })
    }

    /// Fetch the page at `url` and extract its main text, capped at the
    /// configured character count.
    pub async fn try_fetch_full_content(&self, url: &str) -> Result<String, FetchError> {
        let failed = |reason: String| FetchError::ArticleScrapeFailed {
            url: url.to_string(),
            reason,
        };

        if url.trim().is_empty() {
            return Err(failed("article has no link".to_string()));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(format!("failed to fetch article page: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("article fetch failed with status: {}", status)));
        }

        let html = response
            .text()
            .await
            .map_err(|e| failed(format!("failed to read response body: {}", e)))?;

        let text = extract_main_text(&html)
            .ok_or_else(|| failed("no readable text found".to_string()))?;
        let text = truncate_chars(&text, self.config.max_content_chars);
        info!("scraping: extracted {} chars from {}", text.chars().count(), url);
        Ok(text)
    }

    /// Full text of `article`, or its feed summary when the page cannot be
    /// fetched or parsed.
    pub async fn fetch_full_content(&self, article: &Article) -> String {
        match self.try_fetch_full_content(&article.link).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "scraping: falling back to feed summary");
                article.summary.clone()
            }
        }
    }
}
