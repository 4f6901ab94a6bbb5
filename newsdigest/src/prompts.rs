use std::fmt::Write as _;

use crate::error::SummariseError;
use crate::models::{Article, Language};

/// System + user instruction pair sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Fixed per-language wording. `{n}` is replaced with the article count.
struct Template {
    language: Language,
    system: &'static str,
    summary_intro: &'static str,
    summary_outro: &'static str,
    translate_brief: &'static str,
    translate_full: &'static str,
    no_articles: &'static str,
    summary_failed: &'static str,
}

const TEMPLATES: &[Template] = &[
    Template {
        language: Language::English,
        system: "You are a news summarizer. You will be given news articles about a place or topic. \
Summarize them so they are easy to understand and concise. \
Always answer in English. Include all important information but keep it brief.",
        summary_intro: "Please read the following {n} news articles and provide a comprehensive summary in English. \
Make sure to cover information from ALL {n} articles:",
        summary_outro: "Please provide a brief and easy-to-understand summary in English that covers key points from all {n} articles. \
Use numbered points (1, 2, 3...) to organize the summary clearly.",
        translate_brief: "Translate the following news article title and summary to English. \
Keep the title on the first line. Only provide the translation, no explanation:",
        translate_full: "Please read the following complete news article and translate/summarize it in English. \
Provide a comprehensive summary that includes all important details:",
        no_articles: "Sorry, I couldn't find any news articles. Please try again later.",
        summary_failed: "Summary unavailable: the language model could not be reached. The articles below are shown without a summary.",
    },
    Template {
        language: Language::Hindi,
        system: "आप एक समाचार सारांशक हैं। आपको किसी स्थान या विषय से संबंधित समाचार लेख दिए जाएंगे। \
कृपया इन लेखों को ऐसे सारांशित करें जो समझने में आसान और संक्षिप्त हो। \
हमेशा हिंदी भाषा का उपयोग करें। सभी महत्वपूर्ण जानकारी शामिल करें लेकिन इसे संक्षिप्त रखें।",
        summary_intro: "निम्नलिखित {n} समाचार लेखों को पढ़ें और उनका व्यापक सारांश हिंदी में प्रदान करें। \
सुनिश्चित करें कि सभी {n} लेखों की जानकारी शामिल हो:",
        summary_outro: "कृपया सभी {n} लेखों के मुख्य बिंदुओं को कवर करते हुए हिंदी में एक संक्षिप्त और आसानी से समझने योग्य सारांश प्रदान करें। \
सारांश को स्पष्ट रूप से व्यवस्थित करने के लिए क्रमांकित बिंदुओं (1, 2, 3...) का उपयोग करें।",
        translate_brief: "निम्नलिखित समाचार लेख के शीर्षक और सारांश का हिंदी में अनुवाद करें। \
शीर्षक पहली पंक्ति में रखें। केवल अनुवाद दें, कोई स्पष्टीकरण नहीं:",
        translate_full: "निम्नलिखित पूर्ण समाचार लेख पढ़ें और इसे हिंदी में अनुवाद/सारांशित करें। \
सभी महत्वपूर्ण विवरणों को शामिल करते हुए एक व्यापक सारांश प्रदान करें:",
        no_articles: "क्षमा करें, मुझे कोई समाचार लेख नहीं मिला। कृपया बाद में पुनः प्रयास करें।",
        summary_failed: "सारांश उपलब्ध नहीं है: भाषा मॉडल से संपर्क नहीं हो सका। नीचे लेख बिना सारांश के दिखाए गए हैं।",
    },
];

fn template(language: Language) -> Result<&'static Template, SummariseError> {
    TEMPLATES
        .iter()
        .find(|t| t.language == language)
        .ok_or_else(|| SummariseError::UnsupportedLanguage(language.name().to_string()))
}

/// Resolve a language key (name or code) against the template table.
pub fn resolve_language(key: &str) -> Result<Language, SummariseError> {
    let language: Language = key.parse()?;
    template(language)?;
    Ok(language)
}

pub fn system_prompt(language: Language) -> Result<&'static str, SummariseError> {
    Ok(template(language)?.system)
}

pub fn no_articles_message(language: Language) -> Result<&'static str, SummariseError> {
    Ok(template(language)?.no_articles)
}

pub fn summary_failed_message(language: Language) -> Result<&'static str, SummariseError> {
    Ok(template(language)?.summary_failed)
}

/// Numbered article blocks, in input order.
pub fn format_articles(articles: &[Article]) -> String {
    let mut text = String::new();
    for (i, article) in articles.iter().enumerate() {
        let _ = writeln!(text, "\n--- Article {} ---", i + 1);
        let _ = writeln!(text, "Title: {}", article.title);
        let _ = writeln!(text, "Summary: {}", article.summary);
        if let Some(content) = article.full_content.as_deref().filter(|c| !c.is_empty()) {
            let _ = writeln!(text, "Content: {}", content);
        }
    }
    text
}

/// Prompt asking for a summary of all `articles` in `language`.
pub fn compose_summary(
    articles: &[Article],
    language: Language,
) -> Result<PromptPair, SummariseError> {
    let t = template(language)?;
    let n = articles.len().to_string();
    let user = format!(
        "{}\n{}\n{}",
        t.summary_intro.replace("{n}", &n),
        format_articles(articles),
        t.summary_outro.replace("{n}", &n)
    );
    Ok(PromptPair {
        system: t.system.to_string(),
        user,
    })
}

/// Prompt translating an article's title and (truncated) summary.
pub fn compose_brief_translation(
    article: &Article,
    language: Language,
    summary_chars: usize,
) -> Result<PromptPair, SummariseError> {
    let t = template(language)?;
    let summary: String = article.summary.chars().take(summary_chars).collect();
    Ok(PromptPair {
        system: t.system.to_string(),
        user: format!("{}\n\n{}\n\n{}", t.translate_brief, article.title, summary),
    })
}

/// Prompt translating and condensing a full article body.
pub fn compose_full_translation(
    article: &Article,
    content: &str,
    language: Language,
) -> Result<PromptPair, SummariseError> {
    let t = template(language)?;
    Ok(PromptPair {
        system: t.system.to_string(),
        user: format!("{}\n\nTitle: {}\n\n{}", t.translate_full, article.title, content),
    })
}
