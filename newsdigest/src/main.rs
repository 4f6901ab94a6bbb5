/*
newsdigest - single binary
Serves the HTTP API, or runs one pipeline operation from the command line.
*/

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::Config;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use newsdigest::models::{Article, SummaryRequest};
use newsdigest::server::launch_rocket;
use newsdigest::sessions::SessionStore;
use newsdigest::summarizer::NewsSummariser;

#[derive(Parser, Debug)]
#[command(
    name = "newsdigest",
    about = "News summaries and translations with LLM provider fallback"
)]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Fetch articles and print a summary as JSON
    Summarize {
        query: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value_t = 10)]
        max_articles: usize,
        #[arg(long, default_value = "Hindi")]
        language: String,
        /// Recency window such as 1d or 7d
        #[arg(long)]
        when: Option<String>,
    },

    /// Print fetched articles as JSON, without summarising
    Articles {
        query: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value_t = 10)]
        max_articles: usize,
    },

    /// Translate one article
    Translate {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        summary: String,
        #[arg(long, default_value = "")]
        link: String,
        #[arg(long, default_value = "Hindi")]
        language: String,
        /// Translate the full page instead of the title and excerpt
        #[arg(long)]
        full: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    if dotenv::dotenv().is_ok() {
        info!(".env file loaded");
    }

    let config = load_config(args.config).await?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => launch_rocket(&config).await,
        Command::Summarize {
            query,
            location,
            max_articles,
            language,
            when,
        } => {
            let summariser = NewsSummariser::from_config(&config)?;
            let mut request = SummaryRequest::new(query, location, max_articles, language);
            request.when = when;
            let response = summariser.summarize(&request).await?;
            print_json(&response)
        }
        Command::Articles {
            query,
            location,
            max_articles,
        } => {
            let summariser = NewsSummariser::from_config(&config)?;
            let articles = summariser.fetch_articles(&query, &location, max_articles).await;
            print_json(&articles)
        }
        Command::Translate {
            title,
            summary,
            link,
            language,
            full,
        } => {
            let summariser = NewsSummariser::from_config(&config)?;
            let sessions = SessionStore::from_config(&config.translation);
            let session = sessions.get_or_create(None);
            let article = Article::new(title, link, summary);
            let text = if full {
                summariser.translate_full(&article, &language, &session).await?
            } else {
                summariser.translate(&article, &language, &session.translations).await?
            };
            println!("{}", text);
            Ok(())
        }
    }
}

/// Merge `config.default.toml` with the override file, then apply the environment.
async fn load_config(explicit: Option<PathBuf>) -> Result<Arc<Config>> {
    let default_path = PathBuf::from("config.default.toml");

    let override_path = if let Some(p) = explicit {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let mut config = Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    .context("failed to load configuration")?;
    config.apply_env().context("invalid environment configuration")?;

    info!(
        default = ?default_path,
        override = ?override_path,
        adapter = %config.llm.adapter,
        fallback = config.llm.fallback,
        "configuration loaded"
    );
    Ok(Arc::new(config))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{}", text);
    Ok(())
}
