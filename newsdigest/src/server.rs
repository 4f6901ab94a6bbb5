use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::http::{Cookie, CookieJar, Status};
use rocket::serde::json::Json;
use rocket::{get, post, routes, Build, Rocket, State};
use serde::{Deserialize, Serialize};

use common::{Config, ServerConfig};

use crate::error::SummariseError;
use crate::models::{Article, SummaryRequest, SummaryResponse};
use crate::sessions::SessionStore;
use crate::summarizer::NewsSummariser;

/// Cookie carrying the session id that scopes translation caching.
pub const SESSION_COOKIE: &str = "newsdigest_session";

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub summariser: Arc<NewsSummariser>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(summariser: Arc<NewsSummariser>, sessions: Arc<SessionStore>) -> Self {
        Self {
            started_at: Utc::now(),
            summariser,
            sessions,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (Status, Json<ErrorBody>);

fn api_error(e: &SummariseError) -> ApiError {
    let status = if e.is_caller_error() {
        Status::BadRequest
    } else {
        Status::BadGateway
    };
    (status, Json(ErrorBody { error: e.to_string() }))
}

#[derive(Serialize)]
struct ServiceInfo {
    service: &'static str,
    version: &'static str,
    endpoints: Vec<&'static str>,
}

#[get("/")]
async fn index() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "newsdigest",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec!["GET /health", "POST /summarize", "GET /articles", "POST /translate"],
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: i64,
    /// Providers in fallback order
    pub providers: Vec<String>,
    pub sessions: usize,
}

#[get("/health")]
async fn health(state: &State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        providers: state.summariser.router().provider_names(),
        sessions: state.sessions.len(),
    })
}

#[post("/summarize", data = "<body>")]
async fn summarize(
    state: &State<AppState>,
    body: Json<SummaryRequest>,
) -> Result<Json<SummaryResponse>, ApiError> {
    state
        .summariser
        .summarize(&body)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::warn!(error = %e, "summarize request rejected");
            api_error(&e)
        })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArticlesResponse {
    pub articles: Vec<Article>,
    pub count: usize,
    pub query_used: String,
}

#[get("/articles?<query>&<location>&<max_articles>")]
async fn articles(
    state: &State<AppState>,
    query: Option<String>,
    location: Option<String>,
    max_articles: Option<usize>,
) -> Result<Json<ArticlesResponse>, ApiError> {
    let request = SummaryRequest::new(
        query.unwrap_or_default(),
        location.unwrap_or_default(),
        max_articles.unwrap_or(10),
        "English",
    );
    request.validate().map_err(|e| api_error(&e))?;

    let articles = state
        .summariser
        .fetch_articles(&request.query, &request.location, request.max_articles)
        .await;
    Ok(Json(ArticlesResponse {
        count: articles.len(),
        articles,
        query_used: crate::ingestion::search_query(&request.query, &request.location),
    }))
}

fn default_translate_language() -> String {
    "Hindi".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranslateRequest {
    pub article: Article,
    #[serde(default = "default_translate_language")]
    pub language: String,
    /// Translate the scraped page instead of the title and excerpt
    #[serde(default)]
    pub full: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranslateResponse {
    pub translation: String,
    pub language: String,
    pub full: bool,
}

#[post("/translate", data = "<body>")]
async fn translate(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
    body: Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let known = cookies.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let session = state.sessions.get_or_create(known.as_deref());
    if known.as_deref() != Some(session.id.as_str()) {
        cookies.add(Cookie::new(SESSION_COOKIE, session.id.clone()));
    }

    let request = body.into_inner();
    let result = if request.full {
        state
            .summariser
            .translate_full(&request.article, &request.language, &session)
            .await
    } else {
        state
            .summariser
            .translate(&request.article, &request.language, &session.translations)
            .await
    };

    match result {
        Ok(translation) => Ok(Json(TranslateResponse {
            translation,
            language: request.language,
            full: request.full,
        })),
        Err(e) => {
            tracing::warn!(session_id = %session.id, error = %e, "translation failed");
            Err(api_error(&e))
        }
    }
}

/// Assemble the Rocket instance with managed state, applying `[server]`
/// bind address and port.
pub fn build_rocket(state: AppState, server: &ServerConfig) -> Rocket<Build> {
    let fig = rocket::Config::figment()
        .merge(("address", server.bind.clone()))
        .merge(("port", server.port));

    rocket::custom(fig)
        .manage(state)
        .mount("/", routes![index, health, summarize, articles, translate])
}

pub async fn launch_rocket(config: &Config) -> Result<()> {
    let summariser = Arc::new(NewsSummariser::from_config(config)?);
    let sessions = Arc::new(SessionStore::from_config(&config.translation));
    let state = AppState::new(summariser, sessions);

    tracing::info!(
        bind = %config.server.bind,
        port = config.server.port,
        "Starting Rocket HTTP server"
    );
    build_rocket(state, &config.server)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Rocket HTTP server has shut down");
    Ok(())
}
