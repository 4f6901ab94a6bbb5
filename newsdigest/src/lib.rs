// Library interface for newsdigest modules
// This allows tests and the binary to import modules

pub mod cache;
pub mod error;
pub mod ingestion;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod scraping;
pub mod server;
pub mod sessions;
pub mod summarizer;
pub mod translation;
