pub mod api;
pub mod cache;
pub mod config;
pub mod crawler;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod llm;
pub mod models;
pub mod normalizer;
pub mod testing;

use std::sync::Arc;
use crawler::Crawler;
use llm::TextCompressor;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub crawler: Arc<Crawler>,
    pub compressor: Arc<TextCompressor>,
}
