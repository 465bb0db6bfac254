use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};
use crate::fingerprint::{fingerprint, CacheFingerprint, FingerprintParams};
use crate::normalizer;

pub const MIN_TIMEOUT_SECS: u64 = 5;
pub const MAX_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WORD_COUNT_THRESHOLD: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    #[default]
    Auto,
    Llm,
    Cosine,
}

impl ExtractionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStrategy::Auto => "auto",
            ExtractionStrategy::Llm => "llm",
            ExtractionStrategy::Cosine => "cosine",
        }
    }
}

impl FromStr for ExtractionStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(ExtractionStrategy::Auto),
            "llm" => Ok(ExtractionStrategy::Llm),
            "cosine" => Ok(ExtractionStrategy::Cosine),
            other => Err(AppError::Validation(format!(
                "Unsupported extraction_strategy '{}': expected auto, llm or cosine",
                other
            ))),
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    Regex,
    #[default]
    Markdown,
    Sliding,
}

impl ChunkingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::Regex => "regex",
            ChunkingStrategy::Markdown => "markdown",
            ChunkingStrategy::Sliding => "sliding",
        }
    }
}

impl FromStr for ChunkingStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "regex" => Ok(ChunkingStrategy::Regex),
            "markdown" => Ok(ChunkingStrategy::Markdown),
            "sliding" => Ok(ChunkingStrategy::Sliding),
            other => Err(AppError::Validation(format!(
                "Unsupported chunking_strategy '{}': expected regex, markdown or sliding",
                other
            ))),
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for a single crawl. Validated when turned into a [`CrawlRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    pub extraction_strategy: ExtractionStrategy,
    pub chunking_strategy: ChunkingStrategy,
    pub screenshot: bool,
    pub wait_for: Option<String>,
    pub timeout_secs: u64,
    pub js_code: Option<String>,
    pub css_selector: Option<String>,
    pub word_count_threshold: u64,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            extraction_strategy: ExtractionStrategy::default(),
            chunking_strategy: ChunkingStrategy::default(),
            screenshot: false,
            wait_for: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            js_code: None,
            css_selector: None,
            word_count_threshold: DEFAULT_WORD_COUNT_THRESHOLD,
        }
    }
}

/// A validated crawl request. Only constructed through [`CrawlRequest::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    url: Url,
    options: CrawlOptions,
}

impl CrawlRequest {
    pub fn new(url: &str, options: CrawlOptions) -> Result<Self> {
        let url = parse_target_url(url)?;

        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&options.timeout_secs) {
            return Err(AppError::Validation(format!(
                "timeout must be between {} and {} seconds, got {}",
                MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS, options.timeout_secs
            )));
        }
        if options.word_count_threshold < 1 {
            return Err(AppError::Validation(
                "word_count_threshold must be at least 1".to_string(),
            ));
        }

        Ok(Self { url, options })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn options(&self) -> &CrawlOptions {
        &self.options
    }

    pub fn extraction_strategy(&self) -> ExtractionStrategy {
        self.options.extraction_strategy
    }

    pub fn chunking_strategy(&self) -> ChunkingStrategy {
        self.options.chunking_strategy
    }

    pub fn screenshot(&self) -> bool {
        self.options.screenshot
    }

    pub fn timeout_secs(&self) -> u64 {
        self.options.timeout_secs
    }

    pub fn fingerprint_params(&self) -> FingerprintParams {
        FingerprintParams {
            extraction: self.options.extraction_strategy,
            chunking: self.options.chunking_strategy,
            screenshot: self.options.screenshot,
        }
    }

    pub fn fingerprint(&self) -> CacheFingerprint {
        fingerprint(self.url(), &self.fingerprint_params())
    }
}

/// Parses an absolute http(s) URL, normalised the same way for every caller.
pub fn parse_target_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| AppError::Validation(format!("Invalid URL '{}': {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(AppError::Validation(format!(
            "Invalid URL '{}': expected an absolute http or https URL",
            raw
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Media {
    pub images: Vec<String>,
    pub videos: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Metadata {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub language: String,
}

/// The stable response contract. Links and media URLs are always plain strings,
/// including when the value is decoded from an older cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    #[serde(default, deserialize_with = "normalizer::deserialize_markdown")]
    pub markdown: String,
    #[serde(default, deserialize_with = "normalizer::deserialize_text")]
    pub html: String,
    #[serde(default, deserialize_with = "normalizer::deserialize_links")]
    pub links: Vec<String>,
    #[serde(default, deserialize_with = "normalizer::deserialize_media")]
    pub media: Media,
    #[serde(default, deserialize_with = "normalizer::deserialize_metadata")]
    pub metadata: Metadata,
    #[serde(default)]
    pub screenshot: Option<String>,
    #[serde(deserialize_with = "normalizer::deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// A batch item: the URL and the fingerprint its result will be cached under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchJob {
    pub url: String,
    pub job_id: CacheFingerprint,
}
