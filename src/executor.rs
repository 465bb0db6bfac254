use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::{ChunkingStrategy, CrawlRequest, ExtractionStrategy};

/// What the browser engine hands back. Content fields stay untyped; their shape
/// is only trusted after going through the normalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCrawlOutput {
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub markdown: Value,
    #[serde(default)]
    pub html: Value,
    #[serde(default)]
    pub cleaned_html: Value,
    #[serde(default)]
    pub links: Value,
    #[serde(default)]
    pub media: Value,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub screenshot: Value,
}

/// Per-run settings derived from a [`CrawlRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub extraction: ExtractionStrategy,
    pub chunking: ChunkingStrategy,
    pub page_timeout_ms: u64,
    pub screenshot: bool,
    pub wait_for: Option<String>,
    pub js_code: Option<String>,
    pub css_selector: Option<String>,
    pub word_count_threshold: u64,
    pub remove_overlay_elements: bool,
}

impl RunConfig {
    pub fn from_request(request: &CrawlRequest) -> Self {
        let options = request.options();
        Self {
            extraction: options.extraction_strategy,
            chunking: options.chunking_strategy,
            page_timeout_ms: options.timeout_secs * 1000,
            screenshot: options.screenshot,
            wait_for: options.wait_for.clone(),
            js_code: options.js_code.clone(),
            css_selector: options.css_selector.clone(),
            word_count_threshold: options.word_count_threshold,
            remove_overlay_elements: true,
        }
    }

    /// `auto` and `llm` leave extraction to the engine's defaults.
    fn extraction_payload(&self) -> Value {
        match self.extraction {
            ExtractionStrategy::Cosine => json!({
                "type": "CosineStrategy",
                "params": {
                    "semantic_filter": "",
                    "word_count_threshold": 10,
                    "max_dist": 0.2,
                    "linkage_method": "ward",
                    "top_k": 3
                }
            }),
            ExtractionStrategy::Auto | ExtractionStrategy::Llm => Value::Null,
        }
    }

    /// The engine has no dedicated markdown chunker; markdown uses regex chunking.
    fn chunking_payload(&self) -> Value {
        let kind = match self.chunking {
            ChunkingStrategy::Regex | ChunkingStrategy::Markdown => "RegexChunking",
            ChunkingStrategy::Sliding => "SlidingWindowChunking",
        };
        json!({ "type": kind, "params": {} })
    }

    /// Serialized in the engine's typed-config format. Its own cache is bypassed,
    /// results are cached by this service.
    pub fn to_payload(&self) -> Value {
        json!({
            "type": "CrawlerRunConfig",
            "params": {
                "word_count_threshold": self.word_count_threshold,
                "cache_mode": "bypass",
                "chunking_strategy": self.chunking_payload(),
                "extraction_strategy": self.extraction_payload(),
                "screenshot": self.screenshot,
                "wait_for": self.wait_for,
                "js_code": self.js_code,
                "css_selector": self.css_selector,
                "page_timeout": self.page_timeout_ms,
                "remove_overlay_elements": self.remove_overlay_elements,
            }
        })
    }
}

/// The external browser-automation engine.
///
/// `Err` means the engine could not be reached or answered garbage. A crawl that
/// ran but failed comes back as `Ok` with `success == false`.
#[async_trait]
pub trait CrawlExecutor: Send + Sync {
    async fn run(&self, url: &str, config: &RunConfig) -> Result<RawCrawlOutput>;
}

#[derive(Deserialize)]
struct CrawlResponse {
    #[serde(default)]
    results: Vec<RawCrawlOutput>,
}

/// Talks to a Crawl4AI-compatible server over its REST API.
#[derive(Clone)]
pub struct HttpCrawlExecutor {
    client: Client,
    base_url: String,
}

impl HttpCrawlExecutor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request_body(url: &str, config: &RunConfig) -> Value {
        json!({
            "urls": [url],
            "browser_config": {
                "type": "BrowserConfig",
                "params": { "headless": true }
            },
            "crawler_config": config.to_payload(),
        })
    }
}

#[async_trait]
impl CrawlExecutor for HttpCrawlExecutor {
    async fn run(&self, url: &str, config: &RunConfig) -> Result<RawCrawlOutput> {
        debug!(url, page_timeout_ms = config.page_timeout_ms, "dispatching crawl to executor");

        let res = self
            .client
            .post(format!("{}/crawl", self.base_url))
            .json(&Self::request_body(url, config))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Crawl executor returned {}: {}",
                status, body
            )));
        }

        let response: CrawlResponse = res.json().await?;
        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Upstream("Crawl executor returned no results".to_string()))
    }
}
