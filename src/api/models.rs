use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::llm::DEFAULT_INSTRUCTION;
use crate::models::{
    BatchJob, CrawlOptions, CrawlRequest, DEFAULT_TIMEOUT_SECS, DEFAULT_WORD_COUNT_THRESHOLD,
};

fn default_extraction() -> String {
    "auto".to_string()
}

fn default_chunking() -> String {
    "markdown".to_string()
}

fn default_timeout() -> i64 {
    DEFAULT_TIMEOUT_SECS as i64
}

fn default_word_count_threshold() -> i64 {
    DEFAULT_WORD_COUNT_THRESHOLD as i64
}

fn default_instruction() -> String {
    DEFAULT_INSTRUCTION.to_string()
}

fn non_negative(field: &str, value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| AppError::Validation(format!("{} must not be negative, got {}", field, value)))
}

#[derive(Debug, Deserialize)]
pub struct CrawlRequestBody {
    pub url: String,
    #[serde(default = "default_extraction")]
    pub extraction_strategy: String,
    #[serde(default = "default_chunking")]
    pub chunking_strategy: String,
    #[serde(default)]
    pub screenshot: bool,
    pub wait_for: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: i64,
    pub js_code: Option<String>,
    pub css_selector: Option<String>,
    #[serde(default = "default_word_count_threshold")]
    pub word_count_threshold: i64,
}

impl CrawlRequestBody {
    pub fn into_request(self) -> Result<CrawlRequest> {
        let options = CrawlOptions {
            extraction_strategy: self.extraction_strategy.parse()?,
            chunking_strategy: self.chunking_strategy.parse()?,
            screenshot: self.screenshot,
            wait_for: self.wait_for,
            timeout_secs: non_negative("timeout", self.timeout)?,
            js_code: self.js_code,
            css_selector: self.css_selector,
            word_count_threshold: non_negative("word_count_threshold", self.word_count_threshold)?,
        };
        CrawlRequest::new(&self.url, options)
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchCrawlRequestBody {
    pub urls: Vec<String>,
    #[serde(default = "default_extraction")]
    pub extraction_strategy: String,
    #[serde(default = "default_chunking")]
    pub chunking_strategy: String,
    #[serde(default)]
    pub screenshot: bool,
    #[serde(default = "default_timeout")]
    pub timeout: i64,
}

impl BatchCrawlRequestBody {
    /// Options shared by every URL in the batch; the rest keep their defaults.
    pub fn shared_options(&self) -> Result<CrawlOptions> {
        Ok(CrawlOptions {
            extraction_strategy: self.extraction_strategy.parse()?,
            chunking_strategy: self.chunking_strategy.parse()?,
            screenshot: self.screenshot,
            timeout_secs: non_negative("timeout", self.timeout)?,
            ..Default::default()
        })
    }
}

#[derive(Serialize)]
pub struct BatchResponse {
    pub status: String,
    pub total_urls: usize,
    pub jobs: Vec<BatchJob>,
    pub message: String,
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub redis_connected: bool,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub status: String,
    pub job_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CompressRequest {
    pub content: String,
    #[serde(default = "default_instruction")]
    pub instruction: String,
}

#[derive(Serialize)]
pub struct CompressResponse {
    pub result: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkingStrategy, ExtractionStrategy};
    use serde_json::json;

    #[test]
    fn body_defaults_match_request_defaults() {
        let body: CrawlRequestBody = serde_json::from_value(json!({"url": "https://example.com"})).unwrap();
        let request = body.into_request().unwrap();

        assert_eq!(request.options(), &CrawlOptions::default());
    }

    #[test]
    fn unsupported_strategy_is_validation_error() {
        let body: CrawlRequestBody = serde_json::from_value(json!({
            "url": "https://example.com",
            "extraction_strategy": "semantic"
        }))
        .unwrap();

        assert!(matches!(body.into_request(), Err(AppError::Validation(_))));
    }

    #[test]
    fn negative_numbers_are_validation_errors() {
        let body: CrawlRequestBody = serde_json::from_value(json!({
            "url": "https://example.com",
            "word_count_threshold": -3
        }))
        .unwrap();

        assert!(matches!(body.into_request(), Err(AppError::Validation(_))));
    }

    #[test]
    fn batch_shared_options() {
        let body: BatchCrawlRequestBody = serde_json::from_value(json!({
            "urls": ["https://example.com"],
            "extraction_strategy": "llm",
            "chunking_strategy": "regex",
            "screenshot": true,
            "timeout": 60
        }))
        .unwrap();
        let options = body.shared_options().unwrap();

        assert_eq!(options.extraction_strategy, ExtractionStrategy::Llm);
        assert_eq!(options.chunking_strategy, ChunkingStrategy::Regex);
        assert!(options.screenshot);
        assert_eq!(options.timeout_secs, 60);
        assert_eq!(options.word_count_threshold, 10);
    }

    #[test]
    fn compress_instruction_defaults() {
        let body: CompressRequest = serde_json::from_value(json!({"content": "text"})).unwrap();
        assert_eq!(body.instruction, "summarize briefly");
    }
}
