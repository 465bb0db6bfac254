use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::config::DEFAULT_CACHE_TTL_SECS;
use crate::error::{AppError, Result};
use crate::executor::{CrawlExecutor, RunConfig};
use crate::models::{BatchJob, CrawlOptions, CrawlRequest, CrawlResult};
use crate::normalizer;

pub const MAX_BATCH_URLS: usize = 50;

/// Cache-first crawling on top of an executor.
///
/// Concurrent misses for the same fingerprint each run the executor; the last
/// write to the cache wins.
pub struct Crawler {
    cache: ResultCache,
    executor: Arc<dyn CrawlExecutor>,
    ttl: Duration,
}

impl Crawler {
    pub fn new(cache: ResultCache, executor: Arc<dyn CrawlExecutor>) -> Self {
        Self {
            cache,
            executor,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub async fn crawl(&self, request: &CrawlRequest) -> Result<CrawlResult> {
        let key = request.fingerprint();

        if let Some(cached) = self.cache.get_result(&key).await {
            info!("Cache hit for {}", request.url());
            return Ok(cached);
        }

        info!(key = %key, "Crawling {}", request.url());
        let config = RunConfig::from_request(request);
        let output = self.executor.run(request.url(), &config).await.map_err(|e| {
            warn!("Crawl error for {}: {}", request.url(), e);
            e
        })?;

        if !output.success {
            let message = output
                .error_message
                .unwrap_or_else(|| "unknown error".to_string());
            warn!("Crawl failed for {}: {}", request.url(), message);
            return Err(AppError::ExecutionFailure(message));
        }

        let result = normalizer::normalize(request.url(), &output, request.screenshot());
        self.cache.put_result(&key, &result, self.ttl).await;

        Ok(result)
    }

    /// Schedules one detached crawl per URL and returns their job ids right away.
    ///
    /// All URLs are validated before anything is scheduled. Outcomes are only
    /// observable through the cache; a failed job simply never shows up there.
    pub fn submit_batch(self: &Arc<Self>, urls: &[String], shared: &CrawlOptions) -> Result<Vec<BatchJob>> {
        if urls.len() > MAX_BATCH_URLS {
            return Err(AppError::Validation(format!(
                "Maximum {} URLs allowed per batch",
                MAX_BATCH_URLS
            )));
        }

        let requests = urls
            .iter()
            .map(|url| CrawlRequest::new(url, shared.clone()))
            .collect::<Result<Vec<_>>>()?;

        let jobs = requests
            .into_iter()
            .map(|request| {
                let job = BatchJob {
                    url: request.url().to_string(),
                    job_id: request.fingerprint(),
                };

                let crawler = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = crawler.crawl(&request).await {
                        warn!("Batch crawl for {} did not complete: {}", request.url(), e);
                    }
                });

                job
            })
            .collect();

        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, ScriptedExecutor, UnreachableStore};
    use chrono::{TimeZone, Utc};

    fn request(url: &str) -> CrawlRequest {
        CrawlRequest::new(url, CrawlOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn miss_runs_executor_and_populates_cache() {
        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::new());
        let crawler = Crawler::new(ResultCache::new(store.clone()), executor.clone());
        let req = request("https://example.com");

        let result = crawler.crawl(&req).await.unwrap();

        assert_eq!(executor.call_count(), 1);
        assert_eq!(result.links, vec!["https://example.com/about", "https://www.iana.org/domains/example"]);
        assert!(store.value_of(req.fingerprint().as_str()).is_some());
        assert_eq!(store.ttl_of(req.fingerprint().as_str()), Some(Duration::from_secs(86400)));
    }

    #[tokio::test]
    async fn hit_skips_executor_and_returns_stored_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::new());
        let crawler = Crawler::new(ResultCache::new(store.clone()), executor.clone());
        let req = request("https://example.com");

        let mut first = crawler.crawl(&req).await.unwrap();
        first.timestamp = Utc.with_ymd_and_hms(2023, 11, 5, 9, 0, 0).unwrap();
        store.insert(req.fingerprint().as_str(), &serde_json::to_string(&first).unwrap());

        let second = crawler.crawl(&req).await.unwrap();

        assert_eq!(executor.call_count(), 1);
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn run_config_reflects_request() {
        let executor = Arc::new(ScriptedExecutor::new());
        let crawler = Crawler::new(ResultCache::disconnected(), executor.clone());
        let req = CrawlRequest::new(
            "https://example.com/docs",
            CrawlOptions {
                timeout_secs: 60,
                css_selector: Some("article".into()),
                ..Default::default()
            },
        )
        .unwrap();

        crawler.crawl(&req).await.unwrap();

        let calls = executor.calls();
        assert_eq!(calls[0].url, "https://example.com/docs");
        assert_eq!(calls[0].config.page_timeout_ms, 60_000);
        assert_eq!(calls[0].config.css_selector.as_deref(), Some("article"));
    }

    #[tokio::test]
    async fn unsuccessful_run_is_execution_failure_and_not_cached() {
        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::new().with_failure("net::ERR_CONNECTION_REFUSED"));
        let crawler = Crawler::new(ResultCache::new(store.clone()), executor);

        let err = crawler.crawl(&request("https://example.com")).await.unwrap_err();

        match err {
            AppError::ExecutionFailure(message) => assert_eq!(message, "net::ERR_CONNECTION_REFUSED"),
            other => panic!("expected execution failure, got {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn executor_fault_is_upstream_error() {
        let executor = Arc::new(ScriptedExecutor::new().with_fault("connection reset"));
        let crawler = Crawler::new(ResultCache::disconnected(), executor);

        let err = crawler.crawl(&request("https://example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[tokio::test]
    async fn unreachable_cache_falls_through_to_executor() {
        let executor = Arc::new(ScriptedExecutor::new());
        let crawler = Crawler::new(ResultCache::new(Arc::new(UnreachableStore)), executor.clone());

        let result = crawler.crawl(&request("https://example.com")).await;

        assert!(result.is_ok());
        assert_eq!(executor.call_count(), 1);
    }

    #[tokio::test]
    async fn screenshot_only_kept_when_requested() {
        let crawler = Crawler::new(ResultCache::disconnected(), Arc::new(ScriptedExecutor::new()));

        let plain = crawler.crawl(&request("https://example.com")).await.unwrap();
        assert!(plain.screenshot.is_none());

        let with_shot = CrawlRequest::new(
            "https://example.com",
            CrawlOptions { screenshot: true, ..Default::default() },
        )
        .unwrap();
        let result = crawler.crawl(&with_shot).await.unwrap();
        assert!(result.screenshot.is_some());
    }

    #[tokio::test]
    async fn batch_job_ids_match_fingerprints() {
        let crawler = Arc::new(Crawler::new(ResultCache::disconnected(), Arc::new(ScriptedExecutor::new())));
        let urls = vec!["https://example.com/a".to_string(), "https://example.com/b".to_string()];

        let jobs = crawler.submit_batch(&urls, &CrawlOptions::default()).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].job_id, request("https://example.com/a").fingerprint());
        assert_eq!(jobs[1].url, "https://example.com/b");
    }

    #[tokio::test]
    async fn batch_of_fifty_is_accepted_and_fifty_one_rejected() {
        let executor = Arc::new(ScriptedExecutor::new());
        let crawler = Arc::new(Crawler::new(ResultCache::disconnected(), executor.clone()));
        let urls: Vec<String> = (0..51).map(|i| format!("https://example.com/page/{i}")).collect();

        let err = crawler.submit_batch(&urls, &CrawlOptions::default()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        tokio::task::yield_now().await;
        assert_eq!(executor.call_count(), 0);

        let jobs = crawler.submit_batch(&urls[..50], &CrawlOptions::default()).unwrap();
        assert_eq!(jobs.len(), 50);
    }

    #[tokio::test]
    async fn batch_with_invalid_url_schedules_nothing() {
        let executor = Arc::new(ScriptedExecutor::new());
        let crawler = Arc::new(Crawler::new(ResultCache::disconnected(), executor.clone()));
        let urls = vec!["https://example.com/".to_string(), "not a url".to_string()];

        assert!(crawler.submit_batch(&urls, &CrawlOptions::default()).is_err());
        tokio::task::yield_now().await;
        assert_eq!(executor.call_count(), 0);
    }

    #[tokio::test]
    async fn batch_results_land_in_cache() {
        let store = Arc::new(MemoryStore::new());
        let crawler = Arc::new(Crawler::new(ResultCache::new(store.clone()), Arc::new(ScriptedExecutor::new())));
        let urls = vec!["https://example.com/".to_string()];

        let jobs = crawler.submit_batch(&urls, &CrawlOptions::default()).unwrap();

        for _ in 0..100 {
            if store.value_of(jobs[0].job_id.as_str()).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(crawler.cache().get_result(&jobs[0].job_id).await.is_some());
    }
}
