// Test doubles for the cache store and crawl executor.
//
// Injected in place of redis and the browser engine so the orchestrator and
// router can be exercised without external services.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;

use crate::cache::{CacheError, CacheStore};
use crate::error::{AppError, Result};
use crate::executor::{CrawlExecutor, RawCrawlOutput, RunConfig};

// =============================================================================
// Cache stores
// =============================================================================

/// In-process store. Records TTLs but never expires anything.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Duration)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Duration::ZERO));
    }

    pub fn value_of(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).map(|(v, _)| v.clone())
    }

    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.entries.lock().unwrap().get(key).map(|(_, ttl)| *ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError> {
        Ok(self.value_of(key))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> std::result::Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> std::result::Result<bool, CacheError> {
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }

    async fn ping(&self) -> std::result::Result<(), CacheError> {
        Ok(())
    }
}

/// A store whose every call fails as if the server were down.
pub struct UnreachableStore;

fn unreachable() -> CacheError {
    CacheError::Unreachable("connection refused".to_string())
}

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _key: &str) -> std::result::Result<Option<String>, CacheError> {
        Err(unreachable())
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> std::result::Result<(), CacheError> {
        Err(unreachable())
    }

    async fn delete(&self, _key: &str) -> std::result::Result<bool, CacheError> {
        Err(unreachable())
    }

    async fn ping(&self) -> std::result::Result<(), CacheError> {
        Err(unreachable())
    }
}

// =============================================================================
// Crawl executor
// =============================================================================

/// Arguments captured from a run call
#[derive(Debug, Clone)]
pub struct RunCall {
    pub url: String,
    pub config: RunConfig,
}

/// Replays queued outcomes in order, then answers with [`sample_output`].
#[derive(Default)]
pub struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<Result<RawCrawlOutput>>>,
    calls: Mutex<Vec<RunCall>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(self, output: RawCrawlOutput) -> Self {
        self.outcomes.lock().unwrap().push_back(Ok(output));
        self
    }

    /// Queue a run that completes but reports failure
    pub fn with_failure(self, message: &str) -> Self {
        let output = RawCrawlOutput {
            success: false,
            error_message: Some(message.to_string()),
            ..Default::default()
        };
        self.with_output(output)
    }

    /// Queue a transport-level fault
    pub fn with_fault(self, message: &str) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(AppError::Upstream(message.to_string())));
        self
    }

    pub fn calls(&self) -> Vec<RunCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CrawlExecutor for ScriptedExecutor {
    async fn run(&self, url: &str, config: &RunConfig) -> Result<RawCrawlOutput> {
        self.calls.lock().unwrap().push(RunCall {
            url: url.to_string(),
            config: config.clone(),
        });

        let next = self.outcomes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(sample_output()))
    }
}

/// A successful run in the executor's current output shape.
pub fn sample_output() -> RawCrawlOutput {
    serde_json::from_value(json!({
        "success": true,
        "markdown": {"raw_markdown": "# Example Domain\n\nThis domain is for use in examples.", "fit_markdown": ""},
        "cleaned_html": "<div><h1>Example Domain</h1></div>",
        "html": "<html><body><div><h1>Example Domain</h1></div></body></html>",
        "links": {
            "internal": [{"href": "https://example.com/about", "text": "About"}],
            "external": [{"href": "https://www.iana.org/domains/example", "text": "More information"}]
        },
        "media": {
            "images": [{"src": "https://example.com/logo.png", "alt": "logo"}],
            "videos": []
        },
        "metadata": {"title": "Example Domain", "description": "", "keywords": [], "language": "en"},
        "screenshot": "iVBORw0KGgoAAAANSUhEUg=="
    }))
    .unwrap_or_default()
}

// =============================================================================
// HTTP stubs
// =============================================================================

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve_stub(router: Router) -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(format!("http://{}", addr))
}
