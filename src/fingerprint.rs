//! Cache keys for crawl requests.
//!
//! A fingerprint covers the URL plus the options that change the stored artifact
//! (extraction strategy, chunking strategy, screenshot). Timeout, wait-for, injected
//! script and CSS selector are deliberately left out of the key.

use std::fmt;

use serde::Serialize;

use crate::models::{ChunkingStrategy, ExtractionStrategy};

pub const NAMESPACE: &str = "crawl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FingerprintParams {
    pub extraction: ExtractionStrategy,
    pub chunking: ChunkingStrategy,
    pub screenshot: bool,
}

impl FingerprintParams {
    /// Keys in sorted order, formatted like `{"chunking": "markdown", ...}` so keys
    /// written by earlier deployments of the service stay addressable.
    fn canonical_json(&self) -> String {
        format!(
            r#"{{"chunking": "{}", "extraction": "{}", "screenshot": {}}}"#,
            self.chunking.as_str(),
            self.extraction.as_str(),
            self.screenshot
        )
    }
}

/// `crawl:<md5 hex>`. Doubles as the cache key and the batch job id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CacheFingerprint(String);

impl CacheFingerprint {
    /// Accepts a job id with or without the namespace prefix.
    pub fn from_job_id(job_id: &str) -> Self {
        let digest = job_id
            .strip_prefix(NAMESPACE)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(job_id);
        Self(format!("{}:{}", NAMESPACE, digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex digest without the namespace.
    pub fn digest(&self) -> &str {
        &self.0[NAMESPACE.len() + 1..]
    }
}

impl fmt::Display for CacheFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn fingerprint(url: &str, params: &FingerprintParams) -> CacheFingerprint {
    let key_data = format!("{}:{}", url, params.canonical_json());
    let digest = md5::compute(key_data.as_bytes());
    CacheFingerprint(format!("{}:{:x}", NAMESPACE, digest))
}
