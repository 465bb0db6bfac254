//! Coerces crawl-executor output into [`CrawlResult`].
//!
//! The executor's payload changes shape between releases: links and media arrive as
//! plain strings, as objects keyed by `href`/`src`/..., or as something else entirely.
//! Every entry goes through the same short chain of shape matchers, and the same chain
//! runs again when a result is decoded from the cache, so entries written by an older
//! release come back with plain-string links too.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::executor::RawCrawlOutput;
use crate::models::{CrawlResult, Media, Metadata};

const LINK_KEYS: &[&str] = &["href", "url", "link", "src"];
const MEDIA_KEYS: &[&str] = &["src", "url"];

/// A shape matcher: returns the URL text if it recognises the entry.
type Matcher = fn(&Value, &UrlKeys) -> Option<String>;

struct UrlKeys {
    keys: &'static [&'static str],
    /// Links skip falsy values (`""`, `0`, `[]`...), media only skips `null`.
    skip_falsy: bool,
}

const LINKS: UrlKeys = UrlKeys { keys: LINK_KEYS, skip_falsy: true };
const MEDIA: UrlKeys = UrlKeys { keys: MEDIA_KEYS, skip_falsy: false };

const MATCHERS: &[Matcher] = &[plain_string, keyed_mapping];

fn plain_string(value: &Value, _: &UrlKeys) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn keyed_mapping(value: &Value, keys: &UrlKeys) -> Option<String> {
    let map = value.as_object()?;
    keys.keys
        .iter()
        .filter_map(|key| map.get(*key))
        .find(|found| if keys.skip_falsy { is_truthy(found) } else { !found.is_null() })
        .map(text_of)
}

/// Never drops an entry: anything unrecognised falls back to its textual form.
fn coerce_entry(value: &Value, keys: &UrlKeys) -> String {
    MATCHERS
        .iter()
        .find_map(|matcher| matcher(value, keys))
        .unwrap_or_else(|| repr(value))
}

pub fn coerce_link(value: &Value) -> String {
    coerce_entry(value, &LINKS)
}

pub fn coerce_media_url(value: &Value) -> String {
    coerce_entry(value, &MEDIA)
}

fn entries(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Plain text of a value: strings as-is, everything else via [`repr`].
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => repr(other),
    }
}

/// Renders a value the way the crawler's own runtime prints it, e.g.
/// `{'unexpected': 'x'}`, `[1, None, True]`.
pub fn repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(repr).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", quote(k), repr(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

fn quote(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

/// Raw variant first, then fit; plain strings are used directly.
pub fn markdown_from_value(value: &Value) -> String {
    match value {
        Value::Object(map) if map.contains_key("raw_markdown") || map.contains_key("fit_markdown") => {
            ["raw_markdown", "fit_markdown"]
                .iter()
                .filter_map(|key| map.get(*key))
                .find(|v| is_truthy(v))
                .map(text_of)
                .unwrap_or_default()
        }
        Value::String(s) => s.clone(),
        other if is_truthy(other) => repr(other),
        _ => String::new(),
    }
}

fn html_from(raw: &RawCrawlOutput) -> String {
    [&raw.cleaned_html, &raw.html]
        .into_iter()
        .find(|v| is_truthy(v))
        .map(text_of)
        .unwrap_or_default()
}

/// Internal links first, then external.
pub fn links_from_value(value: &Value) -> Vec<String> {
    let Some(partitions) = value.as_object() else {
        return Vec::new();
    };

    entries(partitions.get("internal"))
        .iter()
        .chain(entries(partitions.get("external")))
        .map(coerce_link)
        .collect()
}

pub fn media_from_value(value: &Value) -> Media {
    let kinds = value.as_object();
    let urls = |kind: &str| -> Vec<String> {
        entries(kinds.and_then(|m| m.get(kind)))
            .iter()
            .map(coerce_media_url)
            .collect()
    };

    Media {
        images: urls("images"),
        videos: urls("videos"),
    }
}

fn text_field(map: Option<&Map<String, Value>>, key: &str) -> String {
    match map.and_then(|m| m.get(key)) {
        None | Some(Value::Null) => String::new(),
        Some(value) => text_of(value),
    }
}

fn keywords_from_value(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().map(text_of).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

pub fn metadata_from_value(value: &Value) -> Metadata {
    let map = value.as_object();
    Metadata {
        title: text_field(map, "title"),
        description: text_field(map, "description"),
        keywords: keywords_from_value(map.and_then(|m| m.get("keywords"))),
        language: text_field(map, "language"),
    }
}

/// Builds a fresh result from a successful executor run. The timestamp is always
/// the time of normalization.
pub fn normalize(url: &str, raw: &RawCrawlOutput, want_screenshot: bool) -> CrawlResult {
    let screenshot = if want_screenshot {
        raw.screenshot
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    } else {
        None
    };

    CrawlResult {
        url: url.to_string(),
        markdown: markdown_from_value(&raw.markdown),
        html: html_from(raw),
        links: links_from_value(&raw.links),
        media: media_from_value(&raw.media),
        metadata: metadata_from_value(&raw.metadata),
        screenshot,
        timestamp: Utc::now(),
    }
}

/// Decodes a cache entry. Links and media are re-coerced; the stored timestamp is kept.
pub fn from_cached(json: &str) -> serde_json::Result<CrawlResult> {
    serde_json::from_str(json)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // Naive timestamps are UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// serde hooks used by `CrawlResult`'s Deserialize impl

pub fn deserialize_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        other => text_of(&other),
    })
}

pub fn deserialize_markdown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(markdown_from_value(&Value::deserialize(deserializer)?))
}

/// Stored links are already a flat list, but older entries may hold objects.
pub fn deserialize_links<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::Array(items) => items.iter().map(coerce_link).collect(),
        Value::Object(_) => links_from_value(&value),
        _ => Vec::new(),
    })
}

pub fn deserialize_media<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Media, D::Error> {
    Ok(media_from_value(&Value::deserialize(deserializer)?))
}

pub fn deserialize_metadata<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Metadata, D::Error> {
    Ok(metadata_from_value(&Value::deserialize(deserializer)?))
}

pub fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}
