//! Intercepted requests and the responses handed back to pages.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::Utc;
use offshelf_core::CacheEntry;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::fetch::url::cache_key;

/// Resource-type metadata attached to a request by the page.
///
/// Empty for script-initiated calls (`fetch`/XHR), `unknown` for top-level
/// navigations, otherwise the kind of sub-resource being loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Destination {
    #[default]
    Empty,
    Unknown,
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    Worker,
    Other(String),
}

impl Destination {
    pub fn as_str(&self) -> &str {
        match self {
            Destination::Empty => "",
            Destination::Unknown => "unknown",
            Destination::Document => "document",
            Destination::Script => "script",
            Destination::Style => "style",
            Destination::Image => "image",
            Destination::Font => "font",
            Destination::Manifest => "manifest",
            Destination::Worker => "worker",
            Destination::Other(other) => other,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Destination::Empty)
    }
}

impl From<&str> for Destination {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Destination::Empty,
            "unknown" => Destination::Unknown,
            "document" => Destination::Document,
            "script" => Destination::Script,
            "style" => Destination::Style,
            "image" => Destination::Image,
            "font" => Destination::Font,
            "manifest" => Destination::Manifest,
            "worker" => Destination::Worker,
            other => Destination::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request intercepted on behalf of a page.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub destination: Destination,
}

impl Request {
    /// A bare GET with no destination, as issued by script.
    pub fn get(url: Url) -> Self {
        Self { method: Method::GET, url, headers: HeaderMap::new(), destination: Destination::Empty }
    }

    pub fn with_destination(mut self, destination: impl Into<Destination>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Blob cache key for this request.
    pub fn cache_key(&self) -> String {
        cache_key(&self.url)
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Network,
    BlobCache,
    RecordStore,
    /// Produced by the worker itself after every source failed.
    Synthetic,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Network => "network",
            Source::BlobCache => "blob_cache",
            Source::RecordStore => "record_store",
            Source::Synthetic => "synthetic",
        }
    }
}

/// A response handed back to the page.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: Source,
}

impl Response {
    /// A JSON response built by the worker.
    pub fn json(url: Url, body: Vec<u8>, source: Source) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self { url, status: StatusCode::OK, headers, body: Bytes::from(body), source }
    }

    /// A plain-text error response standing in for an exhausted fallback chain.
    pub fn synthetic_error(url: Url, status: StatusCode, reason: String) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        Self { url, status, headers, body: Bytes::from(reason), source: Source::Synthetic }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Capture this response for the blob cache.
    ///
    /// `request_headers` becomes the stored request envelope (e.g. the
    /// `max-age` marker).
    pub fn to_entry(&self, key: &str, method: &Method, request_headers: BTreeMap<String, String>) -> CacheEntry {
        CacheEntry {
            url: key.to_string(),
            method: method.as_str().to_string(),
            request_headers,
            status: self.status.as_u16(),
            status_text: self.status.canonical_reason().unwrap_or_default().to_string(),
            response_headers: headers_to_map(&self.headers),
            body: self.body.to_vec(),
            stored_at: Utc::now().to_rfc3339(),
        }
    }

    /// Replay a cached entry. Unparseable stored headers are dropped.
    pub fn from_entry(url: Url, entry: CacheEntry) -> Self {
        let status = StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK);
        Self {
            url,
            status,
            headers: map_to_headers(&entry.response_headers),
            body: Bytes::from(entry.body),
            source: Source::BlobCache,
        }
    }
}

/// Flatten a header map; repeated headers are joined with `, `.
pub fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        map.entry(name.as_str().to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    map
}

pub fn map_to_headers(map: &BTreeMap<String, String>) -> HeaderMap {
    map.iter()
        .filter_map(|(name, value)| {
            let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
            let value = HeaderValue::from_str(value).ok()?;
            Some((name, value))
        })
        .collect()
}
