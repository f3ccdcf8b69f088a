//! Fallback router.
//!
//! One state machine per intercepted request:
//!
//! | class     | online                                         | offline                  |
//! |-----------|------------------------------------------------|--------------------------|
//! | `Static`  | network (static deadline), cache, network (no deadline) | blob cache      |
//! | `Api`     | network (API deadline), cache, network (no deadline)    | book store envelope |
//! | `SpaNav`  | network (no deadline)                          | cached root document     |
//! | `Other`   | network (no deadline)                          | blob cache               |
//!
//! Stages run strictly in sequence. Successful `GET` responses from the API
//! host are written back on a tracked background task after the response has
//! been handed back. Only `GET` requests are ever answered from the blob cache.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use offshelf_core::cache::max_age;
use offshelf_core::{AppConfig, BlobCache, BookStore, CacheDb, CacheNamespace, Error, SearchEnvelope};
use reqwest::{Method, StatusCode};
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use url::Url;

use crate::classify::{Classifier, RequestClass};
use crate::fetch::{Timeout, Upstream, cache_key, fetch_with_timeout};
use crate::request::{Request, Response, Source};
use crate::status::NetworkStatus;

/// Per-class deadlines and write-back lifetime.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub static_timeout: Duration,
    pub api_timeout: Duration,
    /// Added to the current time to form the `max-age` marker.
    pub api_max_age: Duration,
    /// Served for navigations while offline.
    pub root_document: Url,
}

impl RouterConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let root_document = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            static_timeout: config.static_timeout(),
            api_timeout: config.api_timeout(),
            api_max_age: config.api_max_age(),
            root_document,
        })
    }
}

/// Routes intercepted requests across network, blob cache and book store.
pub struct FallbackRouter {
    upstream: Arc<dyn Upstream>,
    cache: BlobCache,
    books: BookStore,
    classifier: Classifier,
    status: NetworkStatus,
    config: RouterConfig,
    write_backs: TaskTracker,
    flushing: Mutex<()>,
}

impl FallbackRouter {
    /// Build a router over `namespace` of the blob cache in `db`.
    ///
    /// The book store is attached, not initialised; activation owns the schema.
    pub fn new(
        db: &CacheDb, namespace: &CacheNamespace, upstream: Arc<dyn Upstream>, classifier: Classifier,
        status: NetworkStatus, config: RouterConfig,
    ) -> Self {
        Self {
            upstream,
            cache: db.blob_cache(namespace.to_string()),
            books: BookStore::attach(db),
            classifier,
            status,
            config,
            write_backs: TaskTracker::new(),
            flushing: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &BlobCache {
        &self.cache
    }

    pub fn books(&self) -> &BookStore {
        &self.books
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn status(&self) -> &NetworkStatus {
        &self.status
    }

    /// Answer an intercepted request, always producing a response.
    ///
    /// An exhausted fallback chain becomes a synthetic `504` when the last
    /// failure was a timeout and `503` otherwise.
    pub async fn respond(&self, request: &Request) -> Response {
        match self.handle(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(url = %request.url, error = %err, "every source failed");
                Response::synthetic_error(request.url.clone(), fallback_status(&err), err.to_string())
            }
        }
    }

    /// Run the fallback chain for one request, propagating the final failure.
    pub async fn handle(&self, request: &Request) -> Result<Response, Error> {
        let class = self.classifier.classify(request);
        let online = self.status.is_online();
        tracing::debug!(url = %request.url, class = class.as_str(), online, "routing request");

        match (class, online) {
            (RequestClass::Static, true) => self.network_or_cache(request, class, self.config.static_timeout).await,
            (RequestClass::Api, true) => self.network_or_cache(request, class, self.config.api_timeout).await,
            (RequestClass::SpaNav | RequestClass::Other, true) => {
                self.from_network(request, class, Timeout::Infinite).await
            }
            (RequestClass::Api, false) => self.from_store(request).await,
            (RequestClass::SpaNav, false) => {
                let root = self.config.root_document.clone();
                self.from_cache(&request.method, &cache_key(&root), root).await
            }
            (RequestClass::Static | RequestClass::Other, false) => {
                self.from_cache(&request.method, &request.cache_key(), request.url.clone()).await
            }
        }
    }

    /// Wait for every write-back spawned so far.
    ///
    /// Concurrent callers take turns so one caller reopening the tracker never
    /// strands another's wait.
    pub async fn flush(&self) {
        let _turn = self.flushing.lock().await;
        self.write_backs.close();
        self.write_backs.wait().await;
        self.write_backs.reopen();
    }

    async fn network_or_cache(&self, request: &Request, class: RequestClass, limit: Duration) -> Result<Response, Error> {
        match self.from_network(request, class, Timeout::After(limit)).await {
            Ok(response) => return Ok(response),
            Err(err) if err.is_network_failure() => {
                tracing::debug!(url = %request.url, error = %err, "network stage failed, trying cache");
            }
            Err(err) => return Err(err),
        }

        match self.from_cache(&request.method, &request.cache_key(), request.url.clone()).await {
            Ok(response) => return Ok(response),
            Err(Error::CacheMiss(_)) => {
                tracing::debug!(url = %request.url, "cache miss, retrying network without deadline");
            }
            Err(err) => {
                tracing::warn!(url = %request.url, error = %err, "cache stage failed, retrying network");
            }
        }

        self.from_network(request, class, Timeout::Infinite).await
    }

    async fn from_network(&self, request: &Request, class: RequestClass, timeout: Timeout) -> Result<Response, Error> {
        let response = fetch_with_timeout(self.upstream.as_ref(), request, timeout).await?;
        let replayable = request.method == Method::GET && response.status.is_success();
        if replayable && self.classifier.is_api_host(&request.url) {
            self.spawn_write_back(request, class, &response);
        }
        Ok(response)
    }

    async fn from_cache(&self, method: &Method, key: &str, url: Url) -> Result<Response, Error> {
        if *method != Method::GET {
            return Err(Error::CacheMiss(format!("{method} {key} is never cached")));
        }
        let entry = self.cache.get(key).await?;
        tracing::debug!(key, status = entry.status, "served from blob cache");
        Ok(Response::from_entry(url, entry))
    }

    /// Answer a search from local records, mirroring the upstream envelope.
    ///
    /// Without a `title` parameter every stored record is returned.
    async fn from_store(&self, request: &Request) -> Result<Response, Error> {
        let title = request.url.query_pairs().find(|(name, _)| name == "title").map(|(_, value)| value.into_owned());
        let docs = match &title {
            Some(title) => self.books.find_by_title(title).await?,
            None => self.books.all().await?,
        };
        tracing::debug!(url = %request.url, title = ?title, hits = docs.len(), "served from book store");

        let body = serde_json::to_vec_pretty(&SearchEnvelope::offline(docs))
            .map_err(|e| Error::InvalidInput(format!("failed to serialize envelope: {e}")))?;
        Ok(Response::json(request.url.clone(), body, Source::RecordStore))
    }

    fn spawn_write_back(&self, request: &Request, class: RequestClass, response: &Response) {
        let lifetime = i64::try_from(self.config.api_max_age.as_millis()).unwrap_or(i64::MAX);
        let expires_at = max_age::now_ms().saturating_add(lifetime);
        let envelope = BTreeMap::from([(max_age::HEADER.to_string(), max_age::marker(expires_at))]);
        let entry = response.to_entry(&request.cache_key(), &request.method, envelope);

        let cache = self.cache.clone();
        let books = (class == RequestClass::Api).then(|| self.books.clone());
        let body = response.body.clone();

        self.write_backs.spawn(async move {
            if let Err(err) = cache.put(&entry).await {
                tracing::warn!(key = %entry.url, error = %err, "blob cache write-back failed");
            }

            let Some(books) = books else { return };
            let docs = match SearchEnvelope::from_slice(&body) {
                Ok(envelope) => envelope.docs,
                Err(err) => {
                    tracing::warn!(key = %entry.url, error = %err, "response is not a search envelope");
                    return;
                }
            };
            match books.upsert_many(&docs).await {
                Ok(()) => tracing::debug!(key = %entry.url, records = docs.len(), "book store write-back"),
                Err(err) => tracing::warn!(key = %entry.url, error = %err, "book store write-back failed"),
            }
        });
    }
}

fn fallback_status(err: &Error) -> StatusCode {
    match err {
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}
