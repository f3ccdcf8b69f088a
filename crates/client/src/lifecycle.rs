//! Install and activate steps.
//!
//! Install precaches the app shell all-or-nothing. Activate prepares the book
//! store, drops blob cache namespaces from other versions and sweeps expired
//! API responses out of the current one.

use std::sync::Arc;

use futures_util::future::try_join_all;
use offshelf_core::cache::books::create_schema;
use offshelf_core::cache::max_age;
use offshelf_core::{AppConfig, BookStore, CacheDb, CacheEntry, CacheNamespace, Error};
use serde::Serialize;
use url::Url;

use crate::classify::Classifier;
use crate::fetch::{Timeout, Upstream, fetch_with_timeout, resolve};
use crate::request::{Request, headers_to_map};

/// What an activation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Book store schema version after the upgrade step.
    pub schema_version: u32,
    /// Namespaces deleted for carrying another version.
    pub namespaces_removed: Vec<String>,
    /// API entries deleted by the staleness sweep.
    pub stale_entries_removed: Vec<String>,
}

pub struct Lifecycle {
    db: CacheDb,
    upstream: Arc<dyn Upstream>,
    classifier: Classifier,
    namespace: CacheNamespace,
    schema_version: u32,
    manifest: Vec<Url>,
}

impl Lifecycle {
    pub fn new(
        db: &CacheDb, upstream: Arc<dyn Upstream>, classifier: Classifier, namespace: CacheNamespace,
        schema_version: u32, manifest: Vec<Url>,
    ) -> Self {
        Self { db: db.clone(), upstream, classifier, namespace, schema_version, manifest }
    }

    /// Build from configuration, resolving the precache manifest against the origin.
    pub fn from_config(
        db: &CacheDb, upstream: Arc<dyn Upstream>, classifier: Classifier, config: &AppConfig,
    ) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let manifest = config
            .precache
            .iter()
            .map(|entry| resolve(&origin, entry).map_err(|e| Error::InvalidUrl(format!("{entry}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(db, upstream, classifier, config.namespace(), config.schema_version, manifest))
    }

    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    pub fn namespace(&self) -> &CacheNamespace {
        &self.namespace
    }

    /// Fetch every manifest entry and store them in one transaction.
    ///
    /// Any network failure or non-2xx status fails with
    /// [`Error::InstallFailed`] and nothing is written.
    pub async fn install(&self) -> Result<usize, Error> {
        tracing::info!(namespace = %self.namespace, entries = self.manifest.len(), "installing");

        let entries = try_join_all(self.manifest.iter().map(|url| self.precache(url))).await?;
        self.db.blob_cache(self.namespace.to_string()).put_all(&entries).await?;

        tracing::info!(namespace = %self.namespace, cached = entries.len(), "install complete");
        Ok(entries.len())
    }

    async fn precache(&self, url: &Url) -> Result<CacheEntry, Error> {
        let request = Request::get(url.clone());
        let response = fetch_with_timeout(self.upstream.as_ref(), &request, Timeout::Infinite)
            .await
            .map_err(|e| Error::InstallFailed(format!("{url}: {e}")))?;

        if !response.status.is_success() {
            return Err(Error::InstallFailed(format!("{url}: status {}", response.status)));
        }

        Ok(response.to_entry(&request.cache_key(), &request.method, headers_to_map(&request.headers)))
    }

    /// Run the activation steps in order.
    ///
    /// A failing schema upgrade aborts activation. Individual sweep deletions
    /// that fail are logged and skipped.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        tracing::info!(namespace = %self.namespace, schema_version = self.schema_version, "activating");

        let books = BookStore::init(&self.db, self.schema_version, create_schema).await?;
        let schema_version = books.version().await?;

        let mut namespaces_removed = Vec::new();
        for name in self.db.namespaces().await? {
            if CacheNamespace::is_outdated(&name, self.namespace.version) && self.db.delete_namespace(&name).await? {
                tracing::info!(namespace = %name, "deleted outdated cache namespace");
                namespaces_removed.push(name);
            }
        }

        let stale_entries_removed = self.sweep().await?;

        Ok(ActivationReport { schema_version, namespaces_removed, stale_entries_removed })
    }

    /// Delete API entries whose `max-age` marker is past, missing or unreadable.
    async fn sweep(&self) -> Result<Vec<String>, Error> {
        let cache = self.db.blob_cache(self.namespace.to_string());
        let now = max_age::now_ms();
        let mut removed = Vec::new();

        for (key, expires_at) in cache.max_age_markers().await? {
            let is_api = Url::parse(&key).is_ok_and(|url| self.classifier.is_api_host(&url));
            if !is_api || expires_at.is_some_and(|at| !max_age::is_expired(at, now)) {
                continue;
            }

            let deleted = cache.delete(&key).await;
            match deleted {
                Ok(true) => removed.push(key),
                Ok(false) => {}
                Err(err) => tracing::warn!(key = %key, error = %err, "failed to delete stale entry"),
            }
        }

        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), "swept stale API entries");
        }
        Ok(removed)
    }
}
