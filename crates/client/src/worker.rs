//! The service worker facade.
//!
//! Ties the router and the lifecycle together behind one handle and tracks
//! the worker state, published on a `watch` channel so callers can observe
//! when the worker starts controlling pages.

use std::fmt;
use std::sync::Arc;

use offshelf_core::{AppConfig, CacheDb, Error};
use serde::Serialize;
use tokio::sync::watch;

use crate::classify::Classifier;
use crate::fetch::Upstream;
use crate::lifecycle::{ActivationReport, Lifecycle};
use crate::request::{Request, Response};
use crate::router::{FallbackRouter, RouterConfig};
use crate::status::NetworkStatus;

/// Registration state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    /// Activated and controlling open pages.
    Activated,
    /// Install or activation failed; a new install may be attempted.
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ServiceWorker {
    router: FallbackRouter,
    lifecycle: Lifecycle,
    state: watch::Sender<WorkerState>,
}

impl ServiceWorker {
    pub fn new(router: FallbackRouter, lifecycle: Lifecycle) -> Self {
        Self { router, lifecycle, state: watch::Sender::new(WorkerState::Parsed) }
    }

    /// Wire a worker from configuration over an open database.
    pub fn from_config(db: &CacheDb, upstream: Arc<dyn Upstream>, config: &AppConfig) -> Result<Self, Error> {
        let classifier = Classifier::from_config(config)?;
        let router = FallbackRouter::new(
            db,
            &config.namespace(),
            upstream.clone(),
            classifier.clone(),
            NetworkStatus::new(!config.start_offline),
            RouterConfig::from_app_config(config)?,
        );
        let lifecycle = Lifecycle::from_config(db, upstream, classifier, config)?;
        Ok(Self::new(router, lifecycle))
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Whether the worker has claimed open pages.
    pub fn is_controlling(&self) -> bool {
        self.state() == WorkerState::Activated
    }

    pub fn router(&self) -> &FallbackRouter {
        &self.router
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn network_status(&self) -> &NetworkStatus {
        self.router.status()
    }

    /// Precache the manifest. Allowed from `Parsed` or `Redundant`.
    pub async fn install(&self) -> Result<usize, Error> {
        self.transition(&[WorkerState::Parsed, WorkerState::Redundant], WorkerState::Installing)?;

        match self.lifecycle.install().await {
            Ok(cached) => {
                self.state.send_replace(WorkerState::Installed);
                Ok(cached)
            }
            Err(err) => {
                tracing::error!(error = %err, "install failed");
                self.state.send_replace(WorkerState::Redundant);
                Err(err)
            }
        }
    }

    /// Activate, then claim clients. Requires a completed install.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        self.transition(&[WorkerState::Installed], WorkerState::Activating)?;

        match self.lifecycle.activate().await {
            Ok(report) => {
                tracing::info!(
                    schema_version = report.schema_version,
                    namespaces_removed = report.namespaces_removed.len(),
                    stale_entries_removed = report.stale_entries_removed.len(),
                    "activation complete"
                );
                self.claim_clients();
                Ok(report)
            }
            Err(err) => {
                tracing::error!(error = %err, "activation failed");
                self.state.send_replace(WorkerState::Redundant);
                Err(err)
            }
        }
    }

    /// Answer an intercepted request. Never fails.
    ///
    /// The fallback chain runs in every state, so a worker left `Redundant`
    /// by a failed boot still serves whatever is already persisted.
    pub async fn respond(&self, request: &Request) -> Response {
        self.router.respond(request).await
    }

    /// Publishes the controlling state to subscribers. Routing does not
    /// depend on it.
    fn claim_clients(&self) {
        self.state.send_replace(WorkerState::Activated);
        tracing::info!("controlling open pages");
    }

    fn transition(&self, from: &[WorkerState], to: WorkerState) -> Result<(), Error> {
        let mut current = to;
        let moved = self.state.send_if_modified(|state| {
            current = *state;
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        });

        if moved { Ok(()) } else { Err(Error::InvalidState(format!("cannot move from {current} to {to}"))) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Source;
    use crate::testing::{ScriptedUpstream, reply};
    use url::Url;

    fn config() -> AppConfig {
        AppConfig { precache: vec!["./".into(), "./index.html".into()], ..Default::default() }
    }

    async fn worker(upstream: &Arc<ScriptedUpstream>) -> ServiceWorker {
        let db = CacheDb::open_in_memory().await.unwrap();
        ServiceWorker::from_config(&db, upstream.clone(), &config()).unwrap()
    }

    fn shell(upstream: &ScriptedUpstream) {
        upstream.respond("http://localhost:5000/", reply(200, "<html>shell</html>"));
        upstream.respond("http://localhost:5000/index.html", reply(200, "<html>shell</html>"));
    }

    #[tokio::test]
    async fn test_install_then_activate() {
        let upstream = Arc::new(ScriptedUpstream::new());
        shell(&upstream);
        let worker = worker(&upstream).await;
        let mut states = worker.subscribe();
        assert_eq!(worker.state(), WorkerState::Parsed);

        assert_eq!(worker.install().await.unwrap(), 2);
        assert_eq!(worker.state(), WorkerState::Installed);
        assert!(!worker.is_controlling());

        let report = worker.activate().await.unwrap();
        assert_eq!(report.schema_version, 1);
        assert!(worker.is_controlling());

        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let upstream = Arc::new(ScriptedUpstream::new());
        let worker = worker(&upstream).await;

        assert!(matches!(worker.activate().await, Err(Error::InvalidState(_))));
        assert_eq!(worker.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_install_twice_is_rejected() {
        let upstream = Arc::new(ScriptedUpstream::new());
        shell(&upstream);
        let worker = worker(&upstream).await;

        worker.install().await.unwrap();
        assert!(matches!(worker.install().await, Err(Error::InvalidState(_))));
        assert_eq!(worker.state(), WorkerState::Installed);
    }

    #[tokio::test]
    async fn test_failed_install_can_be_retried() {
        let upstream = Arc::new(ScriptedUpstream::new());
        upstream.respond("http://localhost:5000/", reply(200, "<html>shell</html>"));
        upstream.respond("http://localhost:5000/index.html", reply(404, "missing"));
        upstream.respond("http://localhost:5000/index.html", reply(200, "<html>shell</html>"));
        let worker = worker(&upstream).await;

        assert!(matches!(worker.install().await, Err(Error::InstallFailed(_))));
        assert_eq!(worker.state(), WorkerState::Redundant);

        assert_eq!(worker.install().await.unwrap(), 2);
        assert_eq!(worker.state(), WorkerState::Installed);
    }

    #[tokio::test]
    async fn test_offline_navigation_after_install() {
        let upstream = Arc::new(ScriptedUpstream::new());
        shell(&upstream);
        let worker = worker(&upstream).await;
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        worker.network_status().set_online(false);
        let request = Request::get(Url::parse("http://localhost:5000/search/dune").unwrap()).with_destination("unknown");
        let response = worker.respond(&request).await;

        assert_eq!(response.source, Source::BlobCache);
        assert_eq!(response.body.as_ref(), b"<html>shell</html>");
    }

    #[tokio::test]
    async fn test_redundant_worker_serves_persisted_cache() {
        let upstream = Arc::new(ScriptedUpstream::new());
        upstream.respond("http://localhost:5000/", reply(200, "<html>shell</html>"));
        upstream.respond("http://localhost:5000/index.html", reply(500, "down"));
        let worker = worker(&upstream).await;

        let url = Url::parse("http://localhost:5000/icon.png").unwrap();
        let stored = Response::json(url.clone(), b"png".to_vec(), Source::Network);
        let entry = stored.to_entry(url.as_str(), &reqwest::Method::GET, Default::default());
        worker.router().cache().put(&entry).await.unwrap();

        assert!(worker.install().await.is_err());
        assert_eq!(worker.state(), WorkerState::Redundant);
        assert!(!worker.is_controlling());

        worker.network_status().set_online(false);
        let response = worker.respond(&Request::get(url).with_destination("image")).await;
        assert_eq!(response.source, Source::BlobCache);
        assert_eq!(response.body.as_ref(), b"png");
    }

    #[test]
    fn test_state_names() {
        assert_eq!(WorkerState::Activated.to_string(), "activated");
        assert_eq!(serde_json::to_string(&WorkerState::Redundant).unwrap(), "\"redundant\"");
    }
}
