//! Fixtures shared by the tool tests.

use std::sync::Arc;

use async_trait::async_trait;
use offshelf_client::{Request, Response, ServiceWorker, Source, Upstream};
use offshelf_core::{AppConfig, CacheDb, Error};
use rmcp::model::CallToolResult;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

pub(crate) const DUNE_ENVELOPE: &str =
    r#"{"start":0,"numFound":1,"docs":[{"key":"/works/OL893415W","title":"dune","first_publish_year":1965}]}"#;

/// Answers every search with [`DUNE_ENVELOPE`] and anything else with `ok`.
pub(crate) struct StubUpstream;

#[async_trait]
impl Upstream for StubUpstream {
    async fn exchange(&self, request: &Request, _cancel: CancellationToken) -> Result<Response, Error> {
        let body = if request.url.path().ends_with("search.json") { DUNE_ENVELOPE } else { "ok" };
        Ok(Response::json(request.url.clone(), body.as_bytes().to_vec(), Source::Network))
    }
}

pub(crate) async fn worker() -> (Arc<ServiceWorker>, CacheDb) {
    let db = CacheDb::open_in_memory().await.unwrap();
    let config = AppConfig { precache: vec!["./".into(), "./index.html".into()], ..Default::default() };
    let worker = ServiceWorker::from_config(&db, Arc::new(StubUpstream), &config).unwrap();
    (Arc::new(worker), db)
}

/// Decode the JSON text a tool returned.
pub(crate) fn output<T: DeserializeOwned>(result: &CallToolResult) -> T {
    let content_val = serde_json::to_value(&result.content[0]).unwrap();
    let text = content_val
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}
