//! Worker lifecycle tools: sw_install, sw_activate, sw_status, sw_set_online.

use offshelf_client::{ActivationReport, ServiceWorker};
use offshelf_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output from the sw_install tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwInstallOutput {
    pub state: String,
    /// Number of manifest entries precached.
    pub cached: usize,
}

/// Output from the sw_activate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwActivateOutput {
    pub state: String,
    pub schema_version: u32,
    pub namespaces_removed: Vec<String>,
    pub stale_entries_removed: Vec<String>,
}

/// Output from the sw_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwStatusOutput {
    pub state: String,
    pub controlling: bool,
    pub online: bool,
    pub namespace: String,
    pub cache_entries: usize,
    pub books: u64,
}

/// Parameters for the sw_set_online tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwSetOnlineParams {
    /// Whether the network should be treated as reachable.
    pub online: bool,
}

/// Output from the sw_set_online tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwSetOnlineOutput {
    pub online: bool,
    pub previous: bool,
}

fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Implementation of the sw_install tool.
pub async fn install_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let cached = worker.install().await?;
    json_result(&SwInstallOutput { state: worker.state().to_string(), cached })
}

/// Implementation of the sw_activate tool.
pub async fn activate_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let ActivationReport { schema_version, namespaces_removed, stale_entries_removed } = worker.activate().await?;
    json_result(&SwActivateOutput {
        state: worker.state().to_string(),
        schema_version,
        namespaces_removed,
        stale_entries_removed,
    })
}

/// Implementation of the sw_status tool.
///
/// The book count reads 0 until the store has been initialised by activation.
pub async fn status_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let router = worker.router();
    let cache_entries = router.cache().keys().await?.len();
    let books = router.books().count().await.unwrap_or_default();

    json_result(&SwStatusOutput {
        state: worker.state().to_string(),
        controlling: worker.is_controlling(),
        online: worker.network_status().is_online(),
        namespace: router.cache().namespace().to_string(),
        cache_entries,
        books,
    })
}

/// Implementation of the sw_set_online tool.
pub async fn set_online_impl(worker: &ServiceWorker, params: SwSetOnlineParams) -> Result<CallToolResult, McpError> {
    let previous = worker.network_status().set_online(params.online);
    tracing::info!(online = params.online, previous, "network status changed");
    json_result(&SwSetOnlineOutput { online: params.online, previous })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{output, worker};

    #[tokio::test]
    async fn test_install_activate_status() {
        let (worker, db) = worker().await;

        let out: SwInstallOutput = output(&install_impl(&worker).await.unwrap());
        assert_eq!(out.state, "installed");
        assert_eq!(out.cached, 2);

        let shell = worker.router().cache().get("http://localhost:5000/").await.unwrap();
        db.blob_cache("network-or-cache:0").put(&shell).await.unwrap();

        let out: SwActivateOutput = output(&activate_impl(&worker).await.unwrap());
        assert_eq!(out.state, "activated");
        assert_eq!(out.schema_version, 1);
        assert_eq!(out.namespaces_removed, vec!["network-or-cache:0".to_string()]);

        let out: SwStatusOutput = output(&status_impl(&worker).await.unwrap());
        assert!(out.controlling);
        assert!(out.online);
        assert_eq!(out.namespace, "network-or-cache:1");
        assert_eq!(out.cache_entries, 2);
        assert_eq!(out.books, 0);
    }

    #[tokio::test]
    async fn test_activate_before_install_fails() {
        let (worker, _db) = worker().await;
        let err = activate_impl(&worker).await.unwrap_err();
        assert_eq!(err.code.0, -32011);
    }

    #[tokio::test]
    async fn test_status_before_install() {
        let (worker, _db) = worker().await;
        let out: SwStatusOutput = output(&status_impl(&worker).await.unwrap());
        assert_eq!(out.state, "parsed");
        assert!(!out.controlling);
        assert_eq!(out.cache_entries, 0);
    }

    #[tokio::test]
    async fn test_set_online() {
        let (worker, _db) = worker().await;

        let result = set_online_impl(&worker, SwSetOnlineParams { online: false }).await.unwrap();
        let out: SwSetOnlineOutput = output(&result);
        assert!(out.previous);
        assert!(!out.online);
        assert!(!worker.network_status().is_online());
    }
}
