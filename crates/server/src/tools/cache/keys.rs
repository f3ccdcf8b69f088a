//! cache_keys tool implementation.

use offshelf_client::ServiceWorker;
use offshelf_core::{CacheDb, Error};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the cache_keys tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheKeysParams {
    /// Namespace to list (`name:version`); defaults to the running one.
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Output from the cache_keys tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheKeysOutput {
    pub namespace: String,
    pub keys: Vec<String>,
    /// Every namespace currently holding entries.
    pub namespaces: Vec<String>,
}

/// Implementation of the cache_keys tool.
pub async fn keys_impl(
    db: &CacheDb, worker: &ServiceWorker, params: CacheKeysParams,
) -> Result<CallToolResult, McpError> {
    let cache = match params.namespace {
        Some(namespace) if namespace.is_empty() => {
            return Err(Error::InvalidInput("namespace cannot be empty".into()).into());
        }
        Some(namespace) => db.blob_cache(namespace),
        None => worker.router().cache().clone(),
    };

    let output = CacheKeysOutput {
        namespace: cache.namespace().to_string(),
        keys: cache.keys().await?,
        namespaces: db.namespaces().await?,
    };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize keys: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
