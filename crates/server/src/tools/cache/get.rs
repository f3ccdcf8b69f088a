//! cache_get tool implementation.
//!
//! Retrieves one blob cache entry by URL from the running namespace.

use std::collections::BTreeMap;

use offshelf_client::ServiceWorker;
use offshelf_client::fetch::{cache_key, canonicalize};
use offshelf_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// The URL the entry was stored under.
    pub url: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub key: String,
    pub method: String,
    pub status: u16,
    pub status_text: String,
    pub request_headers: BTreeMap<String, String>,
    pub response_headers: BTreeMap<String, String>,
    /// Absolute expiry in epoch milliseconds, from the `max-age` marker.
    pub expires_at_ms: Option<i64>,
    pub body_bytes: usize,
    pub stored_at: String,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(worker: &ServiceWorker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = canonicalize(&params.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", params.url)))?;
    let entry = worker.router().cache().get(&cache_key(&url)).await?;

    let output = CacheGetOutput {
        expires_at_ms: entry.max_age(),
        body_bytes: entry.body.len(),
        key: entry.url,
        method: entry.method,
        status: entry.status,
        status_text: entry.status_text,
        request_headers: entry.request_headers,
        response_headers: entry.response_headers,
        stored_at: entry.stored_at,
    };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize entry: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
