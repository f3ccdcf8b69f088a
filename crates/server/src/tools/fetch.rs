//! sw_fetch tool implementation.
//!
//! Hands one request to the worker as if a page had issued it.

use std::collections::BTreeMap;

use chrono::Utc;
use offshelf_client::request::{headers_to_map, map_to_headers};
use offshelf_client::{Request, ServiceWorker, fetch::canonicalize};
use offshelf_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchParams {
    /// The URL the page requested.
    pub url: String,

    /// Resource-type metadata: empty for script fetches, "unknown" for
    /// navigations, otherwise e.g. "script", "style" or "image".
    #[serde(default)]
    pub destination: String,

    /// Extra request headers.
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
}

/// Output from the sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchOutput {
    pub url: String,
    /// Routing class the request was assigned.
    pub class: String,
    pub status: u16,
    /// network, blob_cache, record_store or synthetic.
    pub source: String,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Body as text; absent when it is not valid UTF-8.
    pub body: Option<String>,
    pub body_bytes: usize,
    pub served_at: String,
}

/// Implementation of the sw_fetch tool.
pub async fn fetch_impl(worker: &ServiceWorker, params: SwFetchParams) -> Result<CallToolResult, McpError> {
    let url = canonicalize(&params.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", params.url)))?;

    let mut request = Request::get(url).with_destination(params.destination.as_str());
    if let Some(headers) = &params.headers {
        request.headers = map_to_headers(headers);
    }

    let class = worker.router().classifier().classify(&request);
    let response = worker.respond(&request).await;

    let output = SwFetchOutput {
        url: response.url.to_string(),
        class: class.as_str().to_string(),
        status: response.status.as_u16(),
        source: response.source.as_str().to_string(),
        content_type: response.content_type().map(String::from),
        headers: headers_to_map(&response.headers),
        body: String::from_utf8(response.body.to_vec()).ok(),
        body_bytes: response.body.len(),
        served_at: Utc::now().to_rfc3339(),
    };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize response: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
