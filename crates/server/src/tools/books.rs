//! books_find tool implementation.
//!
//! Queries the local book store by exact title, the same lookup the worker
//! uses to answer searches offline.

use offshelf_client::ServiceWorker;
use offshelf_core::{BookRecord, Error};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the books_find tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BooksFindParams {
    /// Title to match exactly (case-sensitive).
    pub title: String,
}

/// Output from the books_find tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BooksFindOutput {
    pub title: String,
    pub count: usize,
    pub docs: Vec<BookRecord>,
}

/// Implementation of the books_find tool.
pub async fn find_impl(worker: &ServiceWorker, params: BooksFindParams) -> Result<CallToolResult, McpError> {
    if params.title.is_empty() {
        return Err(Error::InvalidInput("title cannot be empty".into()).into());
    }

    let docs = worker.router().books().find_by_title(&params.title).await?;
    let output = BooksFindOutput { title: params.title, count: docs.len(), docs };

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize books: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
