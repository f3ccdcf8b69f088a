//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the worker.
use std::sync::Arc;

use crate::tools::cache::{CacheGetParams, CacheKeysParams, get_impl, keys_impl};
use crate::tools::{
    BooksFindParams, SwFetchParams, SwSetOnlineParams, activate_impl, fetch_impl, find_impl, install_impl,
    set_online_impl, status_impl,
};

use offshelf_client::ServiceWorker;
use offshelf_core::CacheDb;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for offshelf.
#[derive(Clone)]
pub struct OffshelfServer {
    db: CacheDb,
    worker: Arc<ServiceWorker>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl OffshelfServer {
    /// Create a new server handler over a booted worker.
    pub fn new(db: CacheDb, worker: Arc<ServiceWorker>) -> Self {
        Self { db, worker, tool_router: Self::tool_router() }
    }

    /// Route one request through the worker as if a controlled page issued it.
    #[tool(
        description = "Intercept a request. Classifies it, then answers from network, blob cache or book store depending on connectivity and deadlines."
    )]
    async fn sw_fetch(&self, params: Parameters<SwFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    #[tool(description = "Precache the app shell manifest. Fails without writing anything if any entry fails.")]
    async fn sw_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.worker).await
    }

    #[tool(
        description = "Activate the installed worker: upgrade the book store, drop old cache versions, sweep expired API entries, claim pages."
    )]
    async fn sw_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.worker).await
    }

    #[tool(description = "Report worker state, connectivity and cache sizes.")]
    async fn sw_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.worker).await
    }

    #[tool(description = "Mark the network as reachable or unreachable.")]
    async fn sw_set_online(&self, params: Parameters<SwSetOnlineParams>) -> Result<CallToolResult, McpError> {
        set_online_impl(&self.worker, params.0).await
    }

    #[tool(description = "Find stored books by exact title.")]
    async fn books_find(&self, params: Parameters<BooksFindParams>) -> Result<CallToolResult, McpError> {
        find_impl(&self.worker, params.0).await
    }

    #[tool(description = "Get one blob cache entry (metadata and expiry) by URL.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.worker, params.0).await
    }

    #[tool(description = "List blob cache keys of a namespace, plus every namespace present.")]
    async fn cache_keys(&self, params: Parameters<CacheKeysParams>) -> Result<CallToolResult, McpError> {
        keys_impl(&self.db, &self.worker, params.0).await
    }
}

impl ServerHandler for OffshelfServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "offshelf".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
