//! offshelf server entry point.
//!
//! This is the main binary that boots the worker and serves its MCP tools on
//! stdio transport. Logging goes to stderr to avoid interfering with the
//! JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use offshelf_client::{FetchConfig, HttpUpstream, ServiceWorker};
use offshelf_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        db_path = %config.db_path.display(),
        namespace = %config.namespace(),
        "Starting offshelf server on stdio transport"
    );

    let db = CacheDb::open(&config.db_path).await?;
    let fetch_config = FetchConfig { user_agent: config.user_agent.clone(), ..Default::default() };
    let upstream = Arc::new(HttpUpstream::new(&fetch_config)?);
    let worker = Arc::new(ServiceWorker::from_config(&db, upstream, &config)?);

    boot(&worker).await;

    let handler = handler::OffshelfServer::new(db, worker.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;
    worker.router().flush().await;

    Ok(())
}

/// Install then activate once. A failed step leaves the worker redundant
/// but the server keeps answering from whatever is already persisted.
async fn boot(worker: &ServiceWorker) {
    if let Err(err) = worker.install().await {
        tracing::warn!(error = %err, "install failed, serving from the existing cache");
        return;
    }
    if let Err(err) = worker.activate().await {
        tracing::warn!(error = %err, "activation failed, serving from the existing cache");
    }
}
