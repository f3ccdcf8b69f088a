//! Unified error types for offshelf.
//!
//! Each variant carries a stable code prefix so failures stay recognisable
//! after they cross the MCP boundary as plain strings.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the offshelf worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The network exchange did not produce a response in time.
    #[error("FETCH_TIMEOUT: {0}")]
    Timeout(String),

    /// The network exchange was rejected (DNS, connection refused, TLS, aborted).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// No blob cache entry for the requested key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// The structured record store is locked, busy or at an incompatible version.
    #[error("STORE_UNAVAILABLE: {0}")]
    StoreUnavailable(String),

    /// Upstream API body is not the expected search envelope.
    #[error("UPSTREAM_FORMAT: {0}")]
    UpstreamFormat(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Precache could not fetch every manifest entry.
    #[error("INSTALL_FAILED: {0}")]
    InstallFailed(String),

    /// Lifecycle step requested from the wrong worker state.
    #[error("INVALID_STATE: {0}")]
    InvalidState(String),
}

impl Error {
    /// Whether this failure came from the network stage of a fallback chain.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Network(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e.into(),
            other => Error::Database(other),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
                Error::StoreUnavailable(err.to_string())
            }
            _ => Error::Database(tokio_rusqlite::Error::Error(err)),
        }
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::StoreUnavailable(msg) => (-32004, msg.clone()),
            Error::Timeout(msg) => (-32006, msg.clone()),
            Error::Network(msg) => (-32008, msg.clone()),
            Error::UpstreamFormat(msg) => (-32009, msg.clone()),
            Error::InstallFailed(msg) => (-32010, msg.clone()),
            Error::InvalidState(msg) => (-32011, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
