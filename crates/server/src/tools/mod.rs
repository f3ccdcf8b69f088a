//! MCP tool implementations.
//!
//! This module contains all tools exposed by the offshelf server.

pub mod books;
pub mod cache;
pub mod fetch;
pub mod lifecycle;

pub use books::{BooksFindParams, find_impl};
pub use fetch::{SwFetchParams, fetch_impl};
pub use lifecycle::{SwSetOnlineParams, activate_impl, install_impl, set_online_impl, status_impl};
