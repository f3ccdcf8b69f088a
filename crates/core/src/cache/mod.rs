//! SQLite-backed storage for the offline worker.
//!
//! This module provides the two durable stores the fallback router reads from
//! when the network is slow or gone, using SQLite with async access via
//! tokio-rusqlite:
//!
//! - A versioned blob cache of captured request/response pairs
//! - A structured record store of book documents with a title index
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod blob;
pub mod books;
pub mod connection;
pub mod max_age;
pub mod migrations;
pub mod namespace;

pub use crate::Error;

pub use blob::{BlobCache, CacheEntry};
pub use books::{BookRecord, BookStore, SearchEnvelope};
pub use connection::CacheDb;
pub use namespace::CacheNamespace;
