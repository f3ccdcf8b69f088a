//! Core types and shared functionality for offshelf.
//!
//! This crate provides:
//! - Blob cache and structured record store with a SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{BlobCache, BookRecord, BookStore, CacheDb, CacheEntry, CacheNamespace, SearchEnvelope};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
