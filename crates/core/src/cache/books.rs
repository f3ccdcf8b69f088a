//! Structured record store for book documents.
//!
//! Search results from the upstream API are kept as whole JSON documents,
//! keyed by their unique `key` and indexed by `title`, so searches can still be
//! answered offline.

use super::connection::CacheDb;
use crate::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, TransactionBehavior};

/// Name the store's schema version is tracked under.
pub const STORE_NAME: &str = "books";

/// `numFound` reported by envelopes synthesised from local records.
pub const OFFLINE_NUM_FOUND: u64 = 9999;

/// One search result document.
///
/// Only `key` and `title` are interpreted; every other field is carried
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl BookRecord {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self { key: key.into(), title: Some(title.into()), fields: Map::new() }
    }
}

/// Search API response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEnvelope {
    pub docs: Vec<BookRecord>,
    #[serde(default)]
    pub start: u64,
    #[serde(rename = "numFound", default)]
    pub num_found: u64,
}

impl SearchEnvelope {
    /// Parse an upstream response body.
    pub fn from_slice(body: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(body).map_err(|e| Error::UpstreamFormat(e.to_string()))
    }

    /// Envelope answering a search from local records.
    pub fn offline(docs: Vec<BookRecord>) -> Self {
        Self { docs, start: 0, num_found: OFFLINE_NUM_FOUND }
    }
}

/// Typed repository over the `books` table.
#[derive(Clone, Debug)]
pub struct BookStore {
    db: CacheDb,
}

/// Default upgrade: creates the `books` table keyed on `key` and the title index.
pub fn create_schema(conn: &rusqlite::Connection, old_version: u32, new_version: u32) -> Result<(), Error> {
    tracing::info!(old_version, new_version, "upgrading book store schema");
    if old_version < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS books (
                key TEXT PRIMARY KEY,
                title TEXT,
                doc_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS books_title ON books(title);",
        )?;
    }
    Ok(())
}

impl BookStore {
    /// Handle over an already initialised store.
    ///
    /// No schema work is done; operations fail until [`BookStore::init`] has
    /// run against the same database.
    pub fn attach(db: &CacheDb) -> Self {
        Self { db: db.clone() }
    }

    /// Open the store at `schema_version`, upgrading it if needed.
    ///
    /// `on_upgrade` receives `(conn, old_version, new_version)` and runs in the
    /// same immediate transaction as the version bump, so it is called at most
    /// once per version increase and never when the store is already current.
    /// A store already at a newer version, or locked by another connection,
    /// fails with [`Error::StoreUnavailable`].
    pub async fn init<F>(db: &CacheDb, schema_version: u32, on_upgrade: F) -> Result<Self, Error>
    where
        F: FnOnce(&rusqlite::Connection, u32, u32) -> Result<(), Error> + Send + 'static,
    {
        db.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let current: u32 = tx
                    .query_row("SELECT version FROM _store_versions WHERE store = ?1", params![STORE_NAME], |row| {
                        row.get(0)
                    })
                    .optional()?
                    .unwrap_or(0);

                if current > schema_version {
                    return Err(Error::StoreUnavailable(format!(
                        "store {STORE_NAME} is at version {current}, newer than {schema_version}"
                    )));
                }

                if current < schema_version {
                    on_upgrade(&*tx, current, schema_version)?;
                    tx.execute(
                        "INSERT INTO _store_versions (store, version, upgraded_at) VALUES (?1, ?2, ?3)
                        ON CONFLICT(store) DO UPDATE SET
                            version = excluded.version,
                            upgraded_at = excluded.upgraded_at",
                        params![STORE_NAME, schema_version, Utc::now().to_rfc3339()],
                    )?;
                }

                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(Self::attach(db))
    }

    /// Current schema version, 0 when the store was never initialised.
    pub async fn version(&self) -> Result<u32, Error> {
        self.db
            .conn
            .call(|conn| -> Result<u32, Error> {
                let version = conn
                    .query_row("SELECT version FROM _store_versions WHERE store = ?1", params![STORE_NAME], |row| {
                        row.get(0)
                    })
                    .optional()?;
                Ok(version.unwrap_or(0))
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace a record by its key.
    pub async fn upsert(&self, record: &BookRecord) -> Result<(), Error> {
        self.upsert_many(std::slice::from_ref(record)).await
    }

    /// Upsert several records in one transaction. Later duplicates win.
    pub async fn upsert_many(&self, records: &[BookRecord]) -> Result<(), Error> {
        let rows = records
            .iter()
            .map(|record| {
                let doc = serde_json::to_string(record).map_err(|e| Error::InvalidInput(e.to_string()))?;
                Ok((record.key.clone(), record.title.clone(), doc))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                let updated_at = Utc::now().to_rfc3339();
                for (key, title, doc) in &rows {
                    tx.execute(
                        "INSERT INTO books (key, title, doc_json, updated_at) VALUES (?1, ?2, ?3, ?4)
                        ON CONFLICT(key) DO UPDATE SET
                            title = excluded.title,
                            doc_json = excluded.doc_json,
                            updated_at = excluded.updated_at",
                        params![key, title, doc, updated_at],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a record by key.
    pub async fn get(&self, key: &str) -> Result<Option<BookRecord>, Error> {
        let key = key.to_string();
        let doc = self
            .db
            .conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let doc = conn
                    .query_row("SELECT doc_json FROM books WHERE key = ?1", params![key], |row| row.get(0))
                    .optional()?;
                Ok(doc)
            })
            .await
            .map_err(Error::from)?;

        doc.map(|doc| decode(&doc)).transpose()
    }

    /// Records whose title equals `query` exactly, ordered by key.
    pub async fn find_by_title(&self, query: &str) -> Result<Vec<BookRecord>, Error> {
        let query = query.to_string();
        let docs = self
            .db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT doc_json FROM books WHERE title = ?1 ORDER BY key")?;
                let docs = stmt
                    .query_map(params![query], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(docs)
            })
            .await
            .map_err(Error::from)?;

        docs.iter().map(|doc| decode(doc)).collect()
    }

    /// Every record, ordered by key.
    pub async fn all(&self) -> Result<Vec<BookRecord>, Error> {
        let docs = self
            .db
            .conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT doc_json FROM books ORDER BY key")?;
                let docs = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?;
                Ok(docs)
            })
            .await
            .map_err(Error::from)?;

        docs.iter().map(|doc| decode(doc)).collect()
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<u64, Error> {
        self.db
            .conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

fn decode(doc: &str) -> Result<BookRecord, Error> {
    serde_json::from_str(doc).map_err(|e| Error::UpstreamFormat(format!("stored book document: {e}")))
}
