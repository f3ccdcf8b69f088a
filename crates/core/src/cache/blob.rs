//! Blob cache operations.
//!
//! A namespaced key -> (request, response) store. Keys are absolute URLs.
//! Entries are replaced on write and only removed by explicit eviction
//! (namespace deletion or the staleness sweep).

use std::collections::BTreeMap;

use super::connection::CacheDb;
use super::max_age;
use crate::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A captured request/response pair.
///
/// The request half is only an envelope (method, URL, selected headers); the
/// response half is replayed verbatim when the network is unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub method: String,
    pub request_headers: BTreeMap<String, String>,
    pub status: u16,
    pub status_text: String,
    pub response_headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl CacheEntry {
    /// Absolute expiry (epoch millis) from the stored `Cache-Control` marker.
    pub fn max_age(&self) -> Option<i64> {
        self.request_headers.get(max_age::HEADER).and_then(|value| max_age::parse(value))
    }
}

/// Handle to one namespace of the blob cache.
///
/// Obtaining a handle performs no I/O and creates nothing; the namespace row
/// is created by the first successful write.
#[derive(Clone, Debug)]
pub struct BlobCache {
    db: CacheDb,
    namespace: String,
}

impl CacheDb {
    /// Handle to the named blob cache namespace.
    pub fn blob_cache(&self, namespace: impl Into<String>) -> BlobCache {
        BlobCache { db: self.clone(), namespace: namespace.into() }
    }

    /// All namespaces that currently hold a row, sorted by name.
    pub async fn namespaces(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_namespaces ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a namespace and every entry under it.
    ///
    /// Returns whether the namespace existed.
    pub async fn delete_namespace(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM cache_entries WHERE namespace = ?1", params![name])?;
                let deleted = tx.execute("DELETE FROM cache_namespaces WHERE name = ?1", params![name])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}

impl BlobCache {
    /// The `name:version` string this handle reads and writes.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Look up the entry stored under `key`.
    ///
    /// Fails with [`Error::CacheMiss`] when there is none.
    pub async fn get(&self, key: &str) -> Result<CacheEntry, Error> {
        let namespace = self.namespace.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<CacheEntry, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, method, request_headers_json, status, status_text,
                            response_headers_json, body, stored_at
                     FROM cache_entries WHERE namespace = ?1 AND url = ?2",
                )?;

                let result = stmt.query_row(params![namespace, key], |row| {
                    Ok(CacheEntry {
                        url: row.get(0)?,
                        method: row.get(1)?,
                        request_headers: headers_column(row, 2)?,
                        status: row.get(3)?,
                        status_text: row.get(4)?,
                        response_headers: headers_column(row, 5)?,
                        body: row.get(6)?,
                        stored_at: row.get(7)?,
                    })
                });

                match result {
                    Ok(entry) => Ok(entry),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::CacheMiss(key)),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Store an entry under its URL, replacing any previous entry for that key.
    pub async fn put(&self, entry: &CacheEntry) -> Result<(), Error> {
        let namespace = self.namespace.clone();
        let entry = entry.clone();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                insert_entry(&tx, &namespace, &entry)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Store several entries in one transaction: either all land or none do.
    pub async fn put_all(&self, entries: &[CacheEntry]) -> Result<(), Error> {
        let namespace = self.namespace.clone();
        let entries = entries.to_vec();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for entry in &entries {
                    insert_entry(&tx, &namespace, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Every key in this namespace, sorted.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let namespace = self.namespace.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM cache_entries WHERE namespace = ?1 ORDER BY url")?;
                let keys = stmt
                    .query_map(params![namespace], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove the entry under `key`. Returns whether one existed.
    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        let namespace = self.namespace.clone();
        let key = key.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted =
                    conn.execute("DELETE FROM cache_entries WHERE namespace = ?1 AND url = ?2", params![namespace, key])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Keys paired with their `max-age` marker, without loading bodies.
    pub async fn max_age_markers(&self) -> Result<Vec<(String, Option<i64>)>, Error> {
        let namespace = self.namespace.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<(String, Option<i64>)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, request_headers_json FROM cache_entries WHERE namespace = ?1 ORDER BY url",
                )?;
                let markers = stmt
                    .query_map(params![namespace], |row| {
                        let headers = headers_column(row, 1)?;
                        let marker = headers.get(max_age::HEADER).and_then(|value| max_age::parse(value));
                        Ok((row.get(0)?, marker))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(markers)
            })
            .await
            .map_err(Error::from)
    }
}

fn insert_entry(conn: &rusqlite::Connection, namespace: &str, entry: &CacheEntry) -> Result<(), Error> {
    let request_headers =
        serde_json::to_string(&entry.request_headers).map_err(|e| Error::InvalidInput(e.to_string()))?;
    let response_headers =
        serde_json::to_string(&entry.response_headers).map_err(|e| Error::InvalidInput(e.to_string()))?;

    conn.execute(
        "INSERT OR IGNORE INTO cache_namespaces (name, created_at) VALUES (?1, ?2)",
        params![namespace, Utc::now().to_rfc3339()],
    )?;
    conn.execute(
        "INSERT INTO cache_entries (
            namespace, url, method, request_headers_json, status, status_text,
            response_headers_json, body, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(namespace, url) DO UPDATE SET
            method = excluded.method,
            request_headers_json = excluded.request_headers_json,
            status = excluded.status,
            status_text = excluded.status_text,
            response_headers_json = excluded.response_headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            namespace,
            &entry.url,
            &entry.method,
            request_headers,
            entry.status,
            &entry.status_text,
            response_headers,
            &entry.body,
            &entry.stored_at,
        ],
    )?;
    Ok(())
}

fn headers_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<BTreeMap<String, String>> {
    let json: String = row.get(idx)?;
    serde_json::from_str(&json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, body: &str) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            method: "GET".to_string(),
            request_headers: BTreeMap::new(),
            status: 200,
            status_text: "OK".to_string(),
            response_headers: BTreeMap::from([("content-type".to_string(), "text/plain".to_string())]),
            body: body.as_bytes().to_vec(),
            stored_at: Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.blob_cache("network-or-cache:1");
        let stored = entry("https://example.com/a.css", "body{}");

        cache.put(&stored).await.unwrap();

        let fetched = cache.get("https://example.com/a.css").await.unwrap();
        assert_eq!(fetched, stored);
    }

    #[tokio::test]
    async fn test_get_missing_is_cache_miss() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.blob_cache("network-or-cache:1");
        let result = cache.get("https://example.com/nope").await;
        assert!(matches!(result, Err(Error::CacheMiss(key)) if key == "https://example.com/nope"));
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.blob_cache("network-or-cache:1");

        cache.put(&entry("https://example.com/x", "old")).await.unwrap();
        cache.put(&entry("https://example.com/x", "new")).await.unwrap();

        assert_eq!(cache.keys().await.unwrap().len(), 1);
        assert_eq!(cache.get("https://example.com/x").await.unwrap().body, b"new".to_vec());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let v1 = db.blob_cache("network-or-cache:1");
        let v2 = db.blob_cache("network-or-cache:2");

        v1.put(&entry("https://example.com/x", "one")).await.unwrap();

        assert!(v2.get("https://example.com/x").await.is_err());
        assert_eq!(v1.keys().await.unwrap(), vec!["https://example.com/x".to_string()]);
        assert!(v2.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handle_does_not_create_namespace() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.blob_cache("network-or-cache:1");
        assert!(db.namespaces().await.unwrap().is_empty());

        cache.put(&entry("https://example.com/", "<html>")).await.unwrap();
        assert_eq!(db.namespaces().await.unwrap(), vec!["network-or-cache:1".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_namespace_drops_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let old = db.blob_cache("network-or-cache:0");
        old.put(&entry("https://example.com/a", "a")).await.unwrap();
        old.put(&entry("https://example.com/b", "b")).await.unwrap();

        assert!(db.delete_namespace("network-or-cache:0").await.unwrap());
        assert!(!db.delete_namespace("network-or-cache:0").await.unwrap());
        assert!(db.namespaces().await.unwrap().is_empty());
        assert!(old.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_all_and_delete() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.blob_cache("network-or-cache:1");
        let entries = vec![entry("https://example.com/b", "b"), entry("https://example.com/a", "a")];

        cache.put_all(&entries).await.unwrap();
        assert_eq!(
            cache.keys().await.unwrap(),
            vec!["https://example.com/a".to_string(), "https://example.com/b".to_string()]
        );

        assert!(cache.delete("https://example.com/a").await.unwrap());
        assert!(!cache.delete("https://example.com/a").await.unwrap());
        assert_eq!(cache.keys().await.unwrap(), vec!["https://example.com/b".to_string()]);
    }

    #[tokio::test]
    async fn test_max_age_markers() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let cache = db.blob_cache("network-or-cache:1");
        let mut api = entry("https://openlibrary.org/search.json?title=dune", "{}");
        api.request_headers.insert(max_age::HEADER.to_string(), max_age::marker(1234));

        cache.put(&api).await.unwrap();
        cache.put(&entry("https://example.com/", "<html>")).await.unwrap();

        let markers = cache.max_age_markers().await.unwrap();
        assert_eq!(
            markers,
            vec![
                ("https://example.com/".to_string(), None),
                ("https://openlibrary.org/search.json?title=dune".to_string(), Some(1234)),
            ]
        );
        assert_eq!(api.max_age(), Some(1234));
    }
}
