//! Blob cache schema migrations.
//!
//! Applied versions are recorded in `_migrations`; each pending batch runs in
//! its own transaction together with its version row.

use chrono::Utc;
use tokio_rusqlite::{Connection, params};

use super::Error;

/// Ordered `(version, SQL)` batches.
///
/// Book tables are not listed here: the record store owns its schema and
/// upgrades it from [`crate::BookStore::init`].
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../migrations/001_blob_cache.sql")),
    (2, include_str!("../../migrations/002_store_versions.sql")),
];

/// Apply every migration newer than the recorded version.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` if a batch fails; that batch leaves no
/// partial schema behind.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )?;
        let current: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for &(version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(version, "applied migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_create_cache_tables_only() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();

        let tables: Vec<String> = conn
            .call(|conn| -> Result<Vec<String>, tokio_rusqlite::rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
                let names = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .unwrap();

        assert!(tables.contains(&"cache_namespaces".to_string()));
        assert!(tables.contains(&"cache_entries".to_string()));
        assert!(tables.contains(&"_store_versions".to_string()));
        assert!(!tables.contains(&"books".to_string()));
    }

    #[tokio::test]
    async fn test_rerun_records_each_version_once() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let versions: Vec<i64> = conn
            .call(|conn| -> Result<Vec<i64>, tokio_rusqlite::rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT version FROM _migrations ORDER BY version")?;
                let versions = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<i64>, _>>()?;
                Ok(versions)
            })
            .await
            .unwrap();

        assert_eq!(versions, vec![1, 2]);
    }
}
