//! SQLite Durable Store
//!
//! Embedded relational backing store for the durable tier. Every call runs
//! on the blocking thread pool against a single shared connection.
//!
//! Schema:
//! ```sql
//! CREATE TABLE cache_entries (
//!   key TEXT PRIMARY KEY,
//!   value BLOB NOT NULL,
//!   size INTEGER NOT NULL,
//!   expires_at INTEGER NOT NULL,
//!   created_at INTEGER NOT NULL,
//!   last_accessed_at INTEGER NOT NULL,
//!   hit_count INTEGER NOT NULL DEFAULT 0,
//!   namespace TEXT,
//!   compressed INTEGER NOT NULL DEFAULT 0
//! )
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::durable::{DiskUsage, DurableRow, DurableStore, StorageError};

/// Path value that selects a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    size INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    last_accessed_at INTEGER NOT NULL,
    hit_count INTEGER NOT NULL DEFAULT 0,
    namespace TEXT,
    compressed INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at ON cache_entries(expires_at);
CREATE INDEX IF NOT EXISTS idx_cache_entries_namespace ON cache_entries(namespace);
"#;

const UPSERT_SQL: &str = r#"
INSERT INTO cache_entries (
    key, value, size, expires_at, created_at, last_accessed_at, hit_count, namespace, compressed
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(key) DO UPDATE SET
    value = excluded.value,
    size = excluded.size,
    expires_at = excluded.expires_at,
    created_at = excluded.created_at,
    last_accessed_at = excluded.last_accessed_at,
    hit_count = excluded.hit_count,
    namespace = excluded.namespace,
    compressed = excluded.compressed
"#;

const GET_SQL: &str = r#"
SELECT key, value, size, expires_at, created_at, last_accessed_at, hit_count, namespace, compressed
FROM cache_entries WHERE key = ?1
"#;

const TOUCH_SQL: &str =
    "UPDATE cache_entries SET hit_count = hit_count + 1, last_accessed_at = ?2 WHERE key = ?1";
const DELETE_SQL: &str = "DELETE FROM cache_entries WHERE key = ?1";
const DELETE_EXPIRED_SQL: &str = "DELETE FROM cache_entries WHERE expires_at <= ?1 RETURNING key";
const DELETE_NAMESPACE_SQL: &str = "DELETE FROM cache_entries WHERE namespace = ?1 RETURNING key";
const CLEAR_SQL: &str = "DELETE FROM cache_entries";
const USAGE_SQL: &str = "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM cache_entries";

// == SQLite Store ==
/// SQLite-backed [`DurableStore`].
///
/// Statements are prepared once per connection through rusqlite's statement
/// cache and reused on every call.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) a file-backed store, or an in-memory one
    /// when `path` is `:memory:`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = if path.as_os_str() == IN_MEMORY_PATH {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Self::from_connection(conn)
    }

    /// Creates an in-memory store.
    pub fn memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> Result<(), StorageError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        // WAL for file-backed databases; in-memory ones keep their journal mode
        match conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        }) {
            Ok(mode) if mode.eq_ignore_ascii_case("wal") => {}
            Ok(mode) => debug!("Journal mode left as '{}'", mode),
            Err(e) => debug!("WAL journal mode not enabled: {}", e),
        }
        if let Err(e) = conn.pragma_update(None, "synchronous", "NORMAL") {
            debug!("Synchronous mode not changed: {}", e);
        }
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Runs `op` on the blocking pool with the connection locked.
    async fn run<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            op(&guard)
        })
        .await?
    }

    fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<DurableRow> {
        Ok(DurableRow {
            key: row.get(0)?,
            value: row.get(1)?,
            size: row.get::<_, i64>(2)? as usize,
            expires_at: row.get::<_, i64>(3)? as u64,
            created_at: row.get::<_, i64>(4)? as u64,
            last_accessed_at: row.get::<_, i64>(5)? as u64,
            hit_count: row.get::<_, i64>(6)? as u64,
            namespace: row.get(7)?,
            compressed: row.get(8)?,
        })
    }
}

/// Runs a `DELETE ... RETURNING key` statement and collects the removed keys.
fn delete_returning_keys(
    conn: &Connection,
    sql: &str,
    param: &dyn rusqlite::ToSql,
) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let keys = stmt
        .query_map(&[param], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(keys)
}

/// SQLite integers are signed; clamp timestamps that do not fit.
fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn upsert(&self, row: DurableRow) -> Result<(), StorageError> {
        self.run(move |conn| {
            conn.prepare_cached(UPSERT_SQL)?.execute(params![
                row.key,
                row.value,
                row.size as i64,
                to_sql_int(row.expires_at),
                to_sql_int(row.created_at),
                to_sql_int(row.last_accessed_at),
                to_sql_int(row.hit_count),
                row.namespace,
                row.compressed,
            ])?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<DurableRow>, StorageError> {
        let key = key.to_string();
        self.run(move |conn| {
            let row = conn
                .prepare_cached(GET_SQL)?
                .query_row(params![key], Self::row_to_entry)
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn touch_access(&self, key: &str, now: u64) -> Result<(), StorageError> {
        let key = key.to_string();
        self.run(move |conn| {
            conn.prepare_cached(TOUCH_SQL)?
                .execute(params![key, to_sql_int(now)])?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let key = key.to_string();
        self.run(move |conn| {
            let removed = conn.prepare_cached(DELETE_SQL)?.execute(params![key])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn delete_expired_before(&self, now: u64) -> Result<Vec<String>, StorageError> {
        let removed = self
            .run(move |conn| delete_returning_keys(conn, DELETE_EXPIRED_SQL, &to_sql_int(now)))
            .await?;
        debug!("Durable sweep removed {} expired rows", removed.len());
        Ok(removed)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        let namespace = namespace.to_string();
        self.run(move |conn| delete_returning_keys(conn, DELETE_NAMESPACE_SQL, &namespace))
            .await
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        self.run(|conn| {
            conn.prepare_cached(CLEAR_SQL)?.execute([])?;
            Ok(())
        })
        .await
    }

    async fn usage(&self) -> Result<DiskUsage, StorageError> {
        self.run(|conn| {
            let (entries, bytes) = conn.prepare_cached(USAGE_SQL)?.query_row([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?;
            Ok(DiskUsage {
                entries: entries as u64,
                bytes: bytes as u64,
            })
        })
        .await
    }
}
