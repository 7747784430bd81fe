use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

use super::KeyValueStore;
use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::state::data::now_millis;

/// SQLite-backed durable store.
///
/// All values live in a single `kv` table. Writes are checked against a byte
/// quota so the store fails the same way a full browser storage area does.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    quota_bytes: u64,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    ///
    /// The parent directory is created when missing.
    pub fn open(path: impl AsRef<Path>, quota_bytes: u64) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        info!("📁 Database initialized at: {}", path.display());

        let store = SqliteStore {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
            quota_bytes,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open the store described by `config`
    pub fn open_default(config: &Config) -> Result<Self> {
        Self::open(config.database_path(), config.storage_quota_bytes)
    }

    /// Private in-memory database (tests and dry runs)
    pub fn in_memory(quota_bytes: u64) -> Result<Self> {
        let store = SqliteStore {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: None,
            quota_bytes,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // Statements run to completion under the lock, so a poisoned guard is still consistent
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize the database schema.
    /// Creates the key-value table if it doesn't exist.
    fn init_schema(&self) -> Result<()> {
        self.conn().execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL,
                updated_at      INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Path to the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Bytes currently stored (keys plus values)
    pub fn used_bytes(&self) -> Result<u64> {
        self.used_bytes_excluding(None)
    }

    fn used_bytes_excluding(&self, key: Option<&str>) -> Result<u64> {
        let used: i64 = self.conn().query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
             FROM kv WHERE ?1 IS NULL OR key != ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(used.max(0) as u64)
    }

    /// Every stored key, sorted
    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let needed = (key.len() + value.len()) as u64;
        let used = self.used_bytes_excluding(Some(key))?;
        if used + needed > self.quota_bytes {
            return Err(SessionError::QuotaExceeded { key: key.to_string() });
        }

        self.conn()
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now_millis()],
            )
            .map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::DiskFull) => SessionError::QuotaExceeded { key: key.to_string() },
                _ => SessionError::Storage(e),
            })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn().execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}
