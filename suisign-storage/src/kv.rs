//! Injected key-value store interface and its backends.

use crate::error::{StorageError, StorageResult};
use chrono::Utc;
use duckdb::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use tracing::warn;

/// String key-value store the local projections persist through.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Returns every `(key, value)` whose key starts with `prefix`, ordered by key.
    fn list_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, String)>>;
}

// ============================================================================
// MemoryKvStore
// ============================================================================

/// Process-local store (tests, ephemeral sessions).
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Backend(format!("lock poisoned: {e}"))
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn list_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, String)>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

// ============================================================================
// DuckKvStore
// ============================================================================

/// DuckDB-backed store for persistent local state.
#[derive(Clone)]
pub struct DuckKvStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckKvStore {
    /// Opens or creates a store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = open_with_wal_recovery(path)?;
        // Cap memory/threads: DuckDB defaults to ~80% RAM per connection
        conn.execute_batch("PRAGMA memory_limit='64MB'; PRAGMA threads=1;")?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_entries (
                key VARCHAR PRIMARY KEY,
                value VARCHAR NOT NULL,
                updated_at BIGINT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(poisoned)
    }
}

/// Opens a DuckDB file, removing a stale WAL left by an unclean shutdown and retrying once.
fn open_with_wal_recovery(path: &Path) -> StorageResult<Connection> {
    match Connection::open(path) {
        Ok(conn) => Ok(conn),
        Err(first_err) => {
            let wal_path = path.with_extension(
                path.extension()
                    .map(|ext| format!("{}.wal", ext.to_string_lossy()))
                    .unwrap_or_else(|| "wal".to_string()),
            );
            if wal_path.exists() {
                warn!(
                    "DuckDB open failed, removing stale WAL and retrying: {}",
                    wal_path.display()
                );
                if std::fs::remove_file(&wal_path).is_ok() {
                    return Ok(Connection::open(path)?);
                }
            }
            Err(first_err.into())
        }
    }
}

impl KvStore for DuckKvStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT value FROM kv_entries WHERE key = ?")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv_entries (key, value, updated_at) VALUES (?, ?, ?)",
            params![key, value, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv_entries WHERE key = ?", params![key])?;
        Ok(())
    }

    fn list_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, String)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, value FROM kv_entries WHERE starts_with(key, ?) ORDER BY key",
        )?;
        let rows = stmt
            .query_map(params![prefix], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, String)>, _>>()?;
        Ok(rows)
    }
}
