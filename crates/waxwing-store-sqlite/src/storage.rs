use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use waxwing_store::{CompletionStore, DEFAULT_MARKER_KEY};

/// One recorded `set_marker` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkerRecord {
    pub version: String,
    pub recorded_at_unix: i64,
}

/// Durable completion store backed by a sqlite file.
///
/// The current marker lives in `markers` under a fixed key; every write is
/// also appended to `marker_history`, which this crate never prunes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    key: String,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::open_with_key(db_path, DEFAULT_MARKER_KEY)
    }

    pub fn open_with_key(db_path: &Path, key: impl Into<String>) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        Self::init(conn, key.into())
    }

    /// Non-durable variant, handy for tests that want the sql path without a file.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, DEFAULT_MARKER_KEY.to_string())
    }

    fn init(conn: Connection, key: String) -> Result<Self> {
        let init_sql = include_str!("../migrations/0001_init.sql");
        conn.execute_batch(init_sql).context("init marker schema")?;
        Ok(Self { conn: Mutex::new(conn), key })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Marker writes under this store's key, oldest first.
    pub fn history(&self) -> Result<Vec<MarkerRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT version, recorded_at FROM marker_history WHERE key=?1 ORDER BY id")?;
        let rows = stmt.query_map(params![self.key], |r| {
            Ok(MarkerRecord { version: r.get(0)?, recorded_at_unix: r.get(1)? })
        })?;
        let mut history = vec![];
        for row in rows {
            history.push(row?);
        }
        Ok(history)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }
}

impl CompletionStore for SqliteStore {
    fn get_marker(&self) -> Result<Option<String>> {
        let conn = self.lock()?;
        let version = conn
            .query_row("SELECT version FROM markers WHERE key=?1", params![self.key], |r| r.get(0))
            .optional()
            .with_context(|| format!("read marker {}", self.key))?;
        Ok(version)
    }

    fn set_marker(&self, version: &str) -> Result<()> {
        let conn = self.lock()?;
        let now = now_unix();

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO markers(key, version, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET version=excluded.version, updated_at=excluded.updated_at",
            params![self.key, version, now],
        )?;
        tx.execute(
            "INSERT INTO marker_history(key, version, recorded_at) VALUES (?1, ?2, ?3)",
            params![self.key, version, now],
        )?;
        tx.commit().with_context(|| format!("write marker {}", self.key))?;

        debug!(key = %self.key, version, "marker recorded");
        Ok(())
    }
}

pub fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
