//! AnchorStore - durable name-keyed anchor blob cache
//!
//! Stores serialized spatial-anchor payloads under their minted names so a
//! participant can re-attach to a known anchor without a network fetch.
//! Backed by a single SQLite table; callers share the store behind an `Arc`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::debug;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Default on-disk location for the anchor cache
/// (XDG data dir, ~/.local/share/anchorsync/anchors.db on Linux)
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("anchorsync")
        .join("anchors.db")
}

/// Metadata for one cached anchor payload
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnchorEntry {
    /// Minted anchor name (UUID string)
    pub name: String,
    /// Payload size in bytes
    pub size: usize,
    /// When the payload was cached
    pub created_at: DateTime<Utc>,
}

/// Name-keyed blob store for serialized anchor payloads
///
/// All operations are synchronous and cheap (single-row SQLite statements);
/// the coordinator calls them inline from its event loop.
pub struct AnchorStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for AnchorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorStore").finish_non_exhaustive()
    }
}

impl AnchorStore {
    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        debug!(path = %path.display(), "AnchorStore::open: opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an ephemeral in-memory store (tests, loopback runs)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS anchors (
                name       TEXT PRIMARY KEY,
                payload    BLOB NOT NULL,
                created_at TEXT NOT NULL
            )",
        )?;
        Ok(())
    }

    fn conn(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Save a payload under a name, replacing any previous payload
    pub fn save(&self, name: &str, payload: &[u8]) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO anchors (name, payload, created_at) VALUES (?1, ?2, ?3)",
            params![name, payload, Utc::now().to_rfc3339()],
        )?;
        debug!(name, size = payload.len(), "AnchorStore::save: saved");
        Ok(())
    }

    /// Load the payload stored under a name
    pub fn load(&self, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.conn()?;
        let payload = conn
            .query_row("SELECT payload FROM anchors WHERE name = ?1", params![name], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(payload)
    }

    /// Check whether a name is present
    pub fn contains(&self, name: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM anchors WHERE name = ?1", params![name], |row| {
            row.get(0)
        })?;
        Ok(count > 0)
    }

    /// All stored anchor names, oldest first
    pub fn names(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM anchors ORDER BY created_at, name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// All entries with metadata, oldest first
    pub fn entries(&self) -> StoreResult<Vec<AnchorEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, LENGTH(payload), created_at FROM anchors ORDER BY created_at, name")?;
        let entries = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let size: i64 = row.get(1)?;
                let created_at: String = row.get(2)?;
                Ok((name, size, created_at))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries
            .into_iter()
            .map(|(name, size, created_at)| AnchorEntry {
                name,
                size: size as usize,
                created_at: created_at
                    .parse::<DateTime<Utc>>()
                    .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC),
            })
            .collect())
    }

    /// Remove one entry; returns whether it existed
    pub fn remove(&self, name: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM anchors WHERE name = ?1", params![name])?;
        Ok(removed > 0)
    }

    /// Remove every entry; returns how many were removed
    pub fn clear(&self) -> StoreResult<usize> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM anchors", [])?;
        debug!(removed, "AnchorStore::clear: cleared");
        Ok(removed)
    }

    /// Number of stored entries
    pub fn len(&self) -> StoreResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM anchors", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_roundtrip() {
        let store = AnchorStore::open_in_memory().unwrap();

        store.save("anchor-1", b"payload bytes").unwrap();

        let loaded = store.load("anchor-1").unwrap();
        assert_eq!(loaded, Some(b"payload bytes".to_vec()));
        assert!(store.contains("anchor-1").unwrap());
    }

    #[test]
    fn test_load_missing_returns_none() {
        let store = AnchorStore::open_in_memory().unwrap();
        assert_eq!(store.load("nope").unwrap(), None);
        assert!(!store.contains("nope").unwrap());
    }

    #[test]
    fn test_save_replaces_existing() {
        let store = AnchorStore::open_in_memory().unwrap();

        store.save("anchor-1", b"old").unwrap();
        store.save("anchor-1", b"new").unwrap();

        assert_eq!(store.load("anchor-1").unwrap(), Some(b"new".to_vec()));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_clear_removes_everything() {
        let store = AnchorStore::open_in_memory().unwrap();

        store.save("a", b"1").unwrap();
        store.save("b", b"2").unwrap();
        assert_eq!(store.len().unwrap(), 2);

        let removed = store.clear().unwrap();
        assert_eq!(removed, 2);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_remove_single_entry() {
        let store = AnchorStore::open_in_memory().unwrap();

        store.save("a", b"1").unwrap();
        store.save("b", b"2").unwrap();

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert_eq!(store.names().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("anchors.db");

        {
            let store = AnchorStore::open(&path).unwrap();
            store.save("persisted", &vec![7u8; 1024]).unwrap();
        }

        let store = AnchorStore::open(&path).unwrap();
        assert_eq!(store.load("persisted").unwrap(), Some(vec![7u8; 1024]));
    }

    #[test]
    fn test_entries_report_size() {
        let store = AnchorStore::open_in_memory().unwrap();
        store.save("big", &vec![0u8; 4096]).unwrap();

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "big");
        assert_eq!(entries[0].size, 4096);
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("anchors.db");

        let store = AnchorStore::open(&path).unwrap();
        store.save("x", b"y").unwrap();
        assert!(path.exists());
    }
}
