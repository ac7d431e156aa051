//! SQLite-backed content store.
//!
//! Persists raw content and its put-time metadata to a local SQLite database.
//!
//! # Storage layout
//!
//! A single table `contents` is created (if it does not already exist) with
//! the following columns:
//!
//! | column     | type | description                                  |
//! |------------|------|----------------------------------------------|
//! | id         | TEXT | UUID v4 primary key                          |
//! | created_at | TEXT | RFC-3339 creation time (UTC)                 |
//! | kind       | TEXT | `"text"` or `"bytes"`                        |
//! | body       | BLOB | UTF-8 text or raw bytes                      |
//! | metadata   | TEXT | JSON object of string → string               |
//!
//! # Example
//!
//! ```rust
//! use reverie_memory::sqlite_store::SqliteStore;
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! assert_eq!(store.count().unwrap(), 0);
//! ```

use async_trait::async_trait;
use chrono::Utc;
use reverie_types::{Content, DatumId, Metadata};
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Mutex;

use crate::store::{ContentStore, StoreError};

/// SQLite-backed [`ContentStore`].
///
/// The connection sits behind a mutex; every call is a short synchronous
/// statement.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a persistent SQLite database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)?.execute_batch(
            "CREATE TABLE IF NOT EXISTS contents (
                id         TEXT NOT NULL PRIMARY KEY,
                created_at TEXT NOT NULL,
                kind       TEXT NOT NULL,
                body       BLOB NOT NULL,
                metadata   TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Number of stored rows.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM contents", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Metadata stored alongside `id`, or `None` if `id` is unknown.
    pub fn metadata(&self, id: &DatumId) -> Result<Option<Metadata>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT metadata FROM contents WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

fn encode(content: Content) -> (&'static str, Vec<u8>) {
    match content {
        Content::Text(s) => ("text", s.into_bytes()),
        Content::Bytes(b) => ("bytes", b),
    }
}

fn decode(kind: &str, body: Vec<u8>) -> Content {
    match kind {
        "text" => match String::from_utf8(body) {
            Ok(s) => Content::Text(s),
            Err(e) => Content::Bytes(e.into_bytes()),
        },
        _ => Content::Bytes(body),
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn put(&self, content: Content, metadata: &Metadata) -> Result<DatumId, StoreError> {
        let id = DatumId::generate();
        let (kind, body) = encode(content);
        let metadata_json = serde_json::to_string(metadata)?;
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO contents (id, created_at, kind, body, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id.as_str(), Utc::now().to_rfc3339(), kind, body, metadata_json],
        )?;
        Ok(id)
    }

    async fn get(&self, id: &DatumId) -> Result<Option<Content>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let row: Option<(String, Vec<u8>)> = conn
            .query_row(
                "SELECT kind, body FROM contents WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(kind, body)| decode(&kind, body)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
