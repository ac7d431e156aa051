//! Content store collaborator.
//!
//! Reverie never holds raw content itself.  Every memory refers to a datum in
//! a [`ContentStore`] by its [`DatumId`]; recall fetches the content back on a
//! best-effort basis.
//!
//! - [`ContentStore`] – the trait every store must implement.
//! - [`InMemoryStore`] – a process-local map, for tests and ephemeral use.
//! - [`SqliteStore`][crate::sqlite_store::SqliteStore] – a persistent store
//!   backed by a local SQLite file.

use async_trait::async_trait;
use reverie_types::{Content, DatumId, Metadata, ReverieError};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Errors that can arise from content store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Metadata encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Store lock poisoned")]
    Poisoned,
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for ReverieError {
    fn from(e: StoreError) -> Self {
        ReverieError::ContentStore(e.to_string())
    }
}

/// An append-mostly, id-addressed byte store.
///
/// # Contract
///
/// * `put` – persist `content` and return a fresh id.  Storing the same
///   content twice yields two ids; deduplication is the consolidation
///   engine's job, not the store's.
/// * `get` – return the content for `id`, or `Ok(None)` when it is unknown.
///   Absence is not an error.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put(&self, content: Content, metadata: &Metadata) -> Result<DatumId, StoreError>;

    async fn get(&self, id: &DatumId) -> Result<Option<Content>, StoreError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// InMemoryStore
// ─────────────────────────────────────────────────────────────────────────────

/// A [`ContentStore`] kept entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: RwLock<HashMap<DatumId, (Content, Metadata)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metadata recorded alongside `id` at `put` time.
    pub fn metadata(&self, id: &DatumId) -> Option<Metadata> {
        self.items
            .read()
            .ok()
            .and_then(|m| m.get(id).map(|(_, md)| md.clone()))
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn put(&self, content: Content, metadata: &Metadata) -> Result<DatumId, StoreError> {
        let id = DatumId::generate();
        self.items
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert(id.clone(), (content, metadata.clone()));
        Ok(id)
    }

    async fn get(&self, id: &DatumId) -> Result<Option<Content>, StoreError> {
        Ok(self
            .items
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .get(id)
            .map(|(c, _)| c.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get() {
        let store = InMemoryStore::new();
        let id = store.put(Content::from("hello"), &Metadata::new()).await.unwrap();
        let back = store.get(&id).await.unwrap();
        assert_eq!(back, Some(Content::from("hello")));
    }

    #[tokio::test]
    async fn get_unknown_is_none() {
        let store = InMemoryStore::new();
        assert_eq!(store.get(&DatumId::from("nope")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn identical_content_gets_distinct_ids() {
        let store = InMemoryStore::new();
        let a = store.put(Content::from("same"), &Metadata::new()).await.unwrap();
        let b = store.put(Content::from("same"), &Metadata::new()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn metadata_is_recorded() {
        let store = InMemoryStore::new();
        let mut md = Metadata::new();
        md.insert("lang".into(), "en".into());
        let id = store.put(Content::from("x"), &md).await.unwrap();
        assert_eq!(store.metadata(&id).unwrap().get("lang").unwrap(), "en");
    }

    #[test]
    fn store_error_converts_to_reverie_error() {
        let err: ReverieError = StoreError::Unavailable("disk gone".into()).into();
        assert!(matches!(err, ReverieError::ContentStore(ref s) if s.contains("disk gone")));
    }
}
