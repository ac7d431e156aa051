//! Similarity Index.
//!
//! An ordered, in-memory collection of [`Memory`] values keyed by
//! [`DatumId`], supporting replace-by-key updates and ranked cosine-similarity
//! queries.
//!
//! # Query algorithm
//!
//! [`SimilarityIndex::query`] is a linear scan: every entry whose lifecycle is
//! not excluded is scored against the query vector, entries scoring below the
//! threshold are dropped, the rest are sorted by descending similarity and
//! truncated.  Ties are broken by ascending `DatumId`, so two identical
//! queries over the same index always return the same order.
//!
//! O(n·d) per query, fine up to a few thousand entries.
//!
//! # Example
//!
//! ```rust
//! use reverie_memory::index::SimilarityIndex;
//! use reverie_types::{DatumId, Lifecycle, Memory};
//!
//! let mut index = SimilarityIndex::new();
//! index.upsert(Memory::create(DatumId::from("near"), vec![1.0, 0.0]));
//! index.upsert(Memory::create(DatumId::from("far"), vec![0.0, 1.0]));
//!
//! let hits = index.query(&[1.0, 0.0], 0.5, 5, &[Lifecycle::Dreaming]);
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].0.datum_id().as_str(), "near");
//! ```

use reverie_types::{DatumId, Lifecycle, Memory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimilarityIndex {
    entries: BTreeMap<DatumId, Memory>,
}

impl SimilarityIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `memory`, replacing any existing entry with the same id.
    ///
    /// Returns the replaced value, if any.
    pub fn upsert(&mut self, memory: Memory) -> Option<Memory> {
        self.entries.insert(memory.datum_id().clone(), memory)
    }

    /// Drop the entry under `id`, returning it.
    pub fn remove(&mut self, id: &DatumId) -> Option<Memory> {
        self.entries.remove(id)
    }

    /// The entry under `id`, if indexed.
    pub fn get(&self, id: &DatumId) -> Option<&Memory> {
        self.entries.get(id)
    }

    /// `true` if `id` is indexed, in any state.
    pub fn contains(&self, id: &DatumId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of entries, COMPOSTING included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Memory> {
        self.entries.values()
    }

    /// Ids of every entry currently in `state`, in ascending order.
    pub fn ids_in(&self, state: Lifecycle) -> Vec<DatumId> {
        self.entries
            .values()
            .filter(|m| m.lifecycle() == state)
            .map(|m| m.datum_id().clone())
            .collect()
    }

    /// Replace the entry under `id` with `f(entry)`.
    ///
    /// Returns `false` when `id` is absent.
    pub fn replace_with<F>(&mut self, id: &DatumId, f: F) -> bool
    where
        F: FnOnce(&Memory) -> Memory,
    {
        match self.entries.get_mut(id) {
            Some(slot) => {
                *slot = f(slot);
                true
            }
            None => false,
        }
    }

    /// Return up to `limit` entries whose similarity to `vector` is at least
    /// `threshold`, best match first.  Entries in any `exclude` state are
    /// never scored.
    pub fn query(
        &self,
        vector: &[f32],
        threshold: f32,
        limit: usize,
        exclude: &[Lifecycle],
    ) -> Vec<(&Memory, f32)> {
        if limit == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(&Memory, f32)> = self
            .entries
            .values()
            .filter(|m| !exclude.contains(&m.lifecycle()))
            .map(|m| (m, m.similarity(vector)))
            .filter(|(_, score)| *score >= threshold)
            .collect();
        // Entries arrive in id order; a stable sort keeps that as the tie-break.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(limit);
        scored
    }

    /// Consume the index, returning every entry in ascending id order.
    pub fn into_memories(self) -> Vec<Memory> {
        self.entries.into_values().collect()
    }
}

impl FromIterator<Memory> for SimilarityIndex {
    fn from_iter<I: IntoIterator<Item = Memory>>(iter: I) -> Self {
        let mut index = SimilarityIndex::new();
        for m in iter {
            index.upsert(m);
        }
        index
    }
}
