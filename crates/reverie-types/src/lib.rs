//! `reverie-types` – shared vocabulary for the Reverie memory store.
//!
//! # Modules
//!
//! - [`lifecycle`] – [`Lifecycle`]: the four availability states a memory
//!   moves through, and the transition table that governs them.
//! - [`memory`] – [`Memory`]: one semantically-indexed record.  Immutable;
//!   every transition returns a new value.

pub mod lifecycle;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub use lifecycle::{Lifecycle, Trigger};
pub use memory::{CHERISHED_KEY, Memory};

/// String-to-string annotations carried by every memory.
///
/// An ordered map so snapshots serialise deterministically.
pub type Metadata = BTreeMap<String, String>;

/// Opaque, stable reference to raw content held by an external store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatumId(String);

impl DatumId {
    /// Wrap an id handed out by a content store.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random (UUID v4) id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DatumId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DatumId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Raw content handed to, or fetched from, a content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
}

impl Content {
    /// Text used to compute an embedding.  Byte content is decoded lossily.
    pub fn to_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Content::Text(s) => s.len(),
            Content::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<Vec<u8>> for Content {
    fn from(b: Vec<u8>) -> Self {
        Content::Bytes(b)
    }
}

impl From<&[u8]> for Content {
    fn from(b: &[u8]) -> Self {
        Content::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Content {
    fn from(b: &[u8; N]) -> Self {
        Content::Bytes(b.to_vec())
    }
}

/// Compute the cosine similarity between two vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` if the vectors differ in length,
/// are empty, or either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// Summary of one consolidation ("sleep") cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Memories pulled from DORMANT into DREAMING at cycle start.
    pub dreaming_count: usize,
    /// Memories whose decayed relevance fell below the demotion threshold.
    pub demoted_count: usize,
    /// Near-duplicate memories composted in favour of a survivor.
    pub merged_count: usize,
    /// Frequently accessed memories given a relevance boost.
    pub strengthened_count: usize,
    /// COMPOSTING memories whose resolution was reduced.
    pub degraded_count: usize,
    /// Memories returned from DREAMING to DORMANT at cycle end.
    pub woken_count: usize,
    /// Wall-clock time the cycle took.
    pub duration: Duration,
}

/// Point-in-time counts and averages over the whole index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStatus {
    pub total: usize,
    pub active: usize,
    pub dormant: usize,
    pub dreaming: usize,
    pub composting: usize,
    pub cherished: usize,
    /// Mean resolution, `0.0` for an empty index.
    pub average_resolution: f32,
    /// Mean relevance, `0.0` for an empty index.
    pub average_relevance: f32,
    pub is_consolidating: bool,
}

impl MemoryStatus {
    /// Count for a single lifecycle state.
    pub fn count(&self, state: Lifecycle) -> usize {
        match state {
            Lifecycle::Active => self.active,
            Lifecycle::Dormant => self.dormant,
            Lifecycle::Dreaming => self.dreaming,
            Lifecycle::Composting => self.composting,
        }
    }
}

/// Faults surfaced from collaborator I/O.
///
/// Expected outcomes (unknown id, cherished refusal, dimension mismatch) are
/// never errors; they are reported as `false`, `None`, or `0.0`.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum ReverieError {
    #[error("Content store failure: {0}")]
    ContentStore(String),

    #[error("Embedder failure: {0}")]
    Embedder(String),
}
