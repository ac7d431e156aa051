//! [`AssociativeMemory`] – the façade.
//!
//! Owns the [`SimilarityIndex`] and the two collaborators (a
//! [`ContentStore`] and an [`Embedder`]) and exposes the primitives callers
//! use: remember, recall, forget, cherish, consolidate, wake, status and
//! by-lifecycle listing.
//!
//! # Concurrency
//!
//! The index is the only mutable shared state and sits behind a
//! [`tokio::sync::RwLock`].  The lock is never held across a collaborator
//! call, so a slow store or embedder stalls only its own operation.
//!
//! [`consolidate`][AssociativeMemory::consolidate] takes the write lock once
//! per phase and yields between phases, so `remember`, `recall` and `forget`
//! interleave with a running cycle.  That is safe because recall never
//! searches DREAMING memories: everything a cycle is working on is invisible
//! until [`wake`][AssociativeMemory::wake].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use reverie_memory::{AssociativeMemory, HashEmbedder, InMemoryStore};
//! use reverie_types::Metadata;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let memory = AssociativeMemory::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(HashEmbedder::default()),
//! );
//! let id = memory.remember("Python is great", None, Metadata::new()).await.unwrap();
//! let hits = memory.recall("Python is great", 1, 0.9).await.unwrap();
//! assert_eq!(hits[0].memory.datum_id(), &id);
//! # });
//! ```

use reverie_types::{
    ConsolidationReport, Content, DatumId, Lifecycle, Memory, MemoryStatus, Metadata,
    ReverieError, Trigger,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::consolidation::{ConsolidationConfig, ConsolidationEngine};
use crate::embedder::Embedder;
use crate::index::SimilarityIndex;
use crate::store::ContentStore;

/// Default number of recall results.
pub const DEFAULT_RECALL_LIMIT: usize = 5;
/// Default minimum similarity for a recall hit.
pub const DEFAULT_RECALL_THRESHOLD: f32 = 0.5;

/// States recall never searches.
const RECALL_EXCLUDES: &[Lifecycle] = &[Lifecycle::Dreaming];

/// What to recall by: text (embedded first) or a ready-made vector.
#[derive(Debug, Clone, PartialEq)]
pub enum Cue {
    Text(String),
    Vector(Vec<f32>),
}

impl From<&str> for Cue {
    fn from(s: &str) -> Self {
        Cue::Text(s.to_string())
    }
}

impl From<String> for Cue {
    fn from(s: String) -> Self {
        Cue::Text(s)
    }
}

impl From<Vec<f32>> for Cue {
    fn from(v: Vec<f32>) -> Self {
        Cue::Vector(v)
    }
}

/// One recall result.
#[derive(Debug, Clone)]
pub struct RecallHit {
    /// The memory after activation.
    pub memory: Memory,
    /// Cosine similarity between the cue and the memory.
    pub similarity: f32,
    /// Raw content, or `None` when the store did not return it.
    pub content: Option<Content>,
}

pub struct AssociativeMemory {
    index: RwLock<SimilarityIndex>,
    store: Arc<dyn ContentStore>,
    embedder: Arc<dyn Embedder>,
    engine: ConsolidationEngine,
    consolidating: AtomicBool,
    cycle: Mutex<()>,
}

impl AssociativeMemory {
    /// Create an empty memory with the default [`ConsolidationConfig`].
    pub fn new(store: Arc<dyn ContentStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self::with_config(store, embedder, ConsolidationConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn ContentStore>,
        embedder: Arc<dyn Embedder>,
        config: ConsolidationConfig,
    ) -> Self {
        Self {
            index: RwLock::new(SimilarityIndex::new()),
            store,
            embedder,
            engine: ConsolidationEngine::new(config),
            consolidating: AtomicBool::new(false),
            cycle: Mutex::new(()),
        }
    }

    pub fn consolidation_config(&self) -> &ConsolidationConfig {
        self.engine.config()
    }

    // ── remember / recall ────────────────────────────────────────────────────

    /// Store `content` and index it as a new ACTIVE memory.
    ///
    /// `embedding` is computed from the content when not supplied.  Nothing is
    /// indexed if the embedder or store fails.  Identical content remembered
    /// twice yields two memories; the merge phase reconciles them later.
    pub async fn remember(
        &self,
        content: impl Into<Content>,
        embedding: Option<Vec<f32>>,
        metadata: Metadata,
    ) -> Result<DatumId, ReverieError> {
        let content = content.into();
        let embedding = match embedding {
            Some(e) => e,
            None => self.embedder.embed(&content.to_text()).await?,
        };
        let id = self.store.put(content, &metadata).await?;
        let memory = Memory::create(id.clone(), embedding).with_metadata(metadata);
        self.index.write().await.upsert(memory);
        debug!(datum_id = %id, "remembered");
        Ok(id)
    }

    /// Return up to `limit` memories whose similarity to `cue` is at least
    /// `threshold`, best first (ties by ascending id).
    ///
    /// Every hit is activated before it is returned.  Content is fetched on a
    /// best-effort basis; a store failure leaves `content` as `None`.
    pub async fn recall(
        &self,
        cue: impl Into<Cue>,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<RecallHit>, ReverieError> {
        let vector = match cue.into() {
            Cue::Text(text) => self.embedder.embed(&text).await?,
            Cue::Vector(v) => v,
        };

        let activated: Vec<(Memory, f32)> = {
            let mut index = self.index.write().await;
            let ranked: Vec<(DatumId, f32)> = index
                .query(&vector, threshold, limit, RECALL_EXCLUDES)
                .into_iter()
                .map(|(m, score)| (m.datum_id().clone(), score))
                .collect();
            ranked
                .into_iter()
                .filter_map(|(id, score)| {
                    let memory = index.get(&id)?.activate();
                    index.upsert(memory.clone());
                    Some((memory, score))
                })
                .collect()
        };

        let mut hits = Vec::with_capacity(activated.len());
        for (memory, similarity) in activated {
            let content = match self.store.get(memory.datum_id()).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(datum_id = %memory.datum_id(), error = %e, "content fetch failed during recall");
                    None
                }
            };
            hits.push(RecallHit {
                memory,
                similarity,
                content,
            });
        }
        debug!(hits = hits.len(), "recall complete");
        Ok(hits)
    }

    // ── explicit transitions ─────────────────────────────────────────────────

    /// Move `id` to COMPOSTING.  `false` if unknown or cherished.
    pub async fn forget(&self, id: &DatumId) -> bool {
        let mut index = self.index.write().await;
        let Some(composted) = index.get(id).and_then(Memory::compost) else {
            return false;
        };
        index.upsert(composted);
        debug!(datum_id = %id, "forgotten");
        true
    }

    /// Permanently protect `id`.  `false` if unknown.
    pub async fn cherish(&self, id: &DatumId) -> bool {
        let cherished = self.index.write().await.replace_with(id, Memory::cherish);
        if cherished {
            info!(datum_id = %id, "cherished");
        }
        cherished
    }

    /// ACTIVE to DORMANT.  `false` if unknown or not ACTIVE.
    pub async fn deactivate(&self, id: &DatumId) -> bool {
        let mut index = self.index.write().await;
        let Some(dormant) = index.get(id).and_then(|m| m.transition(Trigger::Deactivate)) else {
            return false;
        };
        index.upsert(dormant);
        true
    }

    /// Move every ACTIVE memory untouched for `timeout` to DORMANT.  Returns
    /// the number moved.
    pub async fn deactivate_idle(&self, timeout: Duration) -> usize {
        let Ok(timeout) = chrono::Duration::from_std(timeout) else {
            return 0;
        };
        let now = chrono::Utc::now();
        let mut index = self.index.write().await;
        let idle: Vec<Memory> = index
            .iter()
            .filter(|m| m.is_idle(now, timeout))
            .filter_map(|m| m.transition(Trigger::Idle))
            .collect();
        let count = idle.len();
        for m in idle {
            index.upsert(m);
        }
        if count > 0 {
            debug!(count, "idle memories went dormant");
        }
        count
    }

    /// Overlay `updates` onto the metadata of `id`.  `false` if unknown.
    pub async fn update_metadata(&self, id: &DatumId, updates: &Metadata) -> bool {
        self.index
            .write()
            .await
            .replace_with(id, |m| m.with_metadata_merged(updates))
    }

    /// Reduce the resolution of `id` by `factor`.  `false` if unknown.
    pub async fn degrade(&self, id: &DatumId, factor: f32) -> bool {
        self.index
            .write()
            .await
            .replace_with(id, |m| m.degrade(factor))
    }

    // ── consolidation ────────────────────────────────────────────────────────

    /// Run one consolidation cycle over the whole index.
    ///
    /// Cycles never overlap; a second caller waits for the first to finish.
    pub async fn consolidate(&self) -> ConsolidationReport {
        let _cycle = self.cycle.lock().await;
        let _flag = ConsolidatingFlag::raise(&self.consolidating);
        let started = Instant::now();

        let mut report = ConsolidationReport {
            dreaming_count: self.phase(ConsolidationEngine::enter_dreaming).await,
            ..Default::default()
        };
        report.demoted_count = self.phase(ConsolidationEngine::decay_and_demote).await;
        report.merged_count = self.phase(ConsolidationEngine::merge).await;
        report.strengthened_count = self.phase(ConsolidationEngine::strengthen).await;
        report.degraded_count = self.phase(ConsolidationEngine::degrade_composting).await;
        report.woken_count = self.phase(ConsolidationEngine::wake_all).await;
        report.duration = started.elapsed();

        info!(
            dreaming = report.dreaming_count,
            demoted = report.demoted_count,
            merged = report.merged_count,
            strengthened = report.strengthened_count,
            degraded = report.degraded_count,
            duration_ms = report.duration.as_millis() as u64,
            "consolidation cycle complete"
        );
        report
    }

    async fn phase<F>(&self, f: F) -> usize
    where
        F: FnOnce(&ConsolidationEngine, &mut SimilarityIndex) -> usize,
    {
        let n = {
            let mut index = self.index.write().await;
            f(&self.engine, &mut *index)
        };
        tokio::task::yield_now().await;
        n
    }

    /// Force every DREAMING memory back to DORMANT.
    ///
    /// Idempotent; aborts the remainder of an in-flight cycle for the
    /// memories it wakes.
    pub async fn wake(&self) -> usize {
        let woken = self.engine.wake_all(&mut *self.index.write().await);
        if woken > 0 {
            info!(woken, "forced wake");
        }
        woken
    }

    pub fn is_consolidating(&self) -> bool {
        self.consolidating.load(Ordering::SeqCst)
    }

    // ── inspection ───────────────────────────────────────────────────────────

    pub async fn status(&self) -> MemoryStatus {
        let index = self.index.read().await;
        let mut status = MemoryStatus {
            total: index.len(),
            is_consolidating: self.is_consolidating(),
            ..Default::default()
        };
        let mut resolution_sum = 0.0f64;
        let mut relevance_sum = 0.0f64;
        for m in index.iter() {
            match m.lifecycle() {
                Lifecycle::Active => status.active += 1,
                Lifecycle::Dormant => status.dormant += 1,
                Lifecycle::Dreaming => status.dreaming += 1,
                Lifecycle::Composting => status.composting += 1,
            }
            if m.is_cherished() {
                status.cherished += 1;
            }
            resolution_sum += f64::from(m.resolution());
            relevance_sum += f64::from(m.relevance());
        }
        if status.total > 0 {
            status.average_resolution = (resolution_sum / status.total as f64) as f32;
            status.average_relevance = (relevance_sum / status.total as f64) as f32;
        }
        status
    }

    /// Every memory currently in `state`, in ascending id order.
    pub async fn by_lifecycle(&self, state: Lifecycle) -> Vec<Memory> {
        self.index
            .read()
            .await
            .iter()
            .filter(|m| m.lifecycle() == state)
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &DatumId) -> Option<Memory> {
        self.index.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    // ── snapshots ────────────────────────────────────────────────────────────

    /// Every memory in ascending id order, for persistence by the caller.
    pub async fn snapshot(&self) -> Vec<Memory> {
        self.index.read().await.iter().cloned().collect()
    }

    /// Replace the whole index with `memories`.  Anything captured mid-cycle
    /// in DREAMING comes back DORMANT.
    pub async fn restore(&self, memories: Vec<Memory>) {
        let restored: SimilarityIndex = memories.iter().map(Memory::wake).collect();
        info!(count = restored.len(), "index restored");
        *self.index.write().await = restored;
    }
}

/// Holds `is_consolidating` high for the lifetime of a cycle, including one
/// whose future is dropped part-way.
struct ConsolidatingFlag<'a>(&'a AtomicBool);

impl<'a> ConsolidatingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ConsolidatingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
