//! Consolidation Engine ("sleep cycle").
//!
//! A batch pass over the whole [`SimilarityIndex`] that ages memories the way
//! sleep ages human ones: idle memories are pulled offline, weak ones are
//! demoted to COMPOSTING, near-duplicates are merged, frequently used ones are
//! strengthened, and everything already composting loses a little more
//! resolution.
//!
//! ## Phases
//!
//! | # | Phase | Effect |
//! |---|---|---|
//! | 1 | [`enter_dreaming`][ConsolidationEngine::enter_dreaming] | DORMANT → DREAMING |
//! | 2 | [`decay_and_demote`][ConsolidationEngine::decay_and_demote] | `relevance *= relevance_decay`; below `demote_threshold` → COMPOSTING |
//! | 3 | [`merge`][ConsolidationEngine::merge] | pairs with similarity ≥ `merge_threshold`: survivor reinforced, loser → COMPOSTING |
//! | 4 | [`strengthen`][ConsolidationEngine::strengthen] | `access_count ≥ strengthen_min_access` → relevance boost |
//! | 5 | [`degrade_composting`][ConsolidationEngine::degrade_composting] | `resolution *= resolution_decay`, floored at `min_resolution` |
//! | 6 | [`wake_all`][ConsolidationEngine::wake_all] | DREAMING → DORMANT |
//!
//! Phases 3 and 4 are gated by `merge_enabled` / `strengthen_enabled`.
//! Cherished memories are skipped by every phase.  No single entry can abort
//! the cycle: a transition the lifecycle table rejects leaves the entry as it
//! was.
//!
//! Recall never searches DREAMING entries, so a caller interleaving recalls
//! with these phases never sees a half-consolidated memory.
//!
//! # Example
//!
//! ```rust
//! use reverie_memory::consolidation::{ConsolidationConfig, ConsolidationEngine};
//! use reverie_memory::index::SimilarityIndex;
//! use reverie_types::{DatumId, Lifecycle, Memory};
//!
//! let mut index = SimilarityIndex::new();
//! index.upsert(Memory::create(DatumId::from("m"), vec![1.0]).deactivate());
//!
//! let engine = ConsolidationEngine::new(ConsolidationConfig {
//!     relevance_decay: 0.5,
//!     demote_threshold: 0.6,
//!     ..Default::default()
//! });
//! let report = engine.run(&mut index);
//!
//! assert_eq!(report.demoted_count, 1);
//! assert_eq!(index.get(&DatumId::from("m")).unwrap().lifecycle(), Lifecycle::Composting);
//! ```

use reverie_types::{ConsolidationReport, DatumId, Lifecycle, Memory, Metadata, Trigger};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::index::SimilarityIndex;

/// Metadata key recording which memory absorbed a merge loser.
pub const MERGED_INTO_KEY: &str = "merged_into";

// ─────────────────────────────────────────────────────────────────────────────
// ConsolidationConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Tuning knobs for one consolidation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Per-cycle relevance multiplier for DREAMING memories.
    pub relevance_decay: f32,
    /// Decayed relevance below this demotes to COMPOSTING.
    pub demote_threshold: f32,
    /// Enable the O(n²) near-duplicate merge phase.
    pub merge_enabled: bool,
    /// Similarity at or above which two memories are merged.
    pub merge_threshold: f32,
    /// Relevance boost given to a merge survivor.
    pub merge_boost: f32,
    /// Enable the strengthen phase.
    pub strengthen_enabled: bool,
    /// Access count at which a memory is strengthened.
    pub strengthen_min_access: u64,
    /// Relevance boost given by the strengthen phase.
    pub strengthen_boost: f32,
    /// Per-cycle resolution multiplier for COMPOSTING memories.
    pub resolution_decay: f32,
    /// Resolution floor for the degrade phase.
    pub min_resolution: f32,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            relevance_decay: 0.95,
            demote_threshold: 0.2,
            merge_enabled: false,
            merge_threshold: 0.95,
            merge_boost: 0.1,
            strengthen_enabled: true,
            strengthen_min_access: 3,
            strengthen_boost: 0.05,
            resolution_decay: 0.5,
            min_resolution: 0.1,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConsolidationEngine
// ─────────────────────────────────────────────────────────────────────────────

/// Runs the six consolidation phases over a [`SimilarityIndex`].
///
/// Each phase is a separate method so the owner of the index can release its
/// lock between phases.  [`run`][Self::run] executes all six back to back.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationEngine {
    config: ConsolidationConfig,
}

impl ConsolidationEngine {
    pub fn new(config: ConsolidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Run a complete cycle and report what it did.
    pub fn run(&self, index: &mut SimilarityIndex) -> ConsolidationReport {
        let started = Instant::now();
        let mut report = ConsolidationReport {
            dreaming_count: self.enter_dreaming(index),
            ..Default::default()
        };
        report.demoted_count = self.decay_and_demote(index);
        report.merged_count = self.merge(index);
        report.strengthened_count = self.strengthen(index);
        report.degraded_count = self.degrade_composting(index);
        report.woken_count = self.wake_all(index);
        report.duration = started.elapsed();
        report
    }

    /// Phase 1: every non-cherished DORMANT memory enters DREAMING.
    pub fn enter_dreaming(&self, index: &mut SimilarityIndex) -> usize {
        let mut count = 0;
        for id in index.ids_in(Lifecycle::Dormant) {
            if self.apply(index, &id, |m| {
                if m.is_cherished() { None } else { m.transition(Trigger::EnterDream) }
            }) {
                count += 1;
            }
        }
        count
    }

    /// Phase 2: decay DREAMING relevance; demote anything that falls below the
    /// threshold.  Returns the number demoted.
    pub fn decay_and_demote(&self, index: &mut SimilarityIndex) -> usize {
        let mut demoted = 0;
        for id in self.dreaming_candidates(index) {
            let demote_threshold = self.config.demote_threshold;
            let decay = self.config.relevance_decay;
            index.replace_with(&id, |m| {
                let decayed = m.decay(decay);
                if decayed.relevance() < demote_threshold {
                    if let Some(composted) = decayed.transition(Trigger::Demote) {
                        debug!(datum_id = %id, relevance = decayed.relevance(), "demoted to composting");
                        demoted += 1;
                        return composted;
                    }
                }
                decayed
            });
        }
        demoted
    }

    /// Phase 3: merge near-duplicate DREAMING memories.  Returns the number of
    /// losers composted.  No-op unless `merge_enabled`.
    pub fn merge(&self, index: &mut SimilarityIndex) -> usize {
        if !self.config.merge_enabled {
            return 0;
        }
        let candidates = self.dreaming_candidates(index);
        let mut gone = vec![false; candidates.len()];
        let mut merged = 0;

        for i in 0..candidates.len() {
            if gone[i] {
                continue;
            }
            for j in (i + 1)..candidates.len() {
                if gone[j] {
                    continue;
                }
                let (Some(a), Some(b)) = (index.get(&candidates[i]), index.get(&candidates[j]))
                else {
                    continue;
                };
                let similarity = a.similarity_to(b);
                if similarity < self.config.merge_threshold {
                    continue;
                }
                let (survivor, loser, loser_slot) = if survives(a, b) {
                    (a.clone(), b.clone(), j)
                } else {
                    (b.clone(), a.clone(), i)
                };
                let mut tag = Metadata::new();
                tag.insert(MERGED_INTO_KEY.to_string(), survivor.datum_id().to_string());
                let Some(composted) = loser.with_metadata_merged(&tag).transition(Trigger::MergeLoss)
                else {
                    continue;
                };
                debug!(
                    survivor = %survivor.datum_id(),
                    loser = %loser.datum_id(),
                    similarity,
                    "merged near-duplicate memories"
                );
                index.upsert(composted);
                index.upsert(survivor.reinforce(self.config.merge_boost));
                gone[loser_slot] = true;
                merged += 1;
                if loser_slot == i {
                    break;
                }
            }
        }
        merged
    }

    /// Phase 4: boost frequently accessed DREAMING memories.  No-op unless
    /// `strengthen_enabled`.
    pub fn strengthen(&self, index: &mut SimilarityIndex) -> usize {
        if !self.config.strengthen_enabled {
            return 0;
        }
        let mut count = 0;
        for id in self.dreaming_candidates(index) {
            let min_access = self.config.strengthen_min_access;
            let boost = self.config.strengthen_boost;
            if self.apply(index, &id, |m| {
                (m.access_count() >= min_access).then(|| m.boost(boost))
            }) {
                count += 1;
            }
        }
        count
    }

    /// Phase 5: every COMPOSTING memory loses resolution, down to the floor.
    pub fn degrade_composting(&self, index: &mut SimilarityIndex) -> usize {
        let mut count = 0;
        for id in index.ids_in(Lifecycle::Composting) {
            let factor = self.config.resolution_decay;
            let floor = self.config.min_resolution;
            if self.apply(index, &id, |m| {
                m.transition(Trigger::Degrade)
                    .map(|c| c.degrade_to_floor(factor, floor))
            }) {
                count += 1;
            }
        }
        count
    }

    /// Phase 6: every DREAMING memory returns to DORMANT.
    pub fn wake_all(&self, index: &mut SimilarityIndex) -> usize {
        let mut count = 0;
        for id in index.ids_in(Lifecycle::Dreaming) {
            if self.apply(index, &id, |m| m.transition(Trigger::Wake)) {
                count += 1;
            }
        }
        count
    }

    fn dreaming_candidates(&self, index: &SimilarityIndex) -> Vec<DatumId> {
        index
            .iter()
            .filter(|m| m.lifecycle() == Lifecycle::Dreaming && !m.is_cherished())
            .map(|m| m.datum_id().clone())
            .collect()
    }

    /// Replace `id` with `f(entry)` when `f` yields a value.  Returns whether
    /// a replacement happened.
    fn apply<F>(&self, index: &mut SimilarityIndex, id: &DatumId, f: F) -> bool
    where
        F: FnOnce(&Memory) -> Option<Memory>,
    {
        let Some(next) = index.get(id).and_then(f) else {
            return false;
        };
        index.upsert(next);
        true
    }
}

/// `true` if `a` should survive a merge against `b`: more accesses wins, then
/// higher relevance, then the smaller id.
fn survives(a: &Memory, b: &Memory) -> bool {
    match a.access_count().cmp(&b.access_count()) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => match a.relevance().total_cmp(&b.relevance()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => a.datum_id() <= b.datum_id(),
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn dormant(id: &str, embedding: Vec<f32>) -> Memory {
        Memory::create(DatumId::from(id), embedding).deactivate()
    }

    fn state(index: &SimilarityIndex, id: &str) -> Lifecycle {
        index.get(&DatumId::from(id)).unwrap().lifecycle()
    }

    // ── enter_dreaming / wake_all ────────────────────────────────────────────

    #[test]
    fn enter_dreaming_only_touches_dormant() {
        let mut index = SimilarityIndex::new();
        index.upsert(dormant("d", vec![1.0]));
        index.upsert(Memory::create(DatumId::from("a"), vec![1.0]));
        let engine = ConsolidationEngine::default();
        assert_eq!(engine.enter_dreaming(&mut index), 1);
        assert_eq!(state(&index, "d"), Lifecycle::Dreaming);
        assert_eq!(state(&index, "a"), Lifecycle::Active);
    }

    #[test]
    fn cherished_never_enters_dreaming() {
        let mut index = SimilarityIndex::new();
        index.upsert(dormant("c", vec![1.0]).cherish());
        let engine = ConsolidationEngine::default();
        assert_eq!(engine.enter_dreaming(&mut index), 0);
        assert_eq!(state(&index, "c"), Lifecycle::Dormant);
    }

    #[test]
    fn wake_all_with_nothing_dreaming_is_noop() {
        let mut index = SimilarityIndex::new();
        index.upsert(dormant("d", vec![1.0]));
        let before = index.get(&DatumId::from("d")).cloned();
        assert_eq!(ConsolidationEngine::default().wake_all(&mut index), 0);
        assert_eq!(index.get(&DatumId::from("d")).cloned(), before);
    }

    // ── decay_and_demote ─────────────────────────────────────────────────────

    #[test]
    fn decay_keeps_strong_memories_dreaming() {
        let mut index = SimilarityIndex::new();
        index.upsert(dormant("m", vec![1.0]));
        let engine = ConsolidationEngine::default();
        engine.enter_dreaming(&mut index);
        assert_eq!(engine.decay_and_demote(&mut index), 0);
        let m = index.get(&DatumId::from("m")).unwrap();
        assert_eq!(m.lifecycle(), Lifecycle::Dreaming);
        assert!((m.relevance() - 0.95).abs() < 1e-6);
    }

    #[test]
    fn decay_demotes_weak_memories() {
        let mut index = SimilarityIndex::new();
        index.upsert(dormant("weak", vec![1.0]).with_relevance(0.2));
        let engine = ConsolidationEngine::default();
        engine.enter_dreaming(&mut index);
        assert_eq!(engine.decay_and_demote(&mut index), 1);
        assert_eq!(state(&index, "weak"), Lifecycle::Composting);
    }

    // ── merge ────────────────────────────────────────────────────────────────

    fn merge_engine() -> ConsolidationEngine {
        ConsolidationEngine::new(ConsolidationConfig {
            merge_enabled: true,
            ..Default::default()
        })
    }

    #[test]
    fn merge_disabled_by_default() {
        let mut index = SimilarityIndex::new();
        index.upsert(dormant("a", vec![1.0, 0.0]));
        index.upsert(dormant("b", vec![1.0, 0.0]));
        let engine = ConsolidationEngine::default();
        engine.enter_dreaming(&mut index);
        assert_eq!(engine.merge(&mut index), 0);
    }

    #[test]
    fn merge_keeps_more_accessed_memory() {
        let mut index = SimilarityIndex::new();
        index.upsert(dormant("a", vec![1.0, 0.0]).with_access_count(1));
        index.upsert(dormant("b", vec![1.0, 0.01]).with_access_count(5));
        let engine = merge_engine();
        engine.enter_dreaming(&mut index);
        assert_eq!(engine.merge(&mut index), 1);
        assert_eq!(state(&index, "a"), Lifecycle::Composting);
        assert_eq!(state(&index, "b"), Lifecycle::Dreaming);
        let loser = index.get(&DatumId::from("a")).unwrap();
        assert_eq!(loser.metadata().get(MERGED_INTO_KEY).unwrap(), "b");
        assert_eq!(index.get(&DatumId::from("b")).unwrap().access_count(), 6);
    }

    #[test]
    fn merge_ignores_dissimilar_pairs() {
        let mut index = SimilarityIndex::new();
        index.upsert(dormant("a", vec![1.0, 0.0]));
        index.upsert(dormant("b", vec![0.0, 1.0]));
        let engine = merge_engine();
        engine.enter_dreaming(&mut index);
        assert_eq!(engine.merge(&mut index), 0);
    }

    #[test]
    fn merge_chain_collapses_to_one_survivor() {
        let mut index = SimilarityIndex::new();
        index.upsert(dormant("a", vec![1.0, 0.0]).with_access_count(2));
        index.upsert(dormant("b", vec![1.0, 0.0]).with_access_count(1));
        index.upsert(dormant("c", vec![1.0, 0.0]).with_access_count(0));
        let engine = merge_engine();
        engine.enter_dreaming(&mut index);
        assert_eq!(engine.merge(&mut index), 2);
        assert_eq!(state(&index, "a"), Lifecycle::Dreaming);
        assert_eq!(state(&index, "b"), Lifecycle::Composting);
        assert_eq!(state(&index, "c"), Lifecycle::Composting);
    }

    #[test]
    fn merge_tie_prefers_smaller_id() {
        let a = dormant("a", vec![1.0]);
        let b = dormant("b", vec![1.0]);
        assert!(survives(&a, &b));
        assert!(!survives(&b, &a));
    }

    // ── strengthen ───────────────────────────────────────────────────────────

    #[test]
    fn strengthen_boosts_frequent_memories() {
        let mut index = SimilarityIndex::new();
        index.upsert(dormant("hot", vec![1.0]).with_relevance(0.5).with_access_count(3));
        index.upsert(dormant("cold", vec![1.0]).with_relevance(0.5).with_access_count(2));
        let engine = ConsolidationEngine::default();
        engine.enter_dreaming(&mut index);
        assert_eq!(engine.strengthen(&mut index), 1);
        assert!((index.get(&DatumId::from("hot")).unwrap().relevance() - 0.55).abs() < 1e-6);
        assert!((index.get(&DatumId::from("cold")).unwrap().relevance() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn strengthen_can_be_disabled() {
        let mut index = SimilarityIndex::new();
        index.upsert(dormant("hot", vec![1.0]).with_access_count(9));
        let engine = ConsolidationEngine::new(ConsolidationConfig {
            strengthen_enabled: false,
            ..Default::default()
        });
        engine.enter_dreaming(&mut index);
        assert_eq!(engine.strengthen(&mut index), 0);
    }

    // ── degrade_composting ───────────────────────────────────────────────────

    #[test]
    fn degrade_halves_resolution_down_to_floor() {
        let mut index = SimilarityIndex::new();
        index.upsert(dormant("c", vec![1.0]).compost().unwrap());
        let engine = ConsolidationEngine::default();
        let mut last = 1.0;
        for _ in 0..10 {
            engine.degrade_composting(&mut index);
            let r = index.get(&DatumId::from("c")).unwrap().resolution();
            assert!(r <= last);
            assert!(r >= 0.1 - 1e-6);
            last = r;
        }
        assert!((last - 0.1).abs() < 1e-6);
    }

    // ── run ──────────────────────────────────────────────────────────────────

    #[test]
    fn run_reports_every_phase() {
        let mut index = SimilarityIndex::new();
        index.upsert(dormant("keep", vec![1.0, 0.0]).with_access_count(4));
        index.upsert(dormant("weak", vec![0.0, 1.0]).with_relevance(0.1));
        index.upsert(Memory::create(DatumId::from("old"), vec![1.0, 1.0]).compost().unwrap());
        let report = ConsolidationEngine::default().run(&mut index);
        assert_eq!(report.dreaming_count, 2);
        assert_eq!(report.demoted_count, 1);
        assert_eq!(report.strengthened_count, 1);
        assert_eq!(report.degraded_count, 2);
        assert_eq!(report.woken_count, 1);
        assert_eq!(state(&index, "keep"), Lifecycle::Dormant);
        assert!(index.ids_in(Lifecycle::Dreaming).is_empty());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: ConsolidationConfig = serde_json::from_str(r#"{"merge_enabled": true}"#).unwrap();
        assert!(cfg.merge_enabled);
        assert!((cfg.relevance_decay - 0.95).abs() < 1e-6);
    }
}
