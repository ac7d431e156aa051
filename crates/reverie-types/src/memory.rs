//! [`Memory`] – one semantically-indexed record.
//!
//! A `Memory` never changes in place.  Every transition method borrows the
//! current value and returns a new one, which the owner stores under the same
//! [`DatumId`] in place of the old value.  Readers holding an earlier clone
//! therefore never observe a half-applied transition.
//!
//! Scores are clamped to `[0.0, 1.0]` on the way in; nothing here returns an
//! error.
//!
//! # Example
//!
//! ```rust
//! use reverie_types::{DatumId, Lifecycle, Memory};
//!
//! let m = Memory::create(DatumId::from("d1"), vec![1.0, 0.0]);
//! assert_eq!(m.lifecycle(), Lifecycle::Active);
//!
//! let m = m.deactivate().activate();
//! assert_eq!(m.lifecycle(), Lifecycle::Active);
//! assert_eq!(m.access_count(), 1);
//!
//! let m = m.cherish();
//! assert!(m.compost().is_none());
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::{Lifecycle, Trigger};
use crate::{DatumId, Metadata, cosine_similarity};

/// Metadata key that marks a memory as permanently protected.
pub const CHERISHED_KEY: &str = "cherished";

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Deserialization clamps both scores and applies cherish protection, so a
/// snapshot cannot load out-of-range scores or a cherished COMPOSTING memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMemory")]
pub struct Memory {
    datum_id: DatumId,
    embedding: Vec<f32>,
    resolution: f32,
    lifecycle: Lifecycle,
    relevance: f32,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    access_count: u64,
    #[serde(default)]
    metadata: Metadata,
}

/// Wire shape of [`Memory`], normalised on conversion.
#[derive(Deserialize)]
struct RawMemory {
    datum_id: DatumId,
    embedding: Vec<f32>,
    resolution: f32,
    lifecycle: Lifecycle,
    relevance: f32,
    created_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
    access_count: u64,
    #[serde(default)]
    metadata: Metadata,
}

impl From<RawMemory> for Memory {
    fn from(raw: RawMemory) -> Self {
        let mut m = Memory {
            datum_id: raw.datum_id,
            embedding: raw.embedding,
            resolution: clamp_unit(raw.resolution),
            lifecycle: raw.lifecycle,
            relevance: clamp_unit(raw.relevance),
            created_at: raw.created_at,
            last_accessed: raw.last_accessed,
            access_count: raw.access_count,
            metadata: raw.metadata,
        };
        m.protect();
        m
    }
}

impl Memory {
    /// A fresh, fully-resolved, fully-relevant ACTIVE memory.
    pub fn create(datum_id: DatumId, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            datum_id,
            embedding,
            resolution: 1.0,
            lifecycle: Lifecycle::Active,
            relevance: 1.0,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            metadata: Metadata::new(),
        }
    }

    // ── construction-time overrides ──────────────────────────────────────────

    /// Starting resolution, clamped to `[0, 1]`.
    pub fn with_resolution(mut self, resolution: f32) -> Self {
        self.resolution = clamp_unit(resolution);
        self
    }

    /// Starting relevance, clamped to `[0, 1]`.
    pub fn with_relevance(mut self, relevance: f32) -> Self {
        self.relevance = clamp_unit(relevance);
        self
    }

    /// Override the starting state.  A cherished memory is never placed in
    /// COMPOSTING; it lands in DORMANT instead.
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self.protect();
        self
    }

    /// Replace the metadata.  `cherished=true` lifts a COMPOSTING memory to
    /// DORMANT.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self.protect();
        self
    }

    /// Seed the access counter, e.g. when rebuilding from another source.
    pub fn with_access_count(mut self, access_count: u64) -> Self {
        self.access_count = access_count;
        self
    }

    // ── accessors ────────────────────────────────────────────────────────────

    /// Id of the datum in the content store.
    pub fn datum_id(&self) -> &DatumId {
        &self.datum_id
    }

    /// Embedding vector, as produced by the embedder.
    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    /// Fidelity in `[0, 1]`.  Only ever falls.
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Importance in `[0, 1]`; decays each cycle unless cherished.
    pub fn relevance(&self) -> f32 {
        self.relevance
    }

    /// When the memory was first created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last recall or reinforcement.
    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    /// Number of recalls and reinforcements.
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Free-form string metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// `true` if `metadata["cherished"] == "true"`.
    pub fn is_cherished(&self) -> bool {
        self.metadata.get(CHERISHED_KEY).map(String::as_str) == Some("true")
    }

    /// `true` if the memory is ACTIVE and has not been touched for `timeout`.
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.lifecycle == Lifecycle::Active && now - self.last_accessed >= timeout
    }

    // ── transitions ──────────────────────────────────────────────────────────

    /// Apply `trigger` through the lifecycle table.
    ///
    /// Returns `None` when the table has no row for the current state, when
    /// the target is COMPOSTING and the memory is cherished, or on
    /// [`Trigger::Cherish`] for a memory that is not cherished.
    #[must_use]
    pub fn transition(&self, trigger: Trigger) -> Option<Memory> {
        let next = self.lifecycle.next(trigger)?;
        let cherished = self.is_cherished();
        if (next == Lifecycle::Composting && cherished)
            || (trigger == Trigger::Cherish && !cherished)
        {
            return None;
        }
        let mut m = self.clone();
        m.lifecycle = next;
        Some(m)
    }

    /// Record a recall hit: ACTIVE, one more access, `last_accessed = now`.
    ///
    /// States with no recall transition (COMPOSTING) keep their state but
    /// still record the access.
    #[must_use]
    pub fn activate(&self) -> Memory {
        let mut m = self.transition(Trigger::Recall).unwrap_or_else(|| self.clone());
        m.touch();
        m
    }

    /// ACTIVE to DORMANT; unchanged from any other state.
    #[must_use]
    pub fn deactivate(&self) -> Memory {
        self.transition(Trigger::Deactivate)
            .unwrap_or_else(|| self.clone())
    }

    /// DORMANT to DREAMING; unchanged from any other state.
    #[must_use]
    pub fn dream(&self) -> Memory {
        self.transition(Trigger::EnterDream)
            .unwrap_or_else(|| self.clone())
    }

    /// DREAMING to DORMANT; unchanged from any other state.
    #[must_use]
    pub fn wake(&self) -> Memory {
        self.transition(Trigger::Wake).unwrap_or_else(|| self.clone())
    }

    /// Move to COMPOSTING from any state.  `None` if cherished.
    #[must_use]
    pub fn compost(&self) -> Option<Memory> {
        if self.is_cherished() {
            return None;
        }
        let mut m = self.clone();
        m.lifecycle = Lifecycle::Composting;
        Some(m)
    }

    /// Multiply resolution by `factor` (clamped to `[0, 1]`).  Irreversible.
    #[must_use]
    pub fn degrade(&self, factor: f32) -> Memory {
        let mut m = self.clone();
        m.resolution = clamp_unit(self.resolution * clamp_unit(factor));
        m
    }

    /// Like [`degrade`][Self::degrade] but never takes resolution below
    /// `floor`.  A memory already below `floor` is left where it is.
    #[must_use]
    pub fn degrade_to_floor(&self, factor: f32, floor: f32) -> Memory {
        let mut m = self.clone();
        let decayed = self.resolution * clamp_unit(factor);
        m.resolution = decayed.max(clamp_unit(floor)).min(self.resolution);
        m
    }

    /// Raise relevance by `boost` (capped at 1.0) and record an access.
    #[must_use]
    pub fn reinforce(&self, boost: f32) -> Memory {
        let mut m = self.clone();
        m.relevance = clamp_unit(self.relevance + boost.max(0.0));
        m.touch();
        m
    }

    /// Raise relevance by `amount` (capped at 1.0) without recording an access.
    #[must_use]
    pub fn boost(&self, amount: f32) -> Memory {
        let mut m = self.clone();
        m.relevance = clamp_unit(self.relevance + amount.max(0.0));
        m
    }

    /// Multiply relevance by `factor`.  Cherished memories do not decay.
    #[must_use]
    pub fn decay(&self, factor: f32) -> Memory {
        let mut m = self.clone();
        if !self.is_cherished() {
            m.relevance = clamp_unit(self.relevance * clamp_unit(factor));
        }
        m
    }

    /// Permanently protect this memory: relevance 1.0, `cherished=true`.
    #[must_use]
    pub fn cherish(&self) -> Memory {
        let mut m = self.clone();
        m.relevance = 1.0;
        m.metadata.insert(CHERISHED_KEY.to_string(), "true".to_string());
        m.protect();
        m
    }

    /// Overlay `updates` onto the metadata.  Setting `cherished=true` this way
    /// has the full effect of [`cherish`][Self::cherish].
    #[must_use]
    pub fn with_metadata_merged(&self, updates: &Metadata) -> Memory {
        let mut m = self.clone();
        for (k, v) in updates {
            m.metadata.insert(k.clone(), v.clone());
        }
        if m.is_cherished() && !self.is_cherished() {
            return m.cherish();
        }
        m.protect();
        m
    }

    // ── similarity ───────────────────────────────────────────────────────────

    /// Cosine similarity against `vector`; `0.0` on dimension mismatch.
    pub fn similarity(&self, vector: &[f32]) -> f32 {
        cosine_similarity(&self.embedding, vector)
    }

    /// Cosine similarity between two memories' embeddings.
    pub fn similarity_to(&self, other: &Memory) -> f32 {
        self.similarity(&other.embedding)
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn touch(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = Utc::now();
    }

    /// Cherished and COMPOSTING are mutually exclusive.
    fn protect(&mut self) {
        if self.is_cherished()
            && let Some(next) = self.lifecycle.next(Trigger::Cherish)
        {
            self.lifecycle = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(embedding: Vec<f32>) -> Memory {
        Memory::create(DatumId::generate(), embedding)
    }

    #[test]
    fn create_defaults() {
        let m = memory(vec![1.0, 0.0]);
        assert_eq!(m.lifecycle(), Lifecycle::Active);
        assert_eq!(m.resolution(), 1.0);
        assert_eq!(m.relevance(), 1.0);
        assert_eq!(m.access_count(), 0);
        assert!(!m.is_cherished());
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        let m = memory(vec![1.0]).with_resolution(1.7).with_relevance(-0.4);
        assert_eq!(m.resolution(), 1.0);
        assert_eq!(m.relevance(), 0.0);
        let m = m.with_relevance(f32::NAN);
        assert_eq!(m.relevance(), 0.0);
    }

    #[test]
    fn transitions_return_new_values() {
        let m = memory(vec![1.0]);
        let dormant = m.deactivate();
        assert_eq!(m.lifecycle(), Lifecycle::Active);
        assert_eq!(dormant.lifecycle(), Lifecycle::Dormant);
    }

    #[test]
    fn activate_bumps_access_and_timestamp() {
        let m = memory(vec![1.0]).deactivate();
        let before = m.last_accessed();
        let a = m.activate();
        assert_eq!(a.lifecycle(), Lifecycle::Active);
        assert_eq!(a.access_count(), 1);
        assert!(a.last_accessed() >= before);
    }

    #[test]
    fn activate_keeps_composting_state() {
        let m = memory(vec![1.0]).compost().unwrap();
        let a = m.activate();
        assert_eq!(a.lifecycle(), Lifecycle::Composting);
        assert_eq!(a.access_count(), 1);
    }

    #[test]
    fn dream_only_from_dormant() {
        let active = memory(vec![1.0]);
        assert_eq!(active.dream().lifecycle(), Lifecycle::Active);
        assert_eq!(active.deactivate().dream().lifecycle(), Lifecycle::Dreaming);
    }

    #[test]
    fn wake_is_noop_outside_dreaming() {
        let m = memory(vec![1.0]);
        assert_eq!(m.wake(), m);
        let dreaming = m.deactivate().dream();
        assert_eq!(dreaming.wake().lifecycle(), Lifecycle::Dormant);
    }

    #[test]
    fn compost_from_any_state() {
        let m = memory(vec![1.0]);
        assert_eq!(m.compost().unwrap().lifecycle(), Lifecycle::Composting);
        assert_eq!(
            m.deactivate().dream().compost().unwrap().lifecycle(),
            Lifecycle::Composting
        );
    }

    #[test]
    fn cherished_refuses_compost() {
        let m = memory(vec![1.0]).cherish();
        assert!(m.compost().is_none());
        assert!(m.deactivate().dream().transition(Trigger::Demote).is_none());
        assert!(m.transition(Trigger::Forget).is_none());
    }

    #[test]
    fn cherish_pulls_out_of_composting() {
        let m = memory(vec![1.0]).with_relevance(0.1).compost().unwrap();
        let c = m.cherish();
        assert!(c.is_cherished());
        assert_eq!(c.relevance(), 1.0);
        assert_eq!(c.lifecycle(), Lifecycle::Dormant);
    }

    #[test]
    fn cherish_trigger_needs_the_cherished_flag() {
        let composting = memory(vec![1.0]).compost().unwrap();
        assert!(composting.transition(Trigger::Cherish).is_none());
        let mut md = Metadata::new();
        md.insert(CHERISHED_KEY.into(), "true".into());
        let flagged = Memory {
            metadata: md,
            ..composting
        };
        assert_eq!(
            flagged.transition(Trigger::Cherish).unwrap().lifecycle(),
            Lifecycle::Dormant
        );
    }

    #[test]
    fn degrade_is_monotone_and_floored_at_zero() {
        let mut m = memory(vec![1.0]);
        let mut last = m.resolution();
        for _ in 0..40 {
            m = m.degrade(0.5);
            assert!(m.resolution() <= last);
            assert!(m.resolution() >= 0.0);
            last = m.resolution();
        }
        // A factor above 1 cannot restore fidelity.
        assert!(m.degrade(3.0).resolution() <= m.resolution());
    }

    #[test]
    fn degrade_to_floor_respects_floor() {
        let m = memory(vec![1.0]).with_resolution(0.15);
        assert!((m.degrade_to_floor(0.5, 0.1).resolution() - 0.1).abs() < 1e-6);
        let below = memory(vec![1.0]).with_resolution(0.05);
        assert!((below.degrade_to_floor(0.5, 0.1).resolution() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn reinforce_caps_at_one() {
        let m = memory(vec![1.0]).with_relevance(0.95).reinforce(0.1);
        assert_eq!(m.relevance(), 1.0);
        assert_eq!(m.access_count(), 1);
    }

    #[test]
    fn boost_does_not_count_as_access() {
        let m = memory(vec![1.0]).with_relevance(0.5).boost(0.05);
        assert!((m.relevance() - 0.55).abs() < 1e-6);
        assert_eq!(m.access_count(), 0);
    }

    #[test]
    fn decay_skips_cherished() {
        let plain = memory(vec![1.0]).decay(0.5);
        assert!((plain.relevance() - 0.5).abs() < 1e-6);
        let cherished = memory(vec![1.0]).cherish().decay(0.5);
        assert_eq!(cherished.relevance(), 1.0);
    }

    #[test]
    fn metadata_merge_can_cherish() {
        let m = memory(vec![1.0]).with_relevance(0.3);
        let mut updates = Metadata::new();
        updates.insert("source".into(), "feed".into());
        updates.insert(CHERISHED_KEY.into(), "true".into());
        let merged = m.with_metadata_merged(&updates);
        assert!(merged.is_cherished());
        assert_eq!(merged.relevance(), 1.0);
        assert_eq!(merged.metadata().get("source").unwrap(), "feed");
    }

    #[test]
    fn cherished_metadata_at_construction_blocks_composting() {
        let mut md = Metadata::new();
        md.insert(CHERISHED_KEY.into(), "true".into());
        let m = memory(vec![1.0])
            .with_lifecycle(Lifecycle::Composting)
            .with_metadata(md);
        assert_eq!(m.lifecycle(), Lifecycle::Dormant);
    }

    #[test]
    fn similarity_symmetric_and_mismatch_safe() {
        let a = memory(vec![1.0, 2.0, 0.5]);
        let b = memory(vec![0.5, -1.0, 2.0]);
        assert!((a.similarity_to(&b) - b.similarity_to(&a)).abs() < 1e-6);
        assert!(a.similarity_to(&b) >= -1.0 && a.similarity_to(&b) <= 1.0);
        assert_eq!(a.similarity(&[1.0, 2.0]), 0.0);
    }

    #[test]
    fn idle_only_applies_to_active() {
        let m = memory(vec![1.0]);
        let later = Utc::now() + Duration::seconds(120);
        assert!(m.is_idle(later, Duration::seconds(60)));
        assert!(!m.is_idle(Utc::now(), Duration::seconds(60)));
        assert!(!m.deactivate().is_idle(later, Duration::seconds(60)));
    }

    #[test]
    fn deserialization_clamps_scores_and_protects_cherished() {
        let m = memory(vec![1.0, 0.0]);
        let mut json = serde_json::to_value(&m).unwrap();
        json["relevance"] = serde_json::json!(5.0);
        json["resolution"] = serde_json::json!(-2.0);
        json["lifecycle"] = serde_json::json!("composting");
        json["metadata"] = serde_json::json!({ "cherished": "true" });

        let back: Memory = serde_json::from_value(json).unwrap();
        assert_eq!(back.relevance(), 1.0);
        assert_eq!(back.resolution(), 0.0);
        assert!(back.is_cherished());
        assert_eq!(back.lifecycle(), Lifecycle::Dormant);
    }

    #[test]
    fn deserialization_keeps_uncherished_composting() {
        let m = memory(vec![1.0]).with_resolution(0.4).compost().unwrap();
        let back: Memory = serde_json::from_str(&serde_json::to_string(&m).unwrap()).unwrap();
        assert_eq!(back.lifecycle(), Lifecycle::Composting);
        assert!((back.resolution() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn memory_serialization_roundtrip() {
        let m = memory(vec![0.25, 0.5]).cherish();
        let json = serde_json::to_string(&m).unwrap();
        let back: Memory = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
