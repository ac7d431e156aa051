//! `reverie-memory` – The Associative Store.
//!
//! Indexes content held elsewhere by its embedding, recalls it by similarity
//! and keeps the index healthy with periodic sleep-style consolidation.
//!
//! # Modules
//!
//! - [`associative`] – [`AssociativeMemory`]: the façade.  Remember, recall,
//!   forget, cherish, consolidate, wake and inspect.
//! - [`index`] – [`SimilarityIndex`]: the in-memory map of memories with a
//!   brute-force cosine query.
//! - [`consolidation`] – [`ConsolidationEngine`]: the six-phase cycle (enter
//!   dreaming, decay & demote, merge, strengthen, degrade composting, wake).
//! - [`store`] / [`sqlite_store`] – the [`ContentStore`] collaborator with
//!   in-memory and SQLite implementations.
//! - [`embedder`] – the [`Embedder`] collaborator with a deterministic hashing
//!   fallback and an Ollama client.
//! - [`feed`] – drives a memory from a stream of upstream change events.
//! - [`scheduler`] – runs idle demotion and consolidation on a timer.

pub mod associative;
pub mod consolidation;
pub mod embedder;
pub mod feed;
pub mod index;
pub mod scheduler;
pub mod sqlite_store;
pub mod store;

pub use associative::{AssociativeMemory, Cue, RecallHit};
pub use consolidation::{ConsolidationConfig, ConsolidationEngine};
pub use embedder::{EmbedError, Embedder, HashEmbedder, OllamaEmbedder};
pub use feed::{ChannelFeed, FeedEvent, FeedSource, run_feed};
pub use index::SimilarityIndex;
pub use scheduler::{ConsolidationScheduler, SchedulerConfig};
pub use sqlite_store::SqliteStore;
pub use store::{ContentStore, InMemoryStore, StoreError};
