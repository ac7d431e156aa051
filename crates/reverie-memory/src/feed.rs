//! Reactive feed adapter.
//!
//! Content stores that publish change notifications can drive an
//! [`AssociativeMemory`] directly.  Each [`FeedEvent`] maps 1:1 onto a façade
//! operation:
//!
//! | Event | Operation |
//! |---|---|
//! | [`FeedEvent::Put`] | [`remember`][AssociativeMemory::remember] |
//! | [`FeedEvent::Delete`] | [`forget`][AssociativeMemory::forget] |
//! | [`FeedEvent::Upgrade`] | [`update_metadata`][AssociativeMemory::update_metadata] (`cherished=true` cherishes) |
//! | [`FeedEvent::Degrade`] | [`degrade`][AssociativeMemory::degrade] |
//!
//! A [`FeedSource`] produces the events; [`run_feed`] drains one into a
//! memory until the stream ends.  [`ChannelFeed`] adapts a tokio mpsc channel.

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use reverie_types::{Content, DatumId, Metadata, ReverieError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::associative::AssociativeMemory;

fn default_degrade_factor() -> f32 {
    0.5
}

/// A change notification from an external content source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum FeedEvent {
    /// New content appeared.
    Put {
        content: Content,
        #[serde(default)]
        metadata: Metadata,
    },
    /// Content was deleted upstream.
    Delete { id: DatumId },
    /// Content was annotated or promoted upstream.
    Upgrade { id: DatumId, metadata: Metadata },
    /// Content lost fidelity upstream.
    Degrade {
        id: DatumId,
        #[serde(default = "default_degrade_factor")]
        factor: f32,
    },
}

/// Result of applying one [`FeedEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum FeedOutcome {
    /// A `Put` created a new memory.
    Remembered(DatumId),
    /// The event changed an existing memory.
    Applied,
    /// Unknown id, or a refused transition (e.g. deleting a cherished memory).
    Ignored,
}

/// Tally returned by [`run_feed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub remembered: usize,
    pub applied: usize,
    pub ignored: usize,
    pub failed: usize,
}

/// Anything that can produce a stream of [`FeedEvent`]s.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn events(&self) -> BoxStream<'static, FeedEvent>;
}

/// A [`FeedSource`] backed by a tokio mpsc receiver.
///
/// The receiver can be streamed once; later calls to `events` yield an empty
/// stream.
pub struct ChannelFeed {
    receiver: Mutex<Option<mpsc::Receiver<FeedEvent>>>,
}

impl ChannelFeed {
    /// Create a feed and the sender that drives it.
    pub fn new(capacity: usize) -> (mpsc::Sender<FeedEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            tx,
            Self {
                receiver: Mutex::new(Some(rx)),
            },
        )
    }
}

#[async_trait]
impl FeedSource for ChannelFeed {
    async fn events(&self) -> BoxStream<'static, FeedEvent> {
        match self.receiver.lock().await.take() {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }
}

/// Apply a single event to `memory`.
pub async fn apply_event(
    memory: &AssociativeMemory,
    event: FeedEvent,
) -> Result<FeedOutcome, ReverieError> {
    let outcome = match event {
        FeedEvent::Put { content, metadata } => {
            FeedOutcome::Remembered(memory.remember(content, None, metadata).await?)
        }
        FeedEvent::Delete { id } => changed(memory.forget(&id).await),
        FeedEvent::Upgrade { id, metadata } => changed(memory.update_metadata(&id, &metadata).await),
        FeedEvent::Degrade { id, factor } => changed(memory.degrade(&id, factor).await),
    };
    Ok(outcome)
}

fn changed(applied: bool) -> FeedOutcome {
    if applied {
        FeedOutcome::Applied
    } else {
        FeedOutcome::Ignored
    }
}

/// Drain `source` into `memory` until the stream ends.
///
/// A failing event is logged and counted; it never stops the feed.
pub async fn run_feed<S>(memory: Arc<AssociativeMemory>, source: &S) -> FeedStats
where
    S: FeedSource + ?Sized,
{
    let mut stats = FeedStats::default();
    let mut events = source.events().await;
    while let Some(event) = events.next().await {
        match apply_event(&memory, event).await {
            Ok(FeedOutcome::Remembered(id)) => {
                debug!(datum_id = %id, "feed put");
                stats.remembered += 1;
            }
            Ok(FeedOutcome::Applied) => stats.applied += 1,
            Ok(FeedOutcome::Ignored) => stats.ignored += 1,
            Err(e) => {
                warn!(error = %e, "feed event failed");
                stats.failed += 1;
            }
        }
    }
    stats
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use crate::store::InMemoryStore;
    use reverie_types::{CHERISHED_KEY, Lifecycle};

    fn memory() -> Arc<AssociativeMemory> {
        Arc::new(AssociativeMemory::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashEmbedder::default()),
        ))
    }

    #[tokio::test]
    async fn put_remembers() {
        let mem = memory();
        let outcome = apply_event(
            &mem,
            FeedEvent::Put {
                content: Content::from("from the feed"),
                metadata: Metadata::new(),
            },
        )
        .await
        .unwrap();
        let FeedOutcome::Remembered(id) = outcome else {
            panic!("expected Remembered");
        };
        assert_eq!(mem.get(&id).await.unwrap().lifecycle(), Lifecycle::Active);
    }

    #[tokio::test]
    async fn delete_of_unknown_is_ignored() {
        let mem = memory();
        let outcome = apply_event(&mem, FeedEvent::Delete { id: DatumId::from("x") })
            .await
            .unwrap();
        assert_eq!(outcome, FeedOutcome::Ignored);
    }

    #[tokio::test]
    async fn upgrade_can_cherish() {
        let mem = memory();
        let id = mem.remember("keep me", None, Metadata::new()).await.unwrap();
        let mut md = Metadata::new();
        md.insert(CHERISHED_KEY.into(), "true".into());
        apply_event(&mem, FeedEvent::Upgrade { id: id.clone(), metadata: md })
            .await
            .unwrap();
        assert!(mem.get(&id).await.unwrap().is_cherished());
        assert_eq!(
            apply_event(&mem, FeedEvent::Delete { id }).await.unwrap(),
            FeedOutcome::Ignored
        );
    }

    #[test]
    fn events_parse_from_json() {
        let ev: FeedEvent = serde_json::from_str(r#"{"op":"degrade","id":"abc"}"#).unwrap();
        assert_eq!(
            ev,
            FeedEvent::Degrade {
                id: DatumId::from("abc"),
                factor: 0.5
            }
        );
        let ev: FeedEvent = serde_json::from_str(
            r#"{"op":"put","content":{"kind":"text","data":"hi"}}"#,
        )
        .unwrap();
        assert!(matches!(ev, FeedEvent::Put { .. }));
    }

    #[tokio::test]
    async fn channel_feed_drains_until_closed() {
        let mem = memory();
        let (tx, feed) = ChannelFeed::new(8);
        let existing = mem.remember("existing", None, Metadata::new()).await.unwrap();

        tx.send(FeedEvent::Put {
            content: Content::from("one"),
            metadata: Metadata::new(),
        })
        .await
        .unwrap();
        tx.send(FeedEvent::Degrade {
            id: existing.clone(),
            factor: 0.5,
        })
        .await
        .unwrap();
        tx.send(FeedEvent::Delete {
            id: DatumId::from("missing"),
        })
        .await
        .unwrap();
        drop(tx);

        let stats = run_feed(mem.clone(), &feed).await;
        assert_eq!(
            stats,
            FeedStats {
                remembered: 1,
                applied: 1,
                ignored: 1,
                failed: 0
            }
        );
        assert!((mem.get(&existing).await.unwrap().resolution() - 0.5).abs() < 1e-6);

        // A second drain finds the receiver already consumed.
        assert_eq!(run_feed(mem, &feed).await, FeedStats::default());
    }
}
