//! Periodic consolidation.
//!
//! [`ConsolidationScheduler`] owns a background task that, on every tick,
//! moves idle ACTIVE memories to DORMANT and then runs one consolidation
//! cycle.  A tick that arrives while the previous cycle is still running is
//! skipped rather than queued.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::associative::AssociativeMemory;

/// Timing for a [`ConsolidationScheduler`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Time between cycles.  The first cycle runs one full interval after
    /// spawning.
    pub interval: Duration,
    /// ACTIVE memories untouched for this long go DORMANT before each cycle.
    /// `None` leaves ACTIVE memories alone.
    pub idle_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Handle to a running consolidation loop.
pub struct ConsolidationScheduler {
    stop: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl ConsolidationScheduler {
    /// Start the loop on the current tokio runtime.
    pub fn spawn(memory: Arc<AssociativeMemory>, config: SchedulerConfig) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let period = config.interval.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut cycles = 0u64;
            info!(interval_ms = period.as_millis() as u64, "consolidation scheduler started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                if let Some(timeout) = config.idle_timeout {
                    let idle = memory.deactivate_idle(timeout).await;
                    debug!(idle, "idle sweep");
                }
                memory.consolidate().await;
                cycles += 1;
            }
            info!(cycles, "consolidation scheduler stopped");
            cycles
        });
        Self { stop, task }
    }

    /// Stop the loop and wait for it to exit.  A cycle already in progress
    /// finishes first.  Returns the number of cycles run.
    pub async fn shutdown(self) -> u64 {
        let _ = self.stop.send(true);
        match self.task.await {
            Ok(cycles) => cycles,
            Err(e) => {
                warn!(error = %e, "consolidation scheduler task failed");
                0
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use crate::store::InMemoryStore;
    use reverie_types::{Lifecycle, Metadata};

    fn memory() -> Arc<AssociativeMemory> {
        Arc::new(AssociativeMemory::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashEmbedder::default()),
        ))
    }

    #[tokio::test]
    async fn ticks_demote_idle_and_consolidate() {
        let mem = memory();
        let id = mem.remember("drifting away", None, Metadata::new()).await.unwrap();

        let scheduler = ConsolidationScheduler::spawn(
            mem.clone(),
            SchedulerConfig {
                interval: Duration::from_millis(20),
                idle_timeout: Some(Duration::ZERO),
            },
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
        let cycles = scheduler.shutdown().await;

        assert!(cycles >= 1);
        let m = mem.get(&id).await.unwrap();
        assert_eq!(m.lifecycle(), Lifecycle::Dormant);
        assert!(m.relevance() < 1.0);
        assert!(!mem.is_consolidating());
    }

    #[tokio::test]
    async fn without_idle_timeout_active_memories_stay_active() {
        let mem = memory();
        let id = mem.remember("busy", None, Metadata::new()).await.unwrap();
        let scheduler = ConsolidationScheduler::spawn(
            mem.clone(),
            SchedulerConfig {
                interval: Duration::from_millis(10),
                idle_timeout: None,
            },
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        scheduler.shutdown().await;
        let m = mem.get(&id).await.unwrap();
        assert_eq!(m.lifecycle(), Lifecycle::Active);
        assert_eq!(m.relevance(), 1.0);
    }

    #[tokio::test]
    async fn shutdown_before_first_tick_runs_nothing() {
        let scheduler = ConsolidationScheduler::spawn(
            memory(),
            SchedulerConfig {
                interval: Duration::from_secs(3600),
                idle_timeout: None,
            },
        );
        assert!(scheduler.is_running());
        assert_eq!(scheduler.shutdown().await, 0);
    }
}
