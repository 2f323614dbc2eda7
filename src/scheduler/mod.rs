use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::export::health::HealthMetrics;
use crate::feed::EventFeed;
use crate::store::SnapshotStore;

/// Drives periodic retrieval from the event feed into the snapshot store.
///
/// `start` performs one immediate fetch, then re-fetches on a fixed
/// interval. Fetches are serialized: each one is awaited inside the loop
/// before the next tick can fire, so at most one is ever in flight and
/// store writes land in fetch-completion order. (The dashboard this
/// replaces re-fired on a wall-clock timer regardless of completion, which
/// could install a slow stale fetch over a fresh one; serializing removes
/// that window.) A failed fetch is logged and leaves the snapshot
/// untouched; the schedule continues.
///
/// `stop` is terminal for the instance: the loop exits, an in-flight fetch
/// is abandoned before it can write, and a later `start` on the same
/// instance is a no-op. Create a new scheduler to run again.
pub struct RefreshScheduler {
    store: Arc<SnapshotStore>,
    health: Option<Arc<HealthMetrics>>,
    running: AtomicBool,
    cancel: CancellationToken,
    task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RefreshScheduler {
    /// Creates an idle scheduler writing into `store`.
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self {
            store,
            health: None,
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            task: parking_lot::Mutex::new(None),
        }
    }

    /// Attach health metrics updated on every refresh cycle.
    pub fn with_health(mut self, health: Arc<HealthMetrics>) -> Self {
        self.health = Some(health);
        self
    }

    /// Start the background refresh loop.
    ///
    /// The first fetch happens immediately; subsequent fetches follow every
    /// `interval`. Ticks that elapse while a fetch is still in flight are
    /// skipped. Calling `start` a second time (or after `stop`) is a no-op.
    pub fn start<F>(&self, feed: F, interval: Duration)
    where
        F: EventFeed + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return; // Already running or already stopped.
        }

        let store = Arc::clone(&self.store);
        let health = self.health.clone();
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("refresh loop stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        // Race the fetch against cancellation so a stopped
                        // scheduler never installs a late result.
                        let fetched = tokio::select! {
                            _ = cancel.cancelled() => {
                                debug!("refresh loop stopped mid-fetch");
                                return;
                            }
                            fetched = feed.fetch_events() => fetched,
                        };

                        match fetched {
                            Ok(events) => {
                                let count = events.len();
                                store.replace(events);

                                if let Some(health) = &health {
                                    health.snapshot_refreshes.inc();
                                    health.snapshot_events.set(count as f64);
                                    health.last_refresh_unix.set(unix_now_secs());
                                }

                                debug!(count, "snapshot refreshed");
                            }
                            Err(e) => {
                                if let Some(health) = &health {
                                    health.refresh_failures.inc();
                                }

                                warn!(error = %e, "event feed refresh failed");
                            }
                        }
                    }
                }
            }
        });

        *self.task.lock() = Some(handle);
    }

    /// Stop the refresh loop and wait for it to finish.
    ///
    /// Guarantees no further snapshot writes once this returns, including
    /// from a fetch that was in flight when `stop` was called. Safe to call
    /// multiple times and without a prior `start`.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.running.store(true, Ordering::SeqCst);

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "refresh task join failed");
            }
        }
    }
}

fn unix_now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use anyhow::bail;

    use super::*;
    use crate::feed::event::EventRecord;

    fn record(id: &str) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            ..EventRecord::default()
        }
    }

    /// Feed that always returns the same batch and counts invocations.
    struct ConstantFeed {
        batch: Vec<EventRecord>,
        calls: Arc<AtomicUsize>,
    }

    impl EventFeed for ConstantFeed {
        async fn fetch_events(&self) -> anyhow::Result<Vec<EventRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.batch.clone())
        }
    }

    /// Feed that always fails.
    struct FailingFeed;

    impl EventFeed for FailingFeed {
        async fn fetch_events(&self) -> anyhow::Result<Vec<EventRecord>> {
            bail!("feed unavailable")
        }
    }

    /// Feed that succeeds only after a delay.
    struct SlowFeed {
        delay: Duration,
    }

    impl EventFeed for SlowFeed {
        async fn fetch_events(&self) -> anyhow::Result<Vec<EventRecord>> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![record("late")])
        }
    }

    #[tokio::test]
    async fn test_first_fetch_is_immediate() {
        let store = Arc::new(SnapshotStore::new());
        let scheduler = RefreshScheduler::new(Arc::clone(&store));
        let calls = Arc::new(AtomicUsize::new(0));

        scheduler.start(
            ConstantFeed {
                batch: vec![record("a"), record("b")],
                calls: Arc::clone(&calls),
            },
            // Long interval: only the immediate first tick fires in this test.
            Duration::from_secs(60),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_refetches_on_interval() {
        let store = Arc::new(SnapshotStore::new());
        let scheduler = RefreshScheduler::new(Arc::clone(&store));
        let calls = Arc::new(AtomicUsize::new(0));

        scheduler.start(
            ConstantFeed {
                batch: vec![record("a")],
                calls: Arc::clone(&calls),
            },
            Duration::from_millis(20),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.stop().await;

        assert!(
            calls.load(Ordering::SeqCst) >= 3,
            "expected several fetches, got {}",
            calls.load(Ordering::SeqCst),
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_feed_leaves_snapshot_untouched() {
        let store = Arc::new(SnapshotStore::new());
        store.replace(vec![record("existing")]);

        let scheduler = RefreshScheduler::new(Arc::clone(&store));
        scheduler.start(FailingFeed, Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        // Every cycle failed; the prior snapshot survives and nothing panicked.
        let snapshot = store.current();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "existing");
    }

    #[tokio::test]
    async fn test_stop_suppresses_in_flight_fetch() {
        let store = Arc::new(SnapshotStore::new());
        let scheduler = RefreshScheduler::new(Arc::clone(&store));

        scheduler.start(
            SlowFeed {
                delay: Duration::from_millis(200),
            },
            Duration::from_secs(60),
        );

        // Stop while the first fetch is still sleeping.
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.stop().await;

        // Give the abandoned fetch time to have resolved, had it survived.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(store.is_empty(), "stopped scheduler must never write");
    }

    #[tokio::test]
    async fn test_fetches_never_overlap() {
        struct OverlapProbe {
            in_flight: Arc<AtomicUsize>,
            max_seen: Arc<AtomicUsize>,
        }

        impl EventFeed for OverlapProbe {
            async fn fetch_events(&self) -> anyhow::Result<Vec<EventRecord>> {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
        }

        let store = Arc::new(SnapshotStore::new());
        let scheduler = RefreshScheduler::new(Arc::clone(&store));
        let max_seen = Arc::new(AtomicUsize::new(0));

        // Interval far shorter than the fetch: ticks pile up while a fetch
        // is in flight and must be skipped, not stacked.
        scheduler.start(
            OverlapProbe {
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_seen: Arc::clone(&max_seen),
            },
            Duration::from_millis(5),
        );

        tokio::time::sleep(Duration::from_millis(250)).await;
        scheduler.stop().await;

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_safe_without_start() {
        let store = Arc::new(SnapshotStore::new());

        let never_started = RefreshScheduler::new(Arc::clone(&store));
        never_started.stop().await;
        never_started.stop().await;

        let scheduler = RefreshScheduler::new(Arc::clone(&store));
        scheduler.start(FailingFeed, Duration::from_millis(10));
        scheduler.stop().await;
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_start_after_stop_is_a_noop() {
        let store = Arc::new(SnapshotStore::new());
        let scheduler = RefreshScheduler::new(Arc::clone(&store));
        let calls = Arc::new(AtomicUsize::new(0));

        scheduler.stop().await;
        scheduler.start(
            ConstantFeed {
                batch: vec![record("a")],
                calls: Arc::clone(&calls),
            },
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(store.is_empty());
    }
}
