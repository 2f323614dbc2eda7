use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregate;
use crate::config::Config;
use crate::export::health::HealthMetrics;
use crate::feed;
use crate::scheduler::RefreshScheduler;
use crate::store::SnapshotStore;

/// Monitor orchestrates all components: feed client, snapshot store,
/// refresh scheduler, and the API/health server.
pub struct Monitor {
    cfg: Config,
    health: Arc<HealthMetrics>,
    store: Arc<SnapshotStore>,
    scheduler: Option<Arc<RefreshScheduler>>,
    cancel: CancellationToken,
}

impl Monitor {
    /// Creates a new Monitor, initializing health metrics.
    pub fn new(cfg: Config) -> Result<Self> {
        let health =
            Arc::new(HealthMetrics::new(&cfg.api.addr).context("creating health metrics")?);

        Ok(Self {
            cfg,
            health,
            store: Arc::new(SnapshotStore::new()),
            scheduler: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Start all components and begin refreshing.
    pub async fn start(&mut self) -> Result<()> {
        // 1. Start the API server so probes respond before the first fetch.
        self.health
            .start(Arc::clone(&self.store))
            .await
            .context("starting api server")?;

        // 2. Create the feed client with metrics callback.
        let feed = self.create_feed_client()?;

        // 3. Start the refresh scheduler (performs the immediate first fetch).
        let scheduler = Arc::new(
            RefreshScheduler::new(Arc::clone(&self.store))
                .with_health(Arc::clone(&self.health)),
        );
        scheduler.start(feed, self.cfg.refresh.interval);
        self.scheduler = Some(scheduler);

        info!(
            endpoint = %self.cfg.feed.endpoint,
            interval = ?self.cfg.refresh.interval,
            "refresh scheduler started",
        );

        // 4. Start the background snapshot stats reporter.
        self.spawn_stats_reporter();

        info!("monitor fully started");

        Ok(())
    }

    /// Gracefully stop all components.
    pub async fn stop(&mut self) -> Result<()> {
        // Signal background tasks to stop.
        self.cancel.cancel();

        // Stop the scheduler first so no further snapshot writes occur.
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop().await;
        }

        // Stop the API server.
        self.health.stop().await?;

        Ok(())
    }

    /// Create a feed client with metrics callback.
    fn create_feed_client(&self) -> Result<feed::Client> {
        let client = feed::Client::new(&self.cfg.feed).context("creating feed client")?;

        let health = Arc::clone(&self.health);
        let client = client.with_metrics(Box::new(move |status, duration| {
            health.feed_requests_total.with_label_values(&[status]).inc();
            health.feed_request_duration.observe(duration.as_secs_f64());
        }));

        Ok(client)
    }

    /// Spawn background snapshot stats reporter.
    fn spawn_stats_reporter(&self) {
        let cancel = self.cancel.clone();
        let store = Arc::clone(&self.store);
        let report_interval = self.cfg.stats_report_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(report_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let snapshot = store.current();

                        if snapshot.is_empty() {
                            continue;
                        }

                        let views = aggregate::derive(&snapshot);

                        info!(
                            events = views.total_count,
                            unique_sources = views.unique_source_count,
                            days = views.daily_histogram.len(),
                            latest = %views.latest_timestamp_display,
                            "snapshot stats",
                        );

                        for entry in &views.top_commands {
                            debug!(
                                command = %entry.command,
                                count = entry.count,
                                "  by command",
                            );
                        }
                    }
                }
            }
        });
    }
}
