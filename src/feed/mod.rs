pub mod event;

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::config::FeedConfig;

use self::event::EventRecord;

/// Callback type for recording feed request metrics.
/// The callback receives (status, duration).
pub type MetricsCallback = Box<dyn Fn(&str, Duration) + Send + Sync>;

/// Event feed collaborator: anything that can produce the current event set.
///
/// The scheduler treats implementations as opaque; a fetch either yields the
/// full ordered event sequence (newest-first) or fails as a unit.
pub trait EventFeed: Send + Sync {
    /// Fetch the current event set from the feed.
    fn fetch_events(&self) -> impl std::future::Future<Output = Result<Vec<EventRecord>>> + Send;
}

/// HTTP-based event feed client for the collector API.
pub struct Client {
    http: reqwest::Client,
    endpoint: String,
    limit: usize,
    metrics: Option<MetricsCallback>,
}

impl Client {
    /// Create a new feed client.
    pub fn new(cfg: &FeedConfig) -> Result<Self> {
        let timeout = if cfg.timeout.is_zero() {
            Duration::from_secs(10)
        } else {
            cfg.timeout
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            http,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            limit: cfg.limit,
            metrics: None,
        })
    }

    /// Set a metrics callback for recording request stats.
    /// The callback receives (status, duration).
    pub fn with_metrics(mut self, cb: MetricsCallback) -> Self {
        self.metrics = Some(cb);
        self
    }

    /// Record a request metric.
    fn record_request(&self, status: &str, duration: Duration) {
        if let Some(ref cb) = self.metrics {
            cb(status, duration);
        }
    }
}

impl EventFeed for Client {
    async fn fetch_events(&self) -> Result<Vec<EventRecord>> {
        debug!(limit = self.limit, "fetching events");

        let start = Instant::now();
        let url = format!("{}/api/events?limit={}", self.endpoint, self.limit);

        let response = match self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.record_request("error", start.elapsed());
                return Err(e).context("requesting events");
            }
        };

        let status_code = response.status();

        if !status_code.is_success() {
            let body = response.text().await.unwrap_or_default();
            self.record_request("error", start.elapsed());
            bail!("unexpected status {} from event feed: {}", status_code, body);
        }

        let events: Vec<EventRecord> = match response.json().await {
            Ok(events) => events,
            Err(e) => {
                self.record_request("error", start.elapsed());
                return Err(e).context("decoding event feed response");
            }
        };

        self.record_request("success", start.elapsed());
        debug!(count = events.len(), "fetched events");

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_config(endpoint: &str) -> FeedConfig {
        FeedConfig {
            endpoint: endpoint.to_string(),
            timeout: Duration::from_secs(5),
            limit: 100,
        }
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client =
            Client::new(&feed_config("http://127.0.0.1:8000/")).expect("client should build");
        assert_eq!(client.endpoint, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_client_accepts_zero_timeout() {
        let mut cfg = feed_config("http://127.0.0.1:8000");
        cfg.timeout = Duration::ZERO;
        // Zero falls back to the default timeout rather than failing.
        assert!(Client::new(&cfg).is_ok());
    }

    #[test]
    fn test_events_decode_from_feed_payload() {
        // Shape of the collector's list response: a flat JSON array.
        let body = r#"[
            {"id": "1", "timestamp": "2024-01-01T10:00:00Z", "src_ip": "1.2.3.4", "command": "ls"},
            {"id": "2", "src_ip": null}
        ]"#;

        let events: Vec<EventRecord> = serde_json::from_str(body).expect("decode feed payload");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].command.as_deref(), Some("ls"));
        assert!(events[1].src_ip.is_none());
    }
}
