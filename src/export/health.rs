use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::aggregate;
use crate::store::SnapshotStore;

/// Default number of records returned by /api/events.
const DEFAULT_RECENT_LIMIT: usize = 50;

/// Prometheus metrics for monitor health, plus the JSON read boundary the
/// rendering layer consumes.
///
/// All metrics use the "hivewatch" namespace. The server exposes:
/// - `/healthz` — liveness probe
/// - `/metrics` — Prometheus text format
/// - `/api/views` — derived views over the current snapshot
/// - `/api/events?limit=` — newest records, default 50
pub struct HealthMetrics {
    registry: Registry,
    addr: String,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,

    /// Feed requests by status (success/error).
    pub feed_requests_total: CounterVec,
    /// Feed request duration.
    pub feed_request_duration: Histogram,
    /// Total successful snapshot refreshes.
    pub snapshot_refreshes: Counter,
    /// Total failed refresh cycles.
    pub refresh_failures: Counter,
    /// Events in the current snapshot.
    pub snapshot_events: Gauge,
    /// Unix time of the last successful refresh.
    pub last_refresh_unix: Gauge,
}

impl HealthMetrics {
    /// Creates a new health metrics instance with all metrics registered.
    pub fn new(addr: &str) -> Result<Self> {
        let registry = Registry::new();

        let feed_requests_total = CounterVec::new(
            Opts::new("feed_requests_total", "Feed requests by status.").namespace("hivewatch"),
            &["status"],
        )?;
        let feed_request_duration = Histogram::with_opts(
            HistogramOpts::new("feed_request_duration_seconds", "Feed request duration.")
                .namespace("hivewatch"),
        )?;
        let snapshot_refreshes = Counter::with_opts(
            Opts::new(
                "snapshot_refreshes_total",
                "Total successful snapshot refreshes.",
            )
            .namespace("hivewatch"),
        )?;
        let refresh_failures = Counter::with_opts(
            Opts::new("refresh_failures_total", "Total failed refresh cycles.")
                .namespace("hivewatch"),
        )?;
        let snapshot_events = Gauge::with_opts(
            Opts::new("snapshot_events", "Events in the current snapshot.").namespace("hivewatch"),
        )?;
        let last_refresh_unix = Gauge::with_opts(
            Opts::new(
                "last_refresh_timestamp_seconds",
                "Unix time of the last successful refresh.",
            )
            .namespace("hivewatch"),
        )?;

        registry.register(Box::new(feed_requests_total.clone()))?;
        registry.register(Box::new(feed_request_duration.clone()))?;
        registry.register(Box::new(snapshot_refreshes.clone()))?;
        registry.register(Box::new(refresh_failures.clone()))?;
        registry.register(Box::new(snapshot_events.clone()))?;
        registry.register(Box::new(last_refresh_unix.clone()))?;

        Ok(Self {
            registry,
            addr: addr.to_string(),
            shutdown: parking_lot::Mutex::new(None),
            feed_requests_total,
            feed_request_duration,
            snapshot_refreshes,
            refresh_failures,
            snapshot_events,
            last_refresh_unix,
        })
    }

    /// Start the API server, serving metrics and the snapshot read routes.
    pub async fn start(&self, store: Arc<SnapshotStore>) -> Result<()> {
        let addr = if self.addr.is_empty() {
            ":9090"
        } else {
            &self.addr
        };

        // Parse address, handling ":port" shorthand.
        let bind_addr = if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        };

        let app_state = Arc::new(AppState {
            registry: self.registry.clone(),
            store,
        });

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(healthz_handler))
            .route("/api/views", get(views_handler))
            .route("/api/events", get(events_handler))
            .with_state(app_state);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("listening on {bind_addr}"))?;

        let local_addr = listener.local_addr().context("getting local address")?;

        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            tracing::info!(addr = %local_addr, "api server started");

            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
            })
            .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "api server error");
            }
        });

        Ok(())
    }

    /// Stop the API server.
    pub async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }

        Ok(())
    }
}

/// Shared state for axum handlers.
struct AppState {
    registry: Registry,
    store: Arc<SnapshotStore>,
}

/// GET /metrics - Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "encoding metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "encoding error".to_string(),
        );
    }

    match String::from_utf8(buffer) {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            tracing::error!(error = %e, "converting metrics to string");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encoding error".to_string(),
            )
        }
    }
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}

/// GET /api/views - Derived views over the current snapshot.
async fn views_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.store.current();
    Json(aggregate::derive(&snapshot))
}

/// Query parameters for /api/events.
#[derive(serde::Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

/// GET /api/events - Newest records from the current snapshot.
async fn events_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    Json(state.store.recent(limit))
}
