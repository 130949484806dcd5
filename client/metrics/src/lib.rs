//! Prometheus metrics for the routing core, served over HTTP.
//!
//! All metrics are registered upfront against a single [`Registry`] to avoid
//! duplicate-registration errors. Names follow Prometheus convention:
//! counters end in `_total`, durations in `_seconds`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tracing::{error, info};

pub const METRICS_ROUTE: &str = "/metrics";

/// Named routing outcomes for `routing_records_total`'s `target` label.
pub mod target {
    pub const SHOOT: &str = "shoot";
    pub const SEED: &str = "seed";
    pub const DEFAULT: &str = "default";
    pub const DROPPED: &str = "dropped";
}

/// All metrics the routing core exposes, registered once at startup.
#[derive(Clone)]
pub struct RouterMetrics {
    registry: Registry,
    /// Current number of entries resident in a durable queue, summed across
    /// all tenant queues. Labelled by queue name.
    pub queue_size: IntGauge,
    /// Entries accepted into a durable queue.
    pub enqueued_total: IntCounter,
    /// Entries popped off a durable queue for export.
    pub dequeued_total: IntCounter,
    /// Wall-clock duration of a single `Sink::export` call, successful or not.
    pub export_duration_seconds: Histogram,
    /// Export attempts that ended in a permanent failure (records dropped).
    pub export_errors_total: IntCounter,
    /// Records routed, by tenant lifecycle state and delivery target.
    pub routing_records_total: IntCounterVec,
}

impl RouterMetrics {
    /// Registers all metrics against `registry`. Fails only if a name
    /// collides with something already registered, which would be a bug at
    /// a call site rather than a runtime condition to recover from.
    pub fn register(registry: Registry) -> Result<Self, prometheus::Error> {
        let queue_size = IntGauge::with_opts(Opts::new(
            "dque_queue_size",
            "Entries currently resident in the durable queue",
        ))?;
        registry.register(Box::new(queue_size.clone()))?;

        let enqueued_total = IntCounter::with_opts(Opts::new(
            "dque_enqueued_total",
            "Entries accepted into the durable queue",
        ))?;
        registry.register(Box::new(enqueued_total.clone()))?;

        let dequeued_total = IntCounter::with_opts(Opts::new(
            "dque_dequeued_total",
            "Entries popped off the durable queue for export",
        ))?;
        registry.register(Box::new(dequeued_total.clone()))?;

        let export_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "dque_export_duration_seconds",
                "Duration of a single batch export call",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ]),
        )?;
        registry.register(Box::new(export_duration_seconds.clone()))?;

        let export_errors_total = IntCounter::with_opts(Opts::new(
            "dque_export_errors_total",
            "Batch exports that ended in a permanent failure",
        ))?;
        registry.register(Box::new(export_errors_total.clone()))?;

        let routing_records_total = IntCounterVec::new(
            Opts::new(
                "routing_records_total",
                "Records routed, by tenant lifecycle state and delivery target",
            ),
            &["state", "target"],
        )?;
        registry.register(Box::new(routing_records_total.clone()))?;

        Ok(Self {
            registry,
            queue_size,
            enqueued_total,
            dequeued_total,
            export_duration_seconds,
            export_errors_total,
            routing_records_total,
        })
    }

    /// Convenience for the common "one record reached some delivery target
    /// while the tenant was in some lifecycle state" increment.
    pub fn record_routed(&self, state: &str, target: &str) {
        self.routing_records_total
            .with_label_values(&[state, target])
            .inc();
    }

    fn gather(&self) -> Result<Vec<u8>, prometheus::Error> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        Ok(buf)
    }
}

/// Binds a listener on `port` and serves `/metrics` until the returned task
/// is aborted or the process exits. Errors binding the port are logged, not
/// fatal: metrics are observability, not a startup dependency.
pub fn serve(metrics: RouterMetrics, port: u16) -> tokio::task::JoinHandle<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(METRICS_ROUTE, get(handle_scrape))
        .with_state(Arc::new(metrics));

    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!(%addr, %err, "failed to bind metrics listener");
                return;
            }
        };
        info!(%addr, route = METRICS_ROUTE, "metrics endpoint listening");
        if let Err(err) = axum::serve(listener, app.into_make_service()).await {
            error!(%err, "metrics server exited");
        }
    })
}

async fn handle_scrape(State(metrics): State<Arc<RouterMetrics>>) -> (StatusCode, String) {
    match metrics.gather() {
        Ok(bytes) => (StatusCode::OK, String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        ),
    }
}
