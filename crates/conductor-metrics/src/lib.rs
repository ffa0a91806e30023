//! ---
//! cnd_section: "06-observability"
//! cnd_subsection: "module"
//! cnd_type: "source"
//! cnd_scope: "code"
//! cnd_description: "Metrics collection and export utilities."
//! cnd_version: "v0.1.0"
//! cnd_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across components.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape endpoint. Returns `text/plain` metrics even on large registries.
async fn metrics_handler(registry: SharedRegistry) -> Response {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "conductord_starts_total",
            "Total number of times the Conductor daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "conductord_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new(
                "conductord_build_info",
                "Build metadata for the running daemon binary",
            ),
            &["version", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
            build_info,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, profile])
            .set(1.0);
    }
}

/// Metrics recorded by the lifecycle orchestrator.
#[derive(Clone, Debug)]
pub struct OrchestratorMetrics {
    registry: SharedRegistry,
    subsystems_total: IntGauge,
    operational: IntGauge,
    degraded: IntGauge,
    transitions: IntCounterVec,
    health_outcomes: IntCounterVec,
    snapshot_sequence: IntGauge,
    checkpoint_failures: IntCounterVec,
}

impl OrchestratorMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let subsystems_total = IntGauge::with_opts(Opts::new(
            "conductor_subsystems_total",
            "Number of subsystems registered with the orchestrator",
        ))?;
        registry.register(Box::new(subsystems_total.clone()))?;

        let operational = IntGauge::with_opts(Opts::new(
            "conductor_subsystems_operational",
            "Number of subsystems currently operational",
        ))?;
        registry.register(Box::new(operational.clone()))?;

        let degraded = IntGauge::with_opts(Opts::new(
            "conductor_subsystems_degraded",
            "Number of subsystems currently degraded",
        ))?;
        registry.register(Box::new(degraded.clone()))?;

        let transitions = IntCounterVec::new(
            Opts::new(
                "conductor_lifecycle_transitions_total",
                "Count of lifecycle transitions by subsystem and resulting state",
            ),
            &["subsystem", "to"],
        )?;
        registry.register(Box::new(transitions.clone()))?;

        let health_outcomes = IntCounterVec::new(
            Opts::new(
                "conductor_health_outcomes_total",
                "Count of monitoring sweep verdicts by subsystem and outcome",
            ),
            &["subsystem", "outcome"],
        )?;
        registry.register(Box::new(health_outcomes.clone()))?;

        let snapshot_sequence = IntGauge::with_opts(Opts::new(
            "conductor_snapshot_sequence",
            "Sequence number of the most recent checkpoint sweep",
        ))?;
        registry.register(Box::new(snapshot_sequence.clone()))?;

        let checkpoint_failures = IntCounterVec::new(
            Opts::new(
                "conductor_checkpoint_failures_total",
                "Count of failed checkpoint calls by subsystem",
            ),
            &["subsystem"],
        )?;
        registry.register(Box::new(checkpoint_failures.clone()))?;

        Ok(Self {
            registry,
            subsystems_total,
            operational,
            degraded,
            transitions,
            health_outcomes,
            snapshot_sequence,
            checkpoint_failures,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn set_subsystem_count(&self, count: usize) {
        self.subsystems_total.set(count as i64);
    }

    pub fn set_operational(&self, count: usize) {
        self.operational.set(count as i64);
    }

    pub fn set_degraded(&self, count: usize) {
        self.degraded.set(count as i64);
    }

    pub fn record_transition(&self, subsystem: &str, to: &str) {
        self.transitions.with_label_values(&[subsystem, to]).inc();
    }

    pub fn record_health_outcome(&self, subsystem: &str, outcome: &str) {
        self.health_outcomes
            .with_label_values(&[subsystem, outcome])
            .inc();
    }

    pub fn set_snapshot_sequence(&self, sequence: u64) {
        self.snapshot_sequence.set(sequence as i64);
    }

    pub fn record_checkpoint_failure(&self, subsystem: &str) {
        self.checkpoint_failures.with_label_values(&[subsystem]).inc();
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn scrape_endpoint_encodes_registered_metrics() {
        let registry = new_registry();
        let metrics = DaemonMetrics::new(registry.clone()).unwrap();
        metrics.inc_start();

        let response = metrics_handler(registry).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            &HeaderValue::from_static(prometheus::TEXT_FORMAT)
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("conductord_starts_total 1"));
    }

    #[tokio::test]
    async fn scrape_endpoint_handles_an_empty_registry() {
        let response = metrics_handler(new_registry()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
