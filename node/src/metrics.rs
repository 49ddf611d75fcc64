//! # Prometheus Metrics
//!
//! Operational metrics for the vault node, scraped by Prometheus at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

use payvault_contracts::VaultError;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Vault operations attempted, by operation.
    pub operations_total: IntCounterVec,
    /// Vault operations rejected, by operation and error kind.
    pub operation_failures_total: IntCounterVec,
    /// Vaults currently open.
    pub vaults_open: IntGauge,
    /// Time spent inside the vault program, by operation.
    pub operation_latency_seconds: HistogramVec,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("payvault".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Total vault operations attempted"),
            &["operation"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_failures_total = IntCounterVec::new(
            Opts::new(
                "operation_failures_total",
                "Total vault operations rejected, by error kind",
            ),
            &["operation", "error"],
        )?;
        registry.register(Box::new(operation_failures_total.clone()))?;

        let vaults_open = IntGauge::new("vaults_open", "Number of currently open vaults")?;
        registry.register(Box::new(vaults_open.clone()))?;

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Vault operation latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            operation_failures_total,
            vaults_open,
            operation_latency_seconds,
        })
    }

    /// Records the outcome of one vault operation.
    pub fn observe<T>(&self, operation: &str, result: &Result<T, VaultError>, elapsed: Duration) {
        self.operations_total.with_label_values(&[operation]).inc();
        self.operation_latency_seconds
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
        if let Err(e) = result {
            self.operation_failures_total
                .with_label_values(&[operation, e.kind()])
                .inc();
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
