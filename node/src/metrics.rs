//! # Prometheus Metrics
//!
//! Exposes operational metrics for the vault node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use arca_protocol::Amount;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct VaultMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Committed operations, labeled by operation name.
    pub operations_total: IntCounterVec,
    /// Rejected or rolled-back operations, labeled by error code.
    pub operation_failures_total: IntCounterVec,
    /// Strategy valuation after the last committed operation.
    pub total_assets: IntGauge,
    /// Share supply after the last committed operation.
    pub total_shares: IntGauge,
    /// Handler-side latency of vault operations in seconds.
    pub operation_latency_seconds: HistogramVec,
}

impl VaultMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("arca".into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Total number of committed vault operations"),
            &["operation"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_failures_total = IntCounterVec::new(
            Opts::new(
                "operation_failures_total",
                "Total number of failed vault operations by error code",
            ),
            &["code"],
        )?;
        registry.register(Box::new(operation_failures_total.clone()))?;

        let total_assets = IntGauge::new("total_assets", "Assets reported by the active strategy")?;
        registry.register(Box::new(total_assets.clone()))?;

        let total_shares = IntGauge::new("total_shares", "Outstanding vault shares")?;
        registry.register(Box::new(total_shares.clone()))?;

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
            total_assets,
            total_shares,
            operation_latency_seconds,
        })
    }

    /// Updates the supply gauges. Values above `i64::MAX` saturate.
    pub fn record_supply(&self, total_assets: Amount, total_shares: Amount) {
        self.total_assets.set(saturating_i64(total_assets));
        self.total_shares.set(saturating_i64(total_shares));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn saturating_i64(value: Amount) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<VaultMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
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
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
