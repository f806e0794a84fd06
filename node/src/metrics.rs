//! # Prometheus Metrics
//!
//! Counters for the things an operator cares about: wallets made, tokens
//! minted, airdrops asked for, and where token creation falls over. Served
//! on their own port at `/metrics`.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] with the
//! `mintforge` prefix.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Every metric handle the node records into.
///
/// Prometheus handles are `Arc`s internally, so cloning is cheap.
#[derive(Clone)]
pub struct ForgeMetrics {
    registry: Registry,
    /// Wallets written to the keystore (directly or during token creation).
    pub wallets_generated_total: IntCounter,
    /// Tokens created and registered, by network.
    pub tokens_created_total: IntCounterVec,
    /// Tokens registered through `/save-token`, by network.
    pub tokens_saved_total: IntCounterVec,
    /// Airdrop requests, by outcome (`ok`, `forbidden`, `rate_limited`, `error`).
    pub airdrops_total: IntCounterVec,
    /// Failed token creations, by the last state reached.
    pub provision_failures_total: IntCounterVec,
    /// HTTP requests, by route and status code.
    pub http_requests_total: IntCounterVec,
    /// Wall time of `/create-token`, success or not.
    pub provision_duration_seconds: Histogram,
}

impl ForgeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("mintforge".into()), None)?;

        let wallets_generated_total =
            IntCounter::new("wallets_generated_total", "Wallets generated and stored")?;
        registry.register(Box::new(wallets_generated_total.clone()))?;

        let tokens_created_total = IntCounterVec::new(
            Opts::new("tokens_created_total", "Tokens created and registered"),
            &["network"],
        )?;
        registry.register(Box::new(tokens_created_total.clone()))?;

        let tokens_saved_total = IntCounterVec::new(
            Opts::new("tokens_saved_total", "Token records saved by clients"),
            &["network"],
        )?;
        registry.register(Box::new(tokens_saved_total.clone()))?;

        let airdrops_total = IntCounterVec::new(
            Opts::new("airdrops_total", "Airdrop requests by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(airdrops_total.clone()))?;

        let provision_failures_total = IntCounterVec::new(
            Opts::new(
                "provision_failures_total",
                "Token creations that failed, by last state reached",
            ),
            &["state"],
        )?;
        registry.register(Box::new(provision_failures_total.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests served"),
            &["route", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        // Token creation is four confirmed transactions; expect seconds, not millis.
        let provision_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "provision_duration_seconds",
                "Time spent in token creation, in seconds",
            )
            .buckets(vec![0.05, 0.25, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 80.0]),
        )?;
        registry.register(Box::new(provision_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            wallets_generated_total,
            tokens_created_total,
            tokens_saved_total,
            airdrops_total,
            provision_failures_total,
            http_requests_total,
            provision_duration_seconds,
        })
    }

    /// Encodes all registered metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<ForgeMetrics>;

/// `GET /metrics` in Prometheus text format. 500 if encoding fails.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_prefix_and_labels() {
        let metrics = ForgeMetrics::new().unwrap();
        metrics.wallets_generated_total.inc();
        metrics.tokens_created_total.with_label_values(&["devnet"]).inc();
        metrics.provision_failures_total.with_label_values(&["mint_created"]).inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("mintforge_wallets_generated_total 1"));
        assert!(text.contains("mintforge_tokens_created_total{network=\"devnet\"} 1"));
        assert!(text.contains("mintforge_provision_failures_total{state=\"mint_created\"} 1"));
    }

    #[test]
    fn registries_are_independent() {
        let a = ForgeMetrics::new().unwrap();
        let b = ForgeMetrics::new().unwrap();
        a.wallets_generated_total.inc();
        assert_eq!(b.wallets_generated_total.get(), 0);
    }
}
