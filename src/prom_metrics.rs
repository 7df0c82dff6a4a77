//! # Prometheus Metrics: Exposition for Container Orchestration
//!
//! Exposes adserve operational metrics in the OpenMetrics text format.
//!
//! ## Metrics Exposed
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `adserve_ads_served_total` | Counter | | Ads returned to clients |
//! | `adserve_ads_not_found_total` | Counter | | Selections that found nothing to show |
//! | `adserve_clicks_recorded_total` | Counter | | Clicks accepted by the ledger |
//! | `adserve_click_conflicts_total` | Counter | `reason` | Clicks rejected by the ledger |
//! | `adserve_adaptive_threshold` | Gauge | | Current score cutoff |
//! | `adserve_current_day` | Gauge | | Simulated day |
//! | `adserve_http_request_duration_seconds` | Histogram | `method`, `path` | Request latency |
//!
//! The `/metrics` endpoint renders the current registry state on each scrape.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

/// Why the ledger refused a click.
#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct ConflictLabel {
    pub reason: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

/// Thread-safe metrics registry for one adserve process.
pub struct Metrics {
    pub registry: Registry,
    pub ads_served: Counter,
    pub ads_not_found: Counter,
    pub clicks_recorded: Counter,
    pub click_conflicts: Family<ConflictLabel, Counter>,
    pub adaptive_threshold: Gauge<f64, AtomicU64>,
    pub current_day: Gauge,
    pub http_request_duration: Family<HttpLabel, Histogram>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let ads_served = Counter::default();
        registry.register("adserve_ads_served", "Ads returned to clients", ads_served.clone());

        let ads_not_found = Counter::default();
        registry.register(
            "adserve_ads_not_found",
            "Ad selections that found no campaign to show",
            ads_not_found.clone(),
        );

        let clicks_recorded = Counter::default();
        registry.register(
            "adserve_clicks_recorded",
            "Clicks accepted by the ledger",
            clicks_recorded.clone(),
        );

        let click_conflicts = Family::<ConflictLabel, Counter>::default();
        registry.register(
            "adserve_click_conflicts",
            "Clicks rejected by the ledger by reason",
            click_conflicts.clone(),
        );

        let adaptive_threshold = Gauge::<f64, AtomicU64>::default();
        registry.register(
            "adserve_adaptive_threshold",
            "Current adaptive score threshold",
            adaptive_threshold.clone(),
        );

        let current_day = Gauge::default();
        registry.register("adserve_current_day", "Simulated current day", current_day.clone());

        // 1ms .. ~2s
        let latency: fn() -> Histogram = || Histogram::new(exponential_buckets(0.001, 2.0, 12));
        let http_request_duration = Family::<HttpLabel, Histogram>::new_with_constructor(latency);
        registry.register(
            "adserve_http_request_duration_seconds",
            "HTTP request latency by method and path",
            http_request_duration.clone(),
        );

        Self {
            registry,
            ads_served,
            ads_not_found,
            clicks_recorded,
            click_conflicts,
            adaptive_threshold,
            current_day,
            http_request_duration,
        }
    }

    pub fn record_click_conflict(&self, reason: &str) {
        self.click_conflicts
            .get_or_create(&ConflictLabel {
                reason: reason.to_string(),
            })
            .inc();
    }

    /// Render all metrics in OpenMetrics text format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        // Writing into a String cannot fail.
        let _ = encode(&mut buf, &self.registry);
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
