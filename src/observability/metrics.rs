use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::models::location::{EndpointKind, OrderLocationSet};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub normalizations_total: IntCounterVec,
    pub estimate_updates_total: IntCounterVec,
    pub estimate_latency_seconds: HistogramVec,
    pub tracked_orders: IntGauge,
    pub positions_in_queue: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let normalizations_total = IntCounterVec::new(
            Opts::new(
                "normalizations_total",
                "Resolved endpoint source per normalized order",
            ),
            &["endpoint", "source"],
        )
        .expect("valid normalizations_total metric");

        let estimate_updates_total = IntCounterVec::new(
            Opts::new("estimate_updates_total", "Estimate updates by outcome"),
            &["outcome"],
        )
        .expect("valid estimate_updates_total metric");

        let estimate_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "estimate_latency_seconds",
                "Latency of courier position processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid estimate_latency_seconds metric");

        let tracked_orders = IntGauge::new("tracked_orders", "Orders currently under tracking")
            .expect("valid tracked_orders metric");

        let positions_in_queue =
            IntGauge::new("positions_in_queue", "Courier positions waiting for the feed")
                .expect("valid positions_in_queue metric");

        registry
            .register(Box::new(normalizations_total.clone()))
            .expect("register normalizations_total");
        registry
            .register(Box::new(estimate_updates_total.clone()))
            .expect("register estimate_updates_total");
        registry
            .register(Box::new(estimate_latency_seconds.clone()))
            .expect("register estimate_latency_seconds");
        registry
            .register(Box::new(tracked_orders.clone()))
            .expect("register tracked_orders");
        registry
            .register(Box::new(positions_in_queue.clone()))
            .expect("register positions_in_queue");

        Self {
            registry,
            normalizations_total,
            estimate_updates_total,
            estimate_latency_seconds,
            tracked_orders,
            positions_in_queue,
        }
    }

    pub fn record_normalization(&self, locations: &OrderLocationSet) {
        for kind in [EndpointKind::Pickup, EndpointKind::Delivery] {
            self.normalizations_total
                .with_label_values(&[kind.as_str(), locations.endpoint(kind).source.as_str()])
                .inc();
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
