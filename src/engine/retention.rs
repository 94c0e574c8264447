use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::engine::store::prune;
use crate::state::AppState;

/// Periodically evicts closed orders and silent couriers older than `retention`.
pub async fn run_retention_sweep(
    state: Arc<AppState>,
    interval: std::time::Duration,
    retention: Duration,
) {
    info!(retention_secs = retention.num_seconds(), "retention sweep started");

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let report = prune(&state, Utc::now(), retention);
        if report.orders > 0 || report.couriers > 0 {
            info!(orders = report.orders, couriers = report.couriers, "evicted expired slots");
        } else {
            debug!("retention sweep found nothing to evict");
        }
    }
}
