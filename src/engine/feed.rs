use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::engine::store::apply_courier_position;
use crate::error::AppError;
use crate::state::AppState;

/// Consumes courier ids whose position changed and refreshes their orders.
///
/// Each notification reads the latest stored position, so a burst of readings
/// for one courier collapses onto the freshest value.
pub async fn run_position_feed(state: Arc<AppState>, mut position_rx: mpsc::Receiver<String>) {
    info!("position feed started");

    while let Some(courier_id) = position_rx.recv().await {
        state.metrics.positions_in_queue.dec();

        let start = Instant::now();
        let results = apply_courier_position(&state, &courier_id, Utc::now());
        let elapsed = start.elapsed().as_secs_f64();

        for result in &results {
            state
                .metrics
                .estimate_latency_seconds
                .with_label_values(&[result.outcome])
                .observe(elapsed);
        }

        debug!(courier_id = %courier_id, orders = results.len(), "courier position applied");
    }

    warn!("position feed stopped: queue channel closed");
}

/// Schedules a recompute for the courier without waiting on the feed.
///
/// A full queue drops the notification; the position itself is already stored
/// and the courier's next reading schedules it again.
pub fn enqueue_position(state: &AppState, courier_id: &str) -> Result<(), AppError> {
    match state.position_tx.try_send(courier_id.to_string()) {
        Ok(()) => {
            state.metrics.positions_in_queue.inc();
            Ok(())
        }
        Err(TrySendError::Full(_)) => {
            warn!(courier_id, "position queue full; notification dropped");
            Ok(())
        }
        Err(TrySendError::Closed(_)) => Err(AppError::Internal(
            "position queue closed".to_string(),
        )),
    }
}
