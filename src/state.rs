use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::engine::tracker::EstimateTracker;
use crate::models::courier::CourierSlot;
use crate::models::tracking::TrackedOrder;
use crate::observability::metrics::Metrics;

/// Authoritative keyed store. Each order id owns exactly one tracking slot and
/// every write to it happens under that id's map entry.
pub struct AppState {
    pub orders: DashMap<String, TrackedOrder>,
    pub couriers: DashMap<String, CourierSlot>,
    pub position_tx: mpsc::Sender<String>,
    pub tracker: EstimateTracker,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(engine: EngineConfig, position_queue_size: usize) -> (Self, mpsc::Receiver<String>) {
        let (position_tx, position_rx) = mpsc::channel(position_queue_size);

        (
            Self {
                orders: DashMap::new(),
                couriers: DashMap::new(),
                position_tx,
                tracker: EstimateTracker::new(engine),
                metrics: Metrics::new(),
            },
            position_rx,
        )
    }
}
