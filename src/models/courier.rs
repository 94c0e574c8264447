use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::GeoError;
use crate::geo::GeoPoint;

/// Latest known courier location. Read-only input to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CourierPosition {
    pub point: GeoPoint,
    pub accuracy_meters: f64,
    pub observed_at: DateTime<Utc>,
}

impl CourierPosition {
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        now - self.observed_at > stale_after
    }
}

/// Per-courier slot: the current position and where the last nearby-orders
/// re-fetch was suggested from.
#[derive(Debug, Clone, Copy)]
pub struct CourierSlot {
    pub position: CourierPosition,
    pub refetch_anchor: GeoPoint,
}

/// Position reading as sent by the location-tracking collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct CourierPositionReport {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub timestamp: Option<ObservedAt>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ObservedAt {
    EpochMillis(f64),
    Rfc3339(DateTime<Utc>),
}

impl CourierPositionReport {
    /// Validates the reading; a missing timestamp means it was observed `now`.
    pub fn into_position(self, now: DateTime<Utc>) -> Result<CourierPosition, GeoError> {
        let point = GeoPoint::new(self.latitude, self.longitude);
        point.validate()?;

        let observed_at = match self.timestamp {
            Some(ObservedAt::EpochMillis(millis)) => epoch_millis(millis).unwrap_or_else(|| {
                warn!(millis, "unusable position timestamp; using receive time");
                now
            }),
            Some(ObservedAt::Rfc3339(at)) => at,
            None => now,
        };

        Ok(CourierPosition {
            point,
            accuracy_meters: self.accuracy.max(0.0),
            observed_at,
        })
    }
}

fn epoch_millis(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64)
}
