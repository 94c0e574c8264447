use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{Cardinal, GeoPoint};
use crate::models::location::{LocationSource, OrderLocationSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPhase {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    PickedUp,
    OnTheWay,
    Delivered,
    Cancelled,
}

impl OrderPhase {
    /// Parses an order-service status string, tolerating case and separators.
    pub fn parse(status: &str) -> Option<Self> {
        let normalized: String = status
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect();

        match normalized.as_str() {
            "pending" => Some(OrderPhase::Pending),
            "confirmed" | "accepted" => Some(OrderPhase::Confirmed),
            "preparing" => Some(OrderPhase::Preparing),
            "ready" => Some(OrderPhase::Ready),
            "picked_up" | "pickedup" => Some(OrderPhase::PickedUp),
            "on_the_way" | "ontheway" => Some(OrderPhase::OnTheWay),
            "delivered" => Some(OrderPhase::Delivered),
            "cancelled" | "canceled" => Some(OrderPhase::Cancelled),
            _ => None,
        }
    }

    /// Leg the courier is currently driving, or `None` once the order is terminal.
    pub fn active_leg(&self) -> Option<RouteLeg> {
        match self {
            OrderPhase::Pending | OrderPhase::Confirmed | OrderPhase::Preparing | OrderPhase::Ready => {
                Some(RouteLeg::ToPickup)
            }
            OrderPhase::PickedUp | OrderPhase::OnTheWay => Some(RouteLeg::ToDelivery),
            OrderPhase::Delivered | OrderPhase::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.active_leg().is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteLeg {
    ToPickup,
    ToDelivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    Unresolved,
    PartiallyResolved,
    Resolved,
    Tracking,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Delivered,
    Cancelled,
    Reassigned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEstimate {
    pub order_id: String,
    pub leg: RouteLeg,
    pub distance_to_pickup_km: Option<f64>,
    pub distance_to_delivery_km: Option<f64>,
    pub pickup_to_delivery_km: Option<f64>,
    pub eta_minutes_to_pickup: Option<f64>,
    pub eta_minutes_to_delivery: Option<f64>,
    pub walking_minutes: f64,
    pub bearing_degrees: f64,
    pub cardinal: Cardinal,
    pub computed_at: DateTime<Utc>,
    pub computed_from_courier_point: GeoPoint,
    pub courier_observed_at: DateTime<Utc>,
    pub stale: bool,
}

impl DeliveryEstimate {
    /// Re-derives the advisory stale flag from the courier reading's age.
    pub fn refresh_staleness(&mut self, now: DateTime<Utc>, stale_after: Duration) {
        self.stale = now - self.courier_observed_at > stale_after;
    }
}

/// Static pickup-to-delivery distance, cached against the points it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripLeg {
    pub pickup: GeoPoint,
    pub delivery: GeoPoint,
    pub km: f64,
}

/// What the current estimate was computed against, besides the courier point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateBasis {
    pub leg: RouteLeg,
    pub pickup: Option<GeoPoint>,
    pub delivery: Option<GeoPoint>,
}

/// The single tracking slot owned by the store for one order id.
#[derive(Debug, Clone)]
pub struct TrackedOrder {
    pub locations: OrderLocationSet,
    pub phase: OrderPhase,
    pub courier_id: Option<String>,
    pub estimate: Option<DeliveryEstimate>,
    pub basis: Option<EstimateBasis>,
    pub trip: Option<TripLeg>,
    pub closed: Option<CloseReason>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl TrackedOrder {
    pub fn new(locations: OrderLocationSet, phase: OrderPhase) -> Self {
        Self {
            locations,
            phase,
            courier_id: None,
            estimate: None,
            basis: None,
            trip: None,
            closed: None,
            closed_at: None,
        }
    }

    pub fn state(&self) -> TrackingState {
        if self.closed.is_some() {
            return TrackingState::Closed;
        }
        if self.estimate.is_some() {
            return TrackingState::Tracking;
        }
        match self.locations.resolved_count() {
            0 => TrackingState::Unresolved,
            1 => TrackingState::PartiallyResolved,
            _ => TrackingState::Resolved,
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed.is_none()
    }

    pub fn close(&mut self, reason: CloseReason, now: DateTime<Utc>) {
        if self.closed.is_none() {
            self.closed_at = Some(now);
        }
        self.closed = Some(reason);
        self.clear_estimate();
    }

    pub fn reopen(&mut self) {
        self.closed = None;
        self.closed_at = None;
    }

    pub fn clear_estimate(&mut self) {
        self.estimate = None;
        self.basis = None;
    }

    pub fn basis(&self, leg: RouteLeg) -> EstimateBasis {
        EstimateBasis {
            leg,
            pickup: self.locations.pickup.point,
            delivery: self.locations.delivery.point,
        }
    }
}

/// Read-only projection of a tracking slot for the UI layer.
///
/// `estimate` is `None` whenever no trustworthy estimate exists; callers show
/// "location unavailable" rather than a made-up distance.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub id: String,
    pub phase: OrderPhase,
    pub state: TrackingState,
    pub courier_id: Option<String>,
    pub pickup: Option<GeoPoint>,
    pub pickup_source: LocationSource,
    pub delivery: Option<GeoPoint>,
    pub delivery_source: LocationSource,
    pub pickup_to_delivery_km: Option<f64>,
    pub estimate: Option<DeliveryEstimate>,
    pub location_available: bool,
    pub closed: Option<CloseReason>,
}

impl From<&TrackedOrder> for OrderView {
    fn from(order: &TrackedOrder) -> Self {
        Self {
            id: order.locations.order_id.clone(),
            phase: order.phase,
            state: order.state(),
            courier_id: order.courier_id.clone(),
            pickup: order.locations.pickup.point,
            pickup_source: order.locations.pickup.source,
            delivery: order.locations.delivery.point,
            delivery_source: order.locations.delivery.source,
            pickup_to_delivery_km: order.trip.map(|trip| trip.km),
            estimate: order.estimate.clone(),
            location_available: order.estimate.is_some(),
            closed: order.closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{CloseReason, OrderPhase, RouteLeg, TrackedOrder, TrackingState};
    use crate::geo::GeoPoint;
    use crate::models::location::{Endpoint, LocationSource, OrderLocationSet};

    fn locations(pickup: bool, delivery: bool) -> OrderLocationSet {
        let endpoint = |resolved: bool, point: GeoPoint| {
            if resolved {
                Endpoint::resolved(point, LocationSource::DirectScalar)
            } else {
                Endpoint::unresolved()
            }
        };
        OrderLocationSet {
            order_id: "o1".to_string(),
            pickup: endpoint(pickup, GeoPoint::new(12.9, 77.5)),
            delivery: endpoint(delivery, GeoPoint::new(12.95, 77.6)),
            normalized_at: Utc::now(),
        }
    }

    #[test]
    fn parses_status_variants() {
        assert_eq!(OrderPhase::parse("picked_up"), Some(OrderPhase::PickedUp));
        assert_eq!(OrderPhase::parse("Picked-Up"), Some(OrderPhase::PickedUp));
        assert_eq!(OrderPhase::parse("on the way"), Some(OrderPhase::OnTheWay));
        assert_eq!(OrderPhase::parse("CANCELED"), Some(OrderPhase::Cancelled));
        assert_eq!(OrderPhase::parse("teleported"), None);
    }

    #[test]
    fn phase_selects_the_active_leg() {
        assert_eq!(OrderPhase::Preparing.active_leg(), Some(RouteLeg::ToPickup));
        assert_eq!(OrderPhase::OnTheWay.active_leg(), Some(RouteLeg::ToDelivery));
        assert!(OrderPhase::Delivered.is_terminal());
    }

    #[test]
    fn state_follows_resolution_and_lifecycle() {
        assert_eq!(
            TrackedOrder::new(locations(false, false), OrderPhase::Pending).state(),
            TrackingState::Unresolved
        );
        assert_eq!(
            TrackedOrder::new(locations(true, false), OrderPhase::Pending).state(),
            TrackingState::PartiallyResolved
        );

        let mut order = TrackedOrder::new(locations(true, true), OrderPhase::Pending);
        assert_eq!(order.state(), TrackingState::Resolved);

        let closed_at = Utc::now();
        order.close(CloseReason::Cancelled, closed_at);
        assert_eq!(order.state(), TrackingState::Closed);
        assert!(!order.is_open());

        order.close(CloseReason::Reassigned, closed_at + Duration::seconds(30));
        assert_eq!(order.closed_at, Some(closed_at));

        order.reopen();
        assert!(order.is_open());
        assert_eq!(order.closed_at, None);
    }
}
