use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::GeoError;
use crate::geo::{haversine, GeoPoint};
use crate::models::courier::CourierPosition;
use crate::models::location::EndpointKind;
use crate::models::tracking::{DeliveryEstimate, RouteLeg, TrackedOrder, TripLeg};

/// Outcome of feeding a courier position to one tracked order.
#[derive(Debug, Clone, PartialEq)]
pub enum EstimateUpdate {
    Recomputed(DeliveryEstimate),
    /// Courier moved less than the threshold; the previous estimate stands.
    Retained(DeliveryEstimate),
    NoOp(NoOpReason),
}

impl EstimateUpdate {
    pub fn outcome(&self) -> &'static str {
        match self {
            EstimateUpdate::Recomputed(_) => "recomputed",
            EstimateUpdate::Retained(_) => "retained",
            EstimateUpdate::NoOp(_) => "noop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    Closed,
    EndpointUnresolved(EndpointKind),
}

/// Decides whether the courier moved far enough to matter.
#[derive(Debug, Clone, Copy)]
pub struct MovementGate {
    threshold_km: f64,
}

impl MovementGate {
    pub fn new(threshold_km: f64) -> Self {
        Self { threshold_km }
    }

    pub fn has_moved(&self, from: &GeoPoint, to: &GeoPoint) -> Result<bool, GeoError> {
        Ok(haversine(from, to)?.km >= self.threshold_km)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EstimateTracker {
    config: EngineConfig,
    gate: MovementGate,
}

impl EstimateTracker {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            gate: MovementGate::new(config.movement_threshold_km),
        }
    }

    pub fn gate(&self) -> &MovementGate {
        &self.gate
    }

    pub fn stale_after(&self) -> Duration {
        self.config.stale_after
    }

    /// Recomputes the order's estimate for a new courier position when needed.
    ///
    /// An unresolved endpoint on the active leg is a normal `NoOp`, and drops any
    /// estimate computed against points that are no longer known.
    pub fn update(
        &self,
        order: &mut TrackedOrder,
        position: &CourierPosition,
        now: DateTime<Utc>,
    ) -> Result<EstimateUpdate, GeoError> {
        let leg = match order.phase.active_leg() {
            Some(leg) if order.is_open() => leg,
            _ => return Ok(EstimateUpdate::NoOp(NoOpReason::Closed)),
        };

        let target_kind = match leg {
            RouteLeg::ToPickup => EndpointKind::Pickup,
            RouteLeg::ToDelivery => EndpointKind::Delivery,
        };
        let Some(target) = order.locations.endpoint(target_kind).point else {
            order.clear_estimate();
            return Ok(EstimateUpdate::NoOp(NoOpReason::EndpointUnresolved(target_kind)));
        };

        self.refresh_trip(order)?;

        let basis = order.basis(leg);
        let same_basis = order.basis == Some(basis);
        if let Some(existing) = order.estimate.as_mut() {
            let moved = self
                .gate
                .has_moved(&existing.computed_from_courier_point, &position.point)?;
            if same_basis && !moved {
                existing.courier_observed_at = position.observed_at;
                existing.refresh_staleness(now, self.config.stale_after);
                return Ok(EstimateUpdate::Retained(existing.clone()));
            }
        }

        let estimate = self.compute(order, leg, &target, position, now)?;
        debug!(
            order_id = %estimate.order_id,
            leg = ?leg,
            stale = estimate.stale,
            "delivery estimate recomputed"
        );

        order.estimate = Some(estimate.clone());
        order.basis = Some(basis);
        Ok(EstimateUpdate::Recomputed(estimate))
    }

    /// Keeps the cached pickup-to-delivery distance in step with the endpoints.
    pub fn refresh_trip(&self, order: &mut TrackedOrder) -> Result<(), GeoError> {
        match (order.locations.pickup.point, order.locations.delivery.point) {
            (Some(pickup), Some(delivery)) => {
                let cached = order
                    .trip
                    .is_some_and(|trip| trip.pickup == pickup && trip.delivery == delivery);
                if !cached {
                    order.trip = Some(TripLeg {
                        pickup,
                        delivery,
                        km: haversine(&pickup, &delivery)?.km,
                    });
                }
            }
            _ => order.trip = None,
        }
        Ok(())
    }

    fn compute(
        &self,
        order: &TrackedOrder,
        leg: RouteLeg,
        target: &GeoPoint,
        position: &CourierPosition,
        now: DateTime<Utc>,
    ) -> Result<DeliveryEstimate, GeoError> {
        let speeds = self.config.speeds;
        let leg_distance = haversine(&position.point, target)?;
        let leg_eta = speeds.driving_minutes(leg_distance.km);
        let trip_km = order.trip.map(|trip| trip.km);

        let stale = position.is_stale(now, self.config.stale_after);
        if stale {
            warn!(
                order_id = %order.locations.order_id,
                observed_at = %position.observed_at,
                "estimating from a stale courier position"
            );
        }

        let (distance_to_pickup_km, eta_minutes_to_pickup, distance_to_delivery_km, eta_minutes_to_delivery) =
            match leg {
                RouteLeg::ToPickup => (
                    Some(leg_distance.km),
                    Some(leg_eta),
                    None,
                    trip_km.map(|km| leg_eta + speeds.driving_minutes(km)),
                ),
                RouteLeg::ToDelivery => (None, None, Some(leg_distance.km), Some(leg_eta)),
            };

        Ok(DeliveryEstimate {
            order_id: order.locations.order_id.clone(),
            leg,
            distance_to_pickup_km,
            distance_to_delivery_km,
            pickup_to_delivery_km: trip_km,
            eta_minutes_to_pickup,
            eta_minutes_to_delivery,
            walking_minutes: speeds.walking_minutes(leg_distance.km),
            bearing_degrees: leg_distance.bearing_degrees,
            cardinal: leg_distance.cardinal,
            computed_at: now,
            computed_from_courier_point: position.point,
            courier_observed_at: position.observed_at,
            stale,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::{EstimateTracker, EstimateUpdate, MovementGate, NoOpReason};
    use crate::config::EngineConfig;
    use crate::geo::GeoPoint;
    use crate::models::courier::CourierPosition;
    use crate::models::location::{Endpoint, EndpointKind, LocationSource, OrderLocationSet};
    use crate::models::tracking::{CloseReason, OrderPhase, RouteLeg, TrackedOrder, TrackingState};

    const PICKUP: GeoPoint = GeoPoint {
        latitude: 12.9,
        longitude: 77.5,
    };
    const DELIVERY: GeoPoint = GeoPoint {
        latitude: 12.95,
        longitude: 77.6,
    };

    fn order(pickup: Option<GeoPoint>, delivery: Option<GeoPoint>, phase: OrderPhase) -> TrackedOrder {
        let endpoint = |point: Option<GeoPoint>| match point {
            Some(point) => Endpoint::resolved(point, LocationSource::DirectScalar),
            None => Endpoint::unresolved(),
        };
        let locations = OrderLocationSet {
            order_id: "o1".to_string(),
            pickup: endpoint(pickup),
            delivery: endpoint(delivery),
            normalized_at: Utc::now(),
        };
        TrackedOrder::new(locations, phase)
    }

    fn courier(lat: f64, lng: f64, observed_at: DateTime<Utc>) -> CourierPosition {
        CourierPosition {
            point: GeoPoint::new(lat, lng),
            accuracy_meters: 5.0,
            observed_at,
        }
    }

    fn recomputed(update: EstimateUpdate) -> crate::models::tracking::DeliveryEstimate {
        match update {
            EstimateUpdate::Recomputed(estimate) => estimate,
            other => panic!("expected recompute, got {other:?}"),
        }
    }

    #[test]
    fn first_position_produces_pickup_leg_estimate_with_total_trip() {
        let tracker = EstimateTracker::new(EngineConfig::default());
        let mut tracked = order(Some(PICKUP), Some(DELIVERY), OrderPhase::Confirmed);
        let now = Utc::now();

        let estimate = recomputed(tracker.update(&mut tracked, &courier(12.85, 77.5, now), now).unwrap());

        assert_eq!(estimate.leg, RouteLeg::ToPickup);
        let to_pickup = estimate.distance_to_pickup_km.unwrap();
        assert!((to_pickup - 5.56).abs() < 0.05, "{to_pickup}");
        let trip = estimate.pickup_to_delivery_km.unwrap();
        let eta_pickup = estimate.eta_minutes_to_pickup.unwrap();
        assert!((eta_pickup - to_pickup / 30.0 * 60.0).abs() < 1e-9);
        let eta_total = estimate.eta_minutes_to_delivery.unwrap();
        assert!((eta_total - (to_pickup + trip) / 30.0 * 60.0).abs() < 1e-9);
        assert_eq!(estimate.distance_to_delivery_km, None);
        assert!(!estimate.stale);
        assert_eq!(tracked.state(), TrackingState::Tracking);
    }

    #[test]
    fn sub_threshold_movement_retains_the_estimate() {
        let tracker = EstimateTracker::new(EngineConfig::default());
        let mut tracked = order(Some(PICKUP), Some(DELIVERY), OrderPhase::Preparing);
        let first_at = Utc::now();

        let first = recomputed(
            tracker
                .update(&mut tracked, &courier(12.85, 77.5, first_at), first_at)
                .unwrap(),
        );

        let later = first_at + Duration::seconds(10);
        let jitter = courier(12.8505, 77.5, later);
        match tracker.update(&mut tracked, &jitter, later).unwrap() {
            EstimateUpdate::Retained(estimate) => {
                assert_eq!(estimate.computed_at, first_at);
                assert_eq!(estimate.computed_from_courier_point, first.computed_from_courier_point);
                assert_eq!(estimate.distance_to_pickup_km, first.distance_to_pickup_km);
                assert_eq!(estimate.courier_observed_at, later);
            }
            other => panic!("expected retained, got {other:?}"),
        }

        let moved = courier(12.853, 77.5, later);
        let second = recomputed(tracker.update(&mut tracked, &moved, later).unwrap());
        assert_eq!(second.computed_at, later);
        assert_eq!(second.computed_from_courier_point, moved.point);
    }

    #[test]
    fn phase_change_switches_to_delivery_leg_without_movement() {
        let tracker = EstimateTracker::new(EngineConfig::default());
        let mut tracked = order(Some(PICKUP), Some(DELIVERY), OrderPhase::Confirmed);
        let now = Utc::now();
        let at_restaurant = courier(12.9001, 77.5, now);

        recomputed(tracker.update(&mut tracked, &at_restaurant, now).unwrap());
        tracked.phase = OrderPhase::PickedUp;

        let estimate = recomputed(tracker.update(&mut tracked, &at_restaurant, now).unwrap());
        assert_eq!(estimate.leg, RouteLeg::ToDelivery);
        assert_eq!(estimate.distance_to_pickup_km, None);
        assert_eq!(estimate.eta_minutes_to_pickup, None);
        let to_delivery = estimate.distance_to_delivery_km.unwrap();
        assert!((to_delivery - estimate.pickup_to_delivery_km.unwrap()).abs() < 0.05);
    }

    #[test]
    fn unresolved_target_endpoint_is_a_noop() {
        let tracker = EstimateTracker::new(EngineConfig::default());
        let now = Utc::now();

        let mut nothing = order(None, None, OrderPhase::Confirmed);
        assert_eq!(
            tracker.update(&mut nothing, &courier(12.85, 77.5, now), now).unwrap(),
            EstimateUpdate::NoOp(NoOpReason::EndpointUnresolved(EndpointKind::Pickup))
        );
        assert!(nothing.estimate.is_none());

        let mut no_delivery = order(Some(PICKUP), None, OrderPhase::OnTheWay);
        assert_eq!(
            tracker.update(&mut no_delivery, &courier(12.85, 77.5, now), now).unwrap(),
            EstimateUpdate::NoOp(NoOpReason::EndpointUnresolved(EndpointKind::Delivery))
        );
    }

    #[test]
    fn pickup_leg_without_delivery_has_no_total_eta() {
        let tracker = EstimateTracker::new(EngineConfig::default());
        let mut tracked = order(Some(PICKUP), None, OrderPhase::Pending);
        let now = Utc::now();

        let estimate = recomputed(tracker.update(&mut tracked, &courier(12.85, 77.5, now), now).unwrap());
        assert!(estimate.eta_minutes_to_pickup.is_some());
        assert_eq!(estimate.pickup_to_delivery_km, None);
        assert_eq!(estimate.eta_minutes_to_delivery, None);
    }

    #[test]
    fn closed_orders_are_not_estimated() {
        let tracker = EstimateTracker::new(EngineConfig::default());
        let mut tracked = order(Some(PICKUP), Some(DELIVERY), OrderPhase::Confirmed);
        tracked.close(CloseReason::Reassigned, Utc::now());
        let now = Utc::now();

        assert_eq!(
            tracker.update(&mut tracked, &courier(12.85, 77.5, now), now).unwrap(),
            EstimateUpdate::NoOp(NoOpReason::Closed)
        );
    }

    #[test]
    fn old_position_is_flagged_stale_but_still_used() {
        let tracker = EstimateTracker::new(EngineConfig::default());
        let mut tracked = order(Some(PICKUP), Some(DELIVERY), OrderPhase::Confirmed);
        let now = Utc::now();
        let old = courier(12.85, 77.5, now - Duration::minutes(5));

        let estimate = recomputed(tracker.update(&mut tracked, &old, now).unwrap());
        assert!(estimate.stale);
        assert!(estimate.distance_to_pickup_km.is_some());
    }

    #[test]
    fn fresh_reading_at_the_same_spot_clears_the_stale_flag() {
        let tracker = EstimateTracker::new(EngineConfig::default());
        let mut tracked = order(Some(PICKUP), Some(DELIVERY), OrderPhase::Confirmed);
        let now = Utc::now();

        let first = recomputed(
            tracker
                .update(&mut tracked, &courier(12.85, 77.5, now - Duration::minutes(5)), now)
                .unwrap(),
        );
        assert!(first.stale);

        let later = now + Duration::seconds(10);
        match tracker.update(&mut tracked, &courier(12.85, 77.5, later), later).unwrap() {
            EstimateUpdate::Retained(estimate) => {
                assert!(!estimate.stale);
                assert_eq!(estimate.courier_observed_at, later);
                assert_eq!(estimate.computed_at, now);
            }
            other => panic!("expected retained, got {other:?}"),
        }
        assert!(!tracked.estimate.as_ref().unwrap().stale);
    }

    #[test]
    fn retained_estimate_turns_stale_as_the_reading_ages() {
        let tracker = EstimateTracker::new(EngineConfig::default());
        let mut tracked = order(Some(PICKUP), Some(DELIVERY), OrderPhase::Confirmed);
        let now = Utc::now();
        let position = courier(12.85, 77.5, now);

        assert!(!recomputed(tracker.update(&mut tracked, &position, now).unwrap()).stale);

        let much_later = now + Duration::minutes(3);
        match tracker.update(&mut tracked, &position, much_later).unwrap() {
            EstimateUpdate::Retained(estimate) => assert!(estimate.stale),
            other => panic!("expected retained, got {other:?}"),
        }
    }

    #[test]
    fn superseded_endpoint_forces_recompute() {
        let tracker = EstimateTracker::new(EngineConfig::default());
        let mut tracked = order(Some(PICKUP), Some(DELIVERY), OrderPhase::Confirmed);
        let now = Utc::now();
        let position = courier(12.85, 77.5, now);
        let first = recomputed(tracker.update(&mut tracked, &position, now).unwrap());

        tracked.locations.pickup =
            Endpoint::resolved(GeoPoint::new(12.87, 77.5), LocationSource::RestaurantLocation);
        let later = now + Duration::seconds(5);
        let second = recomputed(tracker.update(&mut tracked, &position, later).unwrap());

        assert!(second.distance_to_pickup_km.unwrap() < first.distance_to_pickup_km.unwrap());
        assert_ne!(second.pickup_to_delivery_km, first.pickup_to_delivery_km);
    }

    #[test]
    fn invalid_courier_point_is_an_error_not_a_distance() {
        let tracker = EstimateTracker::new(EngineConfig::default());
        let mut tracked = order(Some(PICKUP), Some(DELIVERY), OrderPhase::Confirmed);
        let now = Utc::now();

        assert!(tracker.update(&mut tracked, &courier(0.0, 0.0, now), now).is_err());
        assert!(tracked.estimate.is_none());
    }

    #[test]
    fn gate_uses_the_configured_threshold() {
        let gate = MovementGate::new(0.1);
        let from = GeoPoint::new(12.9, 77.5);
        assert!(!gate.has_moved(&from, &GeoPoint::new(12.9005, 77.5)).unwrap());
        assert!(gate.has_moved(&from, &GeoPoint::new(12.902, 77.5)).unwrap());
    }
}
