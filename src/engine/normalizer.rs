use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::location::{Endpoint, OrderLocationSet};
use crate::models::raw::{RawLocationCandidate, RawOrder};

/// Produces canonical pickup/delivery locations from a raw order payload.
///
/// Each endpoint takes the first candidate, in fixed precedence order, that
/// passes the validator. An endpoint with no valid candidate stays unresolved.
pub fn normalize(order_id: &str, raw: &RawOrder, now: DateTime<Utc>) -> OrderLocationSet {
    let pickup = resolve(pickup_candidates(raw));
    let delivery = resolve(delivery_candidates(raw));

    debug!(
        order_id,
        pickup_source = pickup.source.as_str(),
        delivery_source = delivery.source.as_str(),
        "order locations normalized"
    );

    OrderLocationSet {
        order_id: order_id.to_string(),
        pickup,
        delivery,
        normalized_at: now,
    }
}

fn pickup_candidates(raw: &RawOrder) -> impl Iterator<Item = RawLocationCandidate> {
    [
        raw.direct_pickup(),
        raw.pickup_geojson(),
        raw.restaurant_location(),
        raw.author_location(),
    ]
    .into_iter()
    .flatten()
}

fn delivery_candidates(raw: &RawOrder) -> impl Iterator<Item = RawLocationCandidate> {
    [
        raw.direct_delivery(),
        raw.delivery_geojson(),
        raw.user_location(),
        raw.user_profile_location(),
    ]
    .into_iter()
    .flatten()
}

fn resolve(mut candidates: impl Iterator<Item = RawLocationCandidate>) -> Endpoint {
    candidates
        .find_map(|candidate| {
            candidate
                .point()
                .map(|point| Endpoint::resolved(point, candidate.source()))
        })
        .unwrap_or_else(Endpoint::unresolved)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::{json, Value};

    use super::normalize;
    use crate::geo::GeoPoint;
    use crate::models::location::{LocationSource, OrderLocationSet};
    use crate::models::raw::RawOrder;

    fn run(value: Value) -> OrderLocationSet {
        let raw = RawOrder::from_value(value).unwrap();
        normalize("o1", &raw, Utc::now())
    }

    #[test]
    fn scalar_pair_wins_over_disagreeing_geojson() {
        let set = run(json!({
            "pickupLatitude": 12.9,
            "pickupLongitude": 77.5,
            "pickupLocation": { "coordinates": [77.7, 13.1] }
        }));

        assert_eq!(set.pickup.point, Some(GeoPoint::new(12.9, 77.5)));
        assert_eq!(set.pickup.source, LocationSource::DirectScalar);
    }

    #[test]
    fn geojson_pickup_is_transposed() {
        let set = run(json!({ "pickupLocation": { "coordinates": [77.5, 12.9] } }));

        let pickup = set.pickup.point.unwrap();
        assert_eq!(pickup.longitude, 77.5);
        assert_eq!(pickup.latitude, 12.9);
        assert_eq!(set.pickup.source, LocationSource::Geojson);
    }

    #[test]
    fn zeroed_sources_fall_through_to_the_next_candidate() {
        let set = run(json!({
            "pickupLatitude": 0,
            "pickupLongitude": 0,
            "pickupLocation": { "coordinates": [0, 0] },
            "restaurant": { "location": { "coordinates": [77.55, 12.92] } },
            "deliveryLocation": { "coordinates": [0, 0] },
            "userLocation": { "coordinates": [77.61, 12.97] },
            "user": { "location": { "coordinates": [77.62, 12.98] } }
        }));

        assert_eq!(set.pickup.point, Some(GeoPoint::new(12.92, 77.55)));
        assert_eq!(set.pickup.source, LocationSource::RestaurantLocation);
        assert_eq!(set.delivery.point, Some(GeoPoint::new(12.97, 77.61)));
        assert_eq!(set.delivery.source, LocationSource::UserLocation);
    }

    #[test]
    fn legacy_author_location_is_the_last_pickup_fallback() {
        let set = run(json!({
            "restaurant": { "location": { "coordinates": [200.0, 12.9] } },
            "items": [{ "post": { "author": { "location": { "coordinates": [77.4, 12.8] } } } }]
        }));

        assert_eq!(set.pickup.point, Some(GeoPoint::new(12.8, 77.4)));
        assert_eq!(set.pickup.source, LocationSource::AuthorLocation);
    }

    #[test]
    fn all_sentinel_sources_leave_endpoints_unresolved() {
        let set = run(json!({
            "pickupLatitude": 0,
            "pickupLongitude": 0,
            "pickupLocation": { "coordinates": [0, 0] },
            "restaurant": { "location": { "coordinates": [0, 0] } },
            "deliveryLatitude": null,
            "user": { "location": { "coordinates": [0.0, 0.0] } }
        }));

        assert_eq!(set.pickup.point, None);
        assert_eq!(set.pickup.source, LocationSource::None);
        assert_eq!(set.delivery.point, None);
        assert_eq!(set.delivery.source, LocationSource::None);
    }

    #[test]
    fn scalar_pickup_with_user_profile_delivery() {
        let set = run(json!({
            "pickupLatitude": 12.9,
            "pickupLongitude": 77.5,
            "user": { "location": { "coordinates": [77.6, 12.95] } }
        }));

        assert_eq!(set.pickup.point, Some(GeoPoint::new(12.9, 77.5)));
        assert_eq!(set.pickup.source, LocationSource::DirectScalar);
        assert_eq!(set.delivery.point, Some(GeoPoint::new(12.95, 77.6)));
        assert_eq!(set.delivery.source, LocationSource::UserLocation);
    }
}
