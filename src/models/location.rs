use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// Where a resolved endpoint came from in the raw order payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    DirectScalar,
    Geojson,
    RestaurantLocation,
    AuthorLocation,
    UserLocation,
    None,
}

impl LocationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationSource::DirectScalar => "direct_scalar",
            LocationSource::Geojson => "geojson",
            LocationSource::RestaurantLocation => "restaurant_location",
            LocationSource::AuthorLocation => "author_location",
            LocationSource::UserLocation => "user_location",
            LocationSource::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Pickup,
    Delivery,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Pickup => "pickup",
            EndpointKind::Delivery => "delivery",
        }
    }
}

/// One side of an order: a validated point and its source, or unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub point: Option<GeoPoint>,
    pub source: LocationSource,
}

impl Endpoint {
    pub fn resolved(point: GeoPoint, source: LocationSource) -> Self {
        Self {
            point: Some(point),
            source,
        }
    }

    pub fn unresolved() -> Self {
        Self {
            point: None,
            source: LocationSource::None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.point.is_some()
    }
}

/// Canonical pickup/delivery locations for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLocationSet {
    pub order_id: String,
    pub pickup: Endpoint,
    pub delivery: Endpoint,
    pub normalized_at: DateTime<Utc>,
}

impl OrderLocationSet {
    pub fn endpoint(&self, kind: EndpointKind) -> &Endpoint {
        match kind {
            EndpointKind::Pickup => &self.pickup,
            EndpointKind::Delivery => &self.delivery,
        }
    }

    pub fn endpoint_mut(&mut self, kind: EndpointKind) -> &mut Endpoint {
        match kind {
            EndpointKind::Pickup => &mut self.pickup,
            EndpointKind::Delivery => &mut self.delivery,
        }
    }

    pub fn resolved_count(&self) -> usize {
        [self.pickup, self.delivery]
            .iter()
            .filter(|endpoint| endpoint.is_resolved())
            .count()
    }
}
