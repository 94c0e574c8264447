pub mod distance;

use serde::{Deserialize, Serialize};

use crate::error::GeoError;

pub use distance::{haversine, Cardinal, Distance, TravelSpeeds, EARTH_RADIUS_KM};

/// A coordinate pair in conventional (latitude, longitude) ordering.
///
/// Points handed out by the normalizer always satisfy [`is_valid`]. Points built
/// with [`GeoPoint::new`] are unchecked and must be validated before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Builds a point from a GeoJSON `[longitude, latitude]` pair.
    pub fn from_geojson(longitude: f64, latitude: f64) -> Self {
        Self::new(latitude, longitude)
    }

    /// Returns the point only if it passes the validator.
    pub fn checked(latitude: f64, longitude: f64) -> Option<Self> {
        let point = Self::new(latitude, longitude);
        is_valid(Some(&point)).then_some(point)
    }

    pub fn validate(&self) -> Result<(), GeoError> {
        match invalid_reason(self) {
            None => Ok(()),
            Some(reason) => Err(GeoError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
                reason,
            }),
        }
    }

    /// GeoJSON ordering, for collaborators that expect `[lon, lat]`.
    pub fn to_geojson(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// Whether a coordinate pair is usable as a real location.
///
/// Total: missing, non-finite, out-of-range and the `(0,0)` sentinel all yield
/// `false`.
pub fn is_valid(point: Option<&GeoPoint>) -> bool {
    point.is_some_and(|point| invalid_reason(point).is_none())
}

fn invalid_reason(point: &GeoPoint) -> Option<&'static str> {
    let GeoPoint {
        latitude,
        longitude,
    } = *point;

    if !latitude.is_finite() || !longitude.is_finite() {
        return Some("non-finite component");
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Some("latitude out of range");
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Some("longitude out of range");
    }
    if latitude == 0.0 && longitude == 0.0 {
        return Some("unset (0,0) sentinel");
    }

    None
}
