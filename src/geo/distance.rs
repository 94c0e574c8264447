use serde::{Deserialize, Serialize};

use crate::error::GeoError;
use crate::geo::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

const DEFAULT_WALKING_SPEED_KMH: f64 = 5.0;
const DEFAULT_DRIVING_SPEED_KMH: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinal {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Cardinal {
    const COMPASS: [Cardinal; 8] = [
        Cardinal::N,
        Cardinal::NE,
        Cardinal::E,
        Cardinal::SE,
        Cardinal::S,
        Cardinal::SW,
        Cardinal::W,
        Cardinal::NW,
    ];

    /// Nearest of the eight compass points; halfway bearings round up.
    pub fn from_bearing(bearing_degrees: f64) -> Self {
        let index = (bearing_degrees / 45.0).round() as i64;
        Self::COMPASS[index.rem_euclid(8) as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    pub km: f64,
    pub bearing_degrees: f64,
    pub cardinal: Cardinal,
}

/// Great-circle distance and initial bearing from `a` to `b`.
///
/// Both points must pass the validator; a sentinel or out-of-range point is an
/// [`GeoError::InvalidCoordinate`], never a silently huge distance.
pub fn haversine(a: &GeoPoint, b: &GeoPoint) -> Result<Distance, GeoError> {
    a.validate()?;
    b.validate()?;

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    let bearing_degrees = initial_bearing(lat1, lat2, delta_lng);

    Ok(Distance {
        km: EARTH_RADIUS_KM * central_angle,
        bearing_degrees,
        cardinal: Cardinal::from_bearing(bearing_degrees),
    })
}

fn initial_bearing(lat1: f64, lat2: f64, delta_lng: f64) -> f64 {
    let x = delta_lng.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lng.cos();

    x.atan2(y).to_degrees().rem_euclid(360.0)
}

/// Assumed travel speeds used to turn distances into minutes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelSpeeds {
    pub walking_kmh: f64,
    pub driving_kmh: f64,
}

impl Default for TravelSpeeds {
    fn default() -> Self {
        Self {
            walking_kmh: DEFAULT_WALKING_SPEED_KMH,
            driving_kmh: DEFAULT_DRIVING_SPEED_KMH,
        }
    }
}

impl TravelSpeeds {
    pub fn walking_minutes(&self, km: f64) -> f64 {
        (km / self.walking_kmh) * 60.0
    }

    /// Canonical ETA basis.
    pub fn driving_minutes(&self, km: f64) -> f64 {
        (km / self.driving_kmh) * 60.0
    }
}
