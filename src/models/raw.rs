//! Boundary decoding of order payloads from the external order service.
//!
//! Payloads arrive with optional, inconsistently populated nested paths. They
//! are decoded once here into [`RawOrder`], and each known coordinate source is
//! exposed as a [`RawLocationCandidate`] so the normalizer only ever sees a
//! closed set of shapes. A field with an unexpected JSON shape (an unpopulated
//! reference id instead of an object, a string where an array was expected) is
//! treated as absent rather than failing the whole payload.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use crate::geo::GeoPoint;
use crate::models::location::LocationSource;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    #[serde(rename = "_id", default, deserialize_with = "lenient_id")]
    pub mongo_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<String>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub pickup_latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub pickup_longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub delivery_latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub delivery_longitude: Option<f64>,

    #[serde(default, deserialize_with = "lenient")]
    pub pickup_location: Option<RawGeoJson>,
    #[serde(default, deserialize_with = "lenient")]
    pub delivery_location: Option<RawGeoJson>,
    #[serde(default, deserialize_with = "lenient")]
    pub user_location: Option<RawGeoJson>,

    #[serde(default, deserialize_with = "lenient")]
    pub restaurant: Option<RawLocated>,
    #[serde(default, deserialize_with = "lenient")]
    pub user: Option<RawLocated>,
    #[serde(default, deserialize_with = "lenient")]
    pub items: Option<Vec<RawItem>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGeoJson {
    #[serde(default, deserialize_with = "lenient_coordinates")]
    pub coordinates: Option<Vec<Option<f64>>>,
}

/// Any object carrying a nested `location` GeoJSON value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLocated {
    #[serde(default, deserialize_with = "lenient")]
    pub location: Option<RawGeoJson>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawItem {
    #[serde(default, deserialize_with = "lenient")]
    pub post: Option<RawPost>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPost {
    #[serde(default, deserialize_with = "lenient")]
    pub author: Option<RawLocated>,
}

/// GeoJSON `[longitude, latitude, ...]` as found in the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoJsonCoordinates(pub Vec<Option<f64>>);

impl GeoJsonCoordinates {
    /// Transposes into conventional ordering; extra entries (altitude) are ignored.
    pub fn point(&self) -> Option<GeoPoint> {
        match self.0.as_slice() {
            [Some(longitude), Some(latitude), ..] => {
                let point = GeoPoint::from_geojson(*longitude, *latitude);
                crate::geo::is_valid(Some(&point)).then_some(point)
            }
            _ => None,
        }
    }
}

/// A coordinate source found on a raw order, in its original shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RawLocationCandidate {
    DirectScalar {
        latitude: Option<f64>,
        longitude: Option<f64>,
    },
    GeoJson(GeoJsonCoordinates),
    RestaurantLocation(GeoJsonCoordinates),
    AuthorLocation(GeoJsonCoordinates),
    UserLocation(GeoJsonCoordinates),
}

impl RawLocationCandidate {
    pub fn source(&self) -> LocationSource {
        match self {
            RawLocationCandidate::DirectScalar { .. } => LocationSource::DirectScalar,
            RawLocationCandidate::GeoJson(_) => LocationSource::Geojson,
            RawLocationCandidate::RestaurantLocation(_) => LocationSource::RestaurantLocation,
            RawLocationCandidate::AuthorLocation(_) => LocationSource::AuthorLocation,
            RawLocationCandidate::UserLocation(_) => LocationSource::UserLocation,
        }
    }

    /// The validated point this candidate describes, if any.
    pub fn point(&self) -> Option<GeoPoint> {
        match self {
            RawLocationCandidate::DirectScalar {
                latitude: Some(latitude),
                longitude: Some(longitude),
            } => GeoPoint::checked(*latitude, *longitude),
            RawLocationCandidate::DirectScalar { .. } => None,
            RawLocationCandidate::GeoJson(coordinates)
            | RawLocationCandidate::RestaurantLocation(coordinates)
            | RawLocationCandidate::AuthorLocation(coordinates)
            | RawLocationCandidate::UserLocation(coordinates) => coordinates.point(),
        }
    }
}

impl RawOrder {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn order_id(&self) -> Option<&str> {
        self.mongo_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|id| !id.trim().is_empty())
    }

    pub fn direct_pickup(&self) -> Option<RawLocationCandidate> {
        scalar_pair(self.pickup_latitude, self.pickup_longitude)
    }

    pub fn pickup_geojson(&self) -> Option<RawLocationCandidate> {
        geojson(self.pickup_location.as_ref()).map(RawLocationCandidate::GeoJson)
    }

    pub fn restaurant_location(&self) -> Option<RawLocationCandidate> {
        let located = self.restaurant.as_ref()?;
        geojson(located.location.as_ref()).map(RawLocationCandidate::RestaurantLocation)
    }

    /// Legacy fallback: the author of the first item's post.
    pub fn author_location(&self) -> Option<RawLocationCandidate> {
        let author = self.items.as_ref()?.first()?.post.as_ref()?.author.as_ref()?;
        geojson(author.location.as_ref()).map(RawLocationCandidate::AuthorLocation)
    }

    pub fn direct_delivery(&self) -> Option<RawLocationCandidate> {
        scalar_pair(self.delivery_latitude, self.delivery_longitude)
    }

    pub fn delivery_geojson(&self) -> Option<RawLocationCandidate> {
        geojson(self.delivery_location.as_ref()).map(RawLocationCandidate::GeoJson)
    }

    /// Top-level `userLocation`.
    pub fn user_location(&self) -> Option<RawLocationCandidate> {
        geojson(self.user_location.as_ref()).map(RawLocationCandidate::UserLocation)
    }

    /// Nested `user.location`.
    pub fn user_profile_location(&self) -> Option<RawLocationCandidate> {
        let user = self.user.as_ref()?;
        geojson(user.location.as_ref()).map(RawLocationCandidate::UserLocation)
    }
}

fn scalar_pair(latitude: Option<f64>, longitude: Option<f64>) -> Option<RawLocationCandidate> {
    if latitude.is_none() && longitude.is_none() {
        return None;
    }
    Some(RawLocationCandidate::DirectScalar {
        latitude,
        longitude,
    })
}

fn geojson(raw: Option<&RawGeoJson>) -> Option<GeoJsonCoordinates> {
    raw?.coordinates.clone().map(GeoJsonCoordinates)
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(id) => Some(id),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number(&value))
}

fn lenient_coordinates<'de, D>(deserializer: D) -> Result<Option<Vec<Option<f64>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(entries) => Some(entries.iter().map(number).collect()),
        _ => None,
    })
}

/// JSON numbers and numeric strings; everything else is non-numeric.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}
