//! Reverse geocoding against a Mapbox-compatible places endpoint.

use serde::Deserialize;

use crate::config::AccessToken;
use crate::error::GeocodeError;
use crate::geo::Coordinate;
use crate::overlay::Polygon;

pub const DEFAULT_GEOCODING_ENDPOINT: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places";

#[derive(Debug, Deserialize)]
pub struct GeocodingResponse {
    pub features: Vec<GeocodingFeature>,
}

#[derive(Debug, Deserialize)]
pub struct GeocodingFeature {
    pub place_name: String,
    pub geometry: GeocodingGeometry,
}

#[derive(Debug, Deserialize)]
pub struct GeocodingGeometry {
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

/// Place that contains the queried coordinate
#[derive(Clone, Debug, PartialEq)]
pub struct PlaceBoundary {
    pub place_name: String,
    pub polygon: Polygon,
}

pub fn reverse_geocode_url(endpoint: &str, at: Coordinate, token: &AccessToken) -> String {
    format!(
        "{}/{},{}.json?types=place&access_token={}",
        endpoint.trim_end_matches('/'),
        at.lng(),
        at.lat(),
        token.expose()
    )
}

/// Decodes a response body and returns the first feature's boundary, or
/// None when the endpoint found nothing.
pub fn parse_boundary(body: &[u8]) -> Result<Option<PlaceBoundary>, GeocodeError> {
    let response: GeocodingResponse = serde_json::from_slice(body)?;
    let Some(first) = response.features.into_iter().next() else {
        return Ok(None);
    };

    let rings = first
        .geometry
        .coordinates
        .into_iter()
        .map(|ring| {
            ring.into_iter()
                .map(|[lng, lat]| Coordinate::new(lng, lat))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    if rings.iter().all(|r| r.is_empty()) {
        return Err(GeocodeError::EmptyBoundary);
    }

    Ok(Some(PlaceBoundary {
        place_name: first.place_name,
        polygon: Polygon::new(rings),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_place_query_url() {
        let token = AccessToken::new("pk.test");
        let at = Coordinate::new(38.76, 9.04).unwrap();
        assert_eq!(
            reverse_geocode_url("https://geo.example/places/", at, &token),
            "https://geo.example/places/38.76,9.04.json?types=place&access_token=pk.test"
        );
    }

    #[test]
    fn takes_first_feature_polygon() {
        let body = br#"{"features": [
            {"place_name": "Addis Ababa, Ethiopia",
             "geometry": {"coordinates": [[[38.6, 8.9], [38.9, 8.9], [38.9, 9.1], [38.6, 8.9]]]}},
            {"place_name": "Elsewhere", "geometry": {"coordinates": [[[0.0, 0.0]]]}}
        ]}"#;
        let boundary = parse_boundary(body).unwrap().unwrap();
        assert_eq!(boundary.place_name, "Addis Ababa, Ethiopia");
        assert_eq!(boundary.polygon.rings.len(), 1);
        assert_eq!(boundary.polygon.rings[0].len(), 4);
    }

    #[test]
    fn no_features_is_not_an_error() {
        assert_eq!(parse_boundary(br#"{"features": []}"#).unwrap(), None);
    }

    #[test]
    fn point_geometry_fails_to_decode() {
        let body = br#"{"features": [{"place_name": "x", "geometry": {"coordinates": [38.7, 9.0]}}]}"#;
        assert!(matches!(parse_boundary(body), Err(GeocodeError::Decode(_))));
    }

    #[test]
    fn invalid_boundary_coordinates_are_rejected() {
        let body = br#"{"features": [{"place_name": "x", "geometry": {"coordinates": [[[500.0, 9.0]]]}}]}"#;
        assert!(matches!(parse_boundary(body), Err(GeocodeError::Coordinate(_))));
    }
}
