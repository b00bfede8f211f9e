use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("coordinate components must be finite numbers")]
    NotFinite,

    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),

    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),

    #[error("malformed coordinate {0:?}, expected \"lng,lat\"")]
    Malformed(String),
}

/// A configuration value that names an unknown option.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingError {
    #[error("unknown projection {0:?}, expected flat or globe")]
    Projection(String),

    #[error("unknown color {0:?}, expected a name, #rgb or #rrggbb")]
    Color(String),

    #[error("unknown geolocation setting {value:?}, expected unavailable, denied, position-unavailable, timeout or lng,lat: {source}")]
    Geolocation {
        value: String,
        source: CoordinateError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} requires an access token (set MAPBOX_ACCESS_TOKEN)")]
    MissingToken(&'static str),
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failure reported by a geolocation capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("user denied geolocation permission")]
    PermissionDenied,

    #[error("position unavailable")]
    PositionUnavailable,

    #[error("geolocation request timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("geocoding endpoint answered HTTP {0}")]
    Status(u16),

    #[error("empty response body")]
    EmptyBody,

    #[error("undecodable geocoding response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("boundary contains an invalid coordinate: {0}")]
    Coordinate(#[from] CoordinateError),

    #[error("boundary polygon has no rings")]
    EmptyBoundary,
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("failed to read label file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid label GeoJSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("label {index} has an invalid coordinate: {source}")]
    Coordinate {
        index: usize,
        source: CoordinateError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("map container is not mounted")]
    ContainerMissing,

    #[error("layer {0:?} already exists")]
    DuplicateLayer(String),

    #[error("source {0:?} does not exist")]
    MissingSource(String),
}
