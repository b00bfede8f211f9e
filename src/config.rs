use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::geo::{Coordinate, Projection};
use crate::geocoding::DEFAULT_GEOCODING_ENDPOINT;
use crate::geolocation::GeolocationSetting;

pub const DEFAULT_STYLE: &str = "mapbox://styles/mapbox/streets-v11";
pub const TOKENLESS_STYLE: &str = "carto-voyager";
pub const DEFAULT_ZOOM: f64 = 10.0;
pub const DEFAULT_TILE_CACHE_MB: u64 = 50;

/// Credential shared by the tile source and the geocoding endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PredefinedLocation {
    pub name: Option<String>,
    pub coordinate: Coordinate,
}

/// Locations seeded when the page skips geolocation
pub fn default_predefined_locations() -> Vec<PredefinedLocation> {
    match Coordinate::new(38.76, 9.04) {
        Ok(coordinate) => vec![PredefinedLocation { name: None, coordinate }],
        Err(_) => Vec::new(),
    }
}

/// What the page does once the map has loaded.
#[derive(Clone, Debug, PartialEq)]
pub enum MarkerSeeding {
    Geolocation,
    Predefined(Vec<PredefinedLocation>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClickBehavior {
    #[default]
    QueryAndNotify,
    DropMarker,
    ReverseGeocodeOverlay,
}

#[derive(Clone, Debug)]
pub struct MapPageConfig {
    pub access_token: Option<AccessToken>,
    pub style: String,
    pub center: Coordinate,
    pub zoom: f64,
    pub projection: Projection,
    pub seeding: MarkerSeeding,
    pub click: ClickBehavior,
    pub geolocation: GeolocationSetting,
    pub geocoding_endpoint: String,
    pub labels_path: Option<PathBuf>,
    pub tile_cache_dir: Option<PathBuf>,
    pub tile_cache_max_bytes: u64,
}

impl Default for MapPageConfig {
    fn default() -> Self {
        let center = Coordinate::new(38.76123, 9.01068).unwrap_or(Coordinate::normalized(0.0, 0.0));
        let device = Coordinate::new(38.76, 9.04).unwrap_or(center);
        Self {
            access_token: None,
            style: TOKENLESS_STYLE.to_string(),
            center,
            zoom: DEFAULT_ZOOM,
            projection: Projection::Mercator,
            seeding: MarkerSeeding::Geolocation,
            click: ClickBehavior::QueryAndNotify,
            geolocation: GeolocationSetting::Fixed(device),
            geocoding_endpoint: DEFAULT_GEOCODING_ENDPOINT.to_string(),
            labels_path: None,
            tile_cache_dir: None,
            tile_cache_max_bytes: DEFAULT_TILE_CACHE_MB * 1024 * 1024,
        }
    }
}

impl MapPageConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from any key/value source, falling back to
    /// defaults for missing keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = MapPageConfig::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        config.access_token = get("MAPBOX_ACCESS_TOKEN").map(AccessToken::new);
        config.style = match get("MAP_PAGE_STYLE") {
            Some(style) => style,
            None if config.access_token.is_some() => DEFAULT_STYLE.to_string(),
            None => TOKENLESS_STYLE.to_string(),
        };

        if let Some(v) = get("MAP_PAGE_CENTER") {
            config.center = v
                .parse()
                .map_err(|e| ConfigError::invalid("MAP_PAGE_CENTER", &v, e))?;
        }
        if let Some(v) = get("MAP_PAGE_ZOOM") {
            config.zoom = parse_zoom(&v)?;
        }
        if let Some(v) = get("MAP_PAGE_PROJECTION") {
            config.projection = v
                .parse()
                .map_err(|e| ConfigError::invalid("MAP_PAGE_PROJECTION", &v, e))?;
        }
        if let Some(v) = get("MAP_PAGE_SEEDING") {
            config.seeding = parse_seeding(&v)?;
        }
        if let Some(v) = get("MAP_PAGE_CLICK") {
            config.click = parse_click(&v)?;
        }
        if let Some(v) = get("MAP_PAGE_GEOLOCATION") {
            config.geolocation = v
                .parse()
                .map_err(|e| ConfigError::invalid("MAP_PAGE_GEOLOCATION", &v, e))?;
        }
        if let Some(v) = get("MAP_PAGE_GEOCODING_ENDPOINT") {
            config.geocoding_endpoint = v;
        }
        config.labels_path = get("MAP_PAGE_LABELS").map(PathBuf::from);
        config.tile_cache_dir = get("MAP_PAGE_TILE_CACHE_DIR").map(PathBuf::from);
        if let Some(v) = get("MAP_PAGE_TILE_CACHE_MAX_MB") {
            let mb: u64 = v
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("MAP_PAGE_TILE_CACHE_MAX_MB", &v, e))?;
            config.tile_cache_max_bytes = mb.saturating_mul(1024 * 1024);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.zoom.is_finite() || self.zoom < 0.0 {
            return Err(ConfigError::invalid("MAP_PAGE_ZOOM", &self.zoom.to_string(), "zoom must be >= 0"));
        }
        if self.click == ClickBehavior::ReverseGeocodeOverlay && self.access_token.is_none() {
            return Err(ConfigError::MissingToken("reverse geocoding"));
        }
        Ok(())
    }
}

fn parse_zoom(v: &str) -> Result<f64, ConfigError> {
    let zoom: f64 = v
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid("MAP_PAGE_ZOOM", v, e))?;
    if !zoom.is_finite() || zoom < 0.0 {
        return Err(ConfigError::invalid("MAP_PAGE_ZOOM", v, "zoom must be >= 0"));
    }
    Ok(zoom)
}

/// `geolocation`, `predefined`, or `predefined:lng,lat;lng,lat`
fn parse_seeding(v: &str) -> Result<MarkerSeeding, ConfigError> {
    let v = v.trim();
    if v.eq_ignore_ascii_case("geolocation") {
        return Ok(MarkerSeeding::Geolocation);
    }
    if v.eq_ignore_ascii_case("predefined") {
        return Ok(MarkerSeeding::Predefined(default_predefined_locations()));
    }

    let list = v
        .strip_prefix("predefined:")
        .ok_or_else(|| ConfigError::invalid("MAP_PAGE_SEEDING", v, "expected geolocation or predefined[:lng,lat;...]"))?;
    let locations = list
        .split(';')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.parse::<Coordinate>()
                .map(|coordinate| PredefinedLocation { name: None, coordinate })
                .map_err(|e| ConfigError::invalid("MAP_PAGE_SEEDING", v, e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MarkerSeeding::Predefined(locations))
}

fn parse_click(v: &str) -> Result<ClickBehavior, ConfigError> {
    match v.trim().to_ascii_lowercase().as_str() {
        "query" => Ok(ClickBehavior::QueryAndNotify),
        "drop-marker" => Ok(ClickBehavior::DropMarker),
        "reverse-geocode" => Ok(ClickBehavior::ReverseGeocodeOverlay),
        _ => Err(ConfigError::invalid(
            "MAP_PAGE_CLICK",
            v,
            "expected query, drop-marker or reverse-geocode",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<MapPageConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MapPageConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config(&[]).unwrap();
        assert_eq!(config.style, TOKENLESS_STYLE);
        assert_eq!(config.zoom, 10.0);
        assert_eq!(config.center, Coordinate::new(38.76123, 9.01068).unwrap());
        assert_eq!(config.seeding, MarkerSeeding::Geolocation);
        assert_eq!(config.click, ClickBehavior::QueryAndNotify);
    }

    #[test]
    fn token_selects_mapbox_style() {
        let config = config(&[("MAPBOX_ACCESS_TOKEN", "pk.abc")]).unwrap();
        assert_eq!(config.style, DEFAULT_STYLE);
        assert_eq!(config.access_token.as_ref().map(|t| t.expose()), Some("pk.abc"));
        assert_eq!(format!("{:?}", config.access_token), "Some(AccessToken(..))");
    }

    #[test]
    fn parses_variant_settings() {
        let config = config(&[
            ("MAP_PAGE_SEEDING", "predefined:38.76,9.04;38.8,9.0"),
            ("MAP_PAGE_CLICK", "drop-marker"),
            ("MAP_PAGE_PROJECTION", "globe"),
            ("MAP_PAGE_ZOOM", "2.5"),
        ])
        .unwrap();
        match config.seeding {
            MarkerSeeding::Predefined(list) => assert_eq!(list.len(), 2),
            other => panic!("unexpected seeding {other:?}"),
        }
        assert_eq!(config.click, ClickBehavior::DropMarker);
        assert_eq!(config.projection, Projection::Globe);
        assert_eq!(config.zoom, 2.5);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config(&[("MAP_PAGE_ZOOM", "-1")]),
            Err(ConfigError::Invalid { key: "MAP_PAGE_ZOOM", .. })
        ));
        assert!(matches!(
            config(&[("MAP_PAGE_CENTER", "200,0")]),
            Err(ConfigError::Invalid { key: "MAP_PAGE_CENTER", .. })
        ));
        assert!(matches!(
            config(&[("MAP_PAGE_CLICK", "teleport")]),
            Err(ConfigError::Invalid { key: "MAP_PAGE_CLICK", .. })
        ));
    }

    #[test]
    fn reverse_geocoding_needs_a_token() {
        assert!(matches!(
            config(&[("MAP_PAGE_CLICK", "reverse-geocode")]),
            Err(ConfigError::MissingToken(_))
        ));
        assert!(config(&[("MAP_PAGE_CLICK", "reverse-geocode"), ("MAPBOX_ACCESS_TOKEN", "pk.abc")]).is_ok());
    }
}
