use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoordinateError, SettingError};

/// Tile size in pixels (standard OSM tile size)
pub const TILE_SIZE: f64 = 256.0;

/// Web Mercator cuts the world off at this latitude
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// Below this zoom the globe projection draws an actual globe
pub const GLOBE_TO_MERCATOR_ZOOM: f64 = 5.0;

/// Earth circumference at the equator in meters
const EARTH_CIRCUMFERENCE: f64 = 40_075_016.686;

/// A geographic position. Always finite and inside the valid ranges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coordinate {
    lng: f64,
    lat: f64,
}

impl Coordinate {
    pub fn new(lng: f64, lat: f64) -> Result<Self, CoordinateError> {
        if !lng.is_finite() || !lat.is_finite() {
            return Err(CoordinateError::NotFinite);
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::Longitude(lng));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::Latitude(lat));
        }
        Ok(Self { lng, lat })
    }

    /// Builds a coordinate from values produced by projection math, wrapping
    /// the longitude and clamping the latitude.
    pub(crate) fn normalized(lng: f64, lat: f64) -> Self {
        Self { lng: wrap_longitude(lng), lat: lat.clamp(-90.0, 90.0) }
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }
}

/// Wraps a longitude into [-180, 180], leaving in-range values untouched
pub(crate) fn wrap_longitude(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        lng
    } else {
        (lng + 180.0).rem_euclid(360.0) - 180.0
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lng, self.lat)
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    /// Parses `"lng,lat"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CoordinateError::Malformed(s.to_string());
        let (lng, lat) = s.split_once(',').ok_or_else(malformed)?;
        let lng = lng.trim().parse::<f64>().map_err(|_| malformed())?;
        let lat = lat.trim().parse::<f64>().map_err(|_| malformed())?;
        Coordinate::new(lng, lat)
    }
}

/// Widget-local pixel position, origin at the top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    Mercator,
    Globe,
}

impl FromStr for Projection {
    type Err = SettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" | "mercator" => Ok(Projection::Mercator),
            "globe" => Ok(Projection::Globe),
            other => Err(SettingError::Projection(other.to_string())),
        }
    }
}

/// What the widget is currently showing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub center: Coordinate,
    pub zoom: f64,
    pub width: f64,
    pub height: f64,
    pub projection: Projection,
}

impl Viewport {
    /// World width in pixels at the current zoom
    pub fn world_size(&self) -> f64 {
        TILE_SIZE * 2.0_f64.powf(self.zoom)
    }

    pub fn renders_globe(&self) -> bool {
        self.projection == Projection::Globe && self.zoom < GLOBE_TO_MERCATOR_ZOOM
    }

    /// Globe radius in pixels, matching the Mercator scale at the equator
    pub fn globe_radius(&self) -> f64 {
        self.world_size() / (2.0 * PI)
    }

    pub fn contains(&self, point: ScreenPoint) -> bool {
        point.x >= 0.0 && point.y >= 0.0 && point.x <= self.width && point.y <= self.height
    }

    /// Screen position of `at`, or None when it faces away on the globe.
    pub fn project(&self, at: Coordinate) -> Option<ScreenPoint> {
        if self.renders_globe() {
            self.project_globe(at)
        } else {
            Some(self.project_mercator(at))
        }
    }

    /// Geographic position under `point`, or None when it is off the world.
    pub fn unproject(&self, point: ScreenPoint) -> Option<Coordinate> {
        if self.renders_globe() {
            self.unproject_globe(point)
        } else {
            self.unproject_mercator(point)
        }
    }

    fn project_mercator(&self, at: Coordinate) -> ScreenPoint {
        let world = self.world_size();
        let (wx, wy) = mercator_world(at, world);
        let (cx, cy) = mercator_world(self.center, world);

        // Pick the world copy closest to the center
        let mut dx = wx - cx;
        if dx > world / 2.0 {
            dx -= world;
        } else if dx < -world / 2.0 {
            dx += world;
        }

        ScreenPoint {
            x: self.width / 2.0 + dx,
            y: self.height / 2.0 + (wy - cy),
        }
    }

    fn unproject_mercator(&self, point: ScreenPoint) -> Option<Coordinate> {
        let world = self.world_size();
        let (cx, cy) = mercator_world(self.center, world);
        let wx = cx + point.x - self.width / 2.0;
        let wy = cy + point.y - self.height / 2.0;
        if !(0.0..=world).contains(&wy) {
            return None;
        }

        let lng = wx / world * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * wy / world)).sinh().atan().to_degrees();
        Some(Coordinate::normalized(lng, lat))
    }

    fn project_globe(&self, at: Coordinate) -> Option<ScreenPoint> {
        let r = self.globe_radius();
        let (lam, phi) = (at.lng.to_radians(), at.lat.to_radians());
        let (lam0, phi0) = (self.center.lng.to_radians(), self.center.lat.to_radians());

        let cos_c = phi0.sin() * phi.sin() + phi0.cos() * phi.cos() * (lam - lam0).cos();
        if cos_c < 0.0 {
            return None;
        }

        let x = r * phi.cos() * (lam - lam0).sin();
        let y = r * (phi0.cos() * phi.sin() - phi0.sin() * phi.cos() * (lam - lam0).cos());
        Some(ScreenPoint {
            x: self.width / 2.0 + x,
            y: self.height / 2.0 - y,
        })
    }

    fn unproject_globe(&self, point: ScreenPoint) -> Option<Coordinate> {
        let r = self.globe_radius();
        let x = point.x - self.width / 2.0;
        let y = self.height / 2.0 - point.y;
        let rho = (x * x + y * y).sqrt();
        if rho > r {
            return None;
        }
        if rho < f64::EPSILON {
            return Some(self.center);
        }

        let (lam0, phi0) = (self.center.lng.to_radians(), self.center.lat.to_radians());
        let c = (rho / r).asin();
        let phi = (c.cos() * phi0.sin() + y * c.sin() * phi0.cos() / rho).asin();
        let lam = lam0 + (x * c.sin()).atan2(rho * c.cos() * phi0.cos() - y * c.sin() * phi0.sin());
        Some(Coordinate::normalized(lam.to_degrees(), phi.to_degrees()))
    }

    /// Meters per pixel at the current zoom level and center latitude
    pub fn meters_per_pixel(&self) -> f64 {
        EARTH_CIRCUMFERENCE / self.world_size() * self.center.lat.to_radians().cos()
    }
}

/// Position of `at` in Web Mercator world pixels.
pub fn mercator_world(at: Coordinate, world_size: f64) -> (f64, f64) {
    let x = (at.lng + 180.0) / 360.0 * world_size;
    let lat_rad = at.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * world_size;
    (x, y)
}

/// Default duration of an animated view transition, in seconds
pub const FLY_TO_DURATION: f64 = 1.2;

/// Eased transition of the view center and zoom.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlyTo {
    from: Coordinate,
    from_zoom: f64,
    to: Coordinate,
    to_zoom: f64,
    duration: f64,
    started_at: Option<f64>,
}

impl FlyTo {
    pub fn new(from: Coordinate, from_zoom: f64, to: Coordinate, to_zoom: f64) -> Self {
        Self {
            from,
            from_zoom,
            to,
            to_zoom,
            duration: FLY_TO_DURATION,
            started_at: None,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds.max(0.0);
        self
    }

    /// Advances to frame time `now`, returning the view to show and whether
    /// the transition has finished. The first call anchors the start time.
    pub fn step(&mut self, now: f64) -> (Coordinate, f64, bool) {
        let start = *self.started_at.get_or_insert(now);
        let t = if self.duration > 0.0 {
            ((now - start) / self.duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let (center, zoom) = self.sample(t);
        (center, zoom, t >= 1.0)
    }

    /// View at normalized progress `t` in [0, 1].
    pub fn sample(&self, t: f64) -> (Coordinate, f64) {
        let t = t.clamp(0.0, 1.0);
        if t >= 1.0 {
            return (self.to, self.to_zoom);
        }
        let e = ease_in_out_cubic(t);

        let mut dlng = self.to.lng - self.from.lng;
        if dlng > 180.0 {
            dlng -= 360.0;
        } else if dlng < -180.0 {
            dlng += 360.0;
        }
        let lng = self.from.lng + dlng * e;
        let lat = self.from.lat + (self.to.lat - self.from.lat) * e;
        let zoom = self.from_zoom + (self.to_zoom - self.from_zoom) * e;
        (Coordinate::normalized(lng, lat), zoom)
    }
}

fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}
