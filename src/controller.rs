//! Orchestration of the map page: seeds the view once the map has loaded,
//! reacts to pointer input and reports what it finds.
//!
//! The controller never touches a toolkit directly. The map widget, the
//! notification surface and HTTP all sit behind the traits in this module,
//! so the same page logic drives the Makepad widget and the test host.

use std::collections::HashSet;

use crate::config::{ClickBehavior, MapPageConfig, MarkerSeeding};
use crate::error::{GeocodeError, GeolocationError, MapError};
use crate::features::{RenderedFeature, LABEL_LAYERS};
use crate::geo::{Coordinate, Projection, ScreenPoint};
use crate::geocoding::{parse_boundary, reverse_geocode_url};
use crate::geolocation::{GeolocationProvider, Ticket};
use crate::markers::{Marker, MarkerColor, PAGE_MARKER_SCALE};
use crate::notify::Notifier;
use crate::overlay::{FillLayer, Polygon, CITY_BOUNDARY_LAYER, CITY_BOUNDARY_SOURCE};

/// Zoom the view flies to once the device position is known
pub const LOCATE_ZOOM: f64 = 12.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorStyle {
    #[default]
    Default,
    Pointer,
}

/// The operations the page needs from a map widget.
pub trait MapSurface {
    fn add_marker(&mut self, marker: Marker);

    /// Animates the view to `center` at `zoom`.
    fn fly_to(&mut self, center: Coordinate, zoom: f64);

    /// Screen position of `at` under the current view, None if not visible
    /// in the current projection.
    fn project(&self, at: Coordinate) -> Option<ScreenPoint>;

    fn query_rendered_features(&self, at: ScreenPoint, layers: &[&str]) -> Vec<RenderedFeature>;

    fn set_cursor(&mut self, cursor: CursorStyle);

    /// Adds a GeoJSON source or replaces the data of an existing one.
    fn set_geojson_source(&mut self, id: &str, polygon: Polygon);

    fn add_fill_layer(&mut self, layer: FillLayer) -> Result<(), MapError>;

    fn has_layer(&self, id: &str) -> bool;
}

pub trait HttpClient {
    /// Starts a GET whose response is delivered back tagged with `ticket`.
    fn get(&mut self, ticket: Ticket, url: &str);
}

/// Everything the page talks to while handling one event.
pub trait PageHost: MapSurface + HttpClient + Notifier {}

impl<T: MapSurface + HttpClient + Notifier> PageHost for T {}

/// Arguments used to construct the map widget.
#[derive(Clone, Debug, PartialEq)]
pub struct MapOptions {
    pub style: String,
    pub center: Coordinate,
    pub zoom: f64,
    pub projection: Projection,
}

/// A click on the map, in both screen and geographic space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapClick {
    pub point: ScreenPoint,
    pub coordinate: Coordinate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryMode {
    /// Reports every feature at the device position
    Location,
    /// Reports the topmost feature under a click
    Click,
}

/// A failure the page absorbed instead of surfacing.
#[derive(Debug)]
pub enum PageIncident {
    GeolocationUnsupported,
    Geolocation(GeolocationError),
    Geocode(GeocodeError),
    Overlay(MapError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Mounted { loaded: bool },
    TornDown,
}

pub struct MapPageController {
    config: MapPageConfig,
    geolocation: Option<Box<dyn GeolocationProvider>>,
    lifecycle: Lifecycle,
    next_ticket: u64,
    pending_position: Option<Ticket>,
    pending_geocodes: HashSet<Ticket>,
    incidents: Vec<PageIncident>,
}

impl MapPageController {
    /// Mounts a page using the geolocation capability described by the
    /// configuration.
    pub fn new(config: MapPageConfig) -> Self {
        let geolocation = config.geolocation.provider();
        Self::with_geolocation(config, geolocation)
    }

    pub fn with_geolocation(config: MapPageConfig, geolocation: Option<Box<dyn GeolocationProvider>>) -> Self {
        Self {
            config,
            geolocation,
            lifecycle: Lifecycle::Mounted { loaded: false },
            next_ticket: 0,
            pending_position: None,
            pending_geocodes: HashSet::new(),
            incidents: Vec::new(),
        }
    }

    pub fn map_options(&self) -> MapOptions {
        MapOptions {
            style: self.config.style.clone(),
            center: self.config.center,
            zoom: self.config.zoom,
            projection: self.config.projection,
        }
    }

    pub fn is_mounted(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Mounted { .. })
    }

    pub fn incidents(&self) -> &[PageIncident] {
        &self.incidents
    }

    pub fn pending_geocodes(&self) -> impl Iterator<Item = Ticket> + '_ {
        self.pending_geocodes.iter().copied()
    }

    pub fn has_pending_position(&self) -> bool {
        self.pending_position.is_some()
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        Ticket(self.next_ticket)
    }

    fn record(&mut self, incident: PageIncident) {
        tracing::warn!(?incident, "map page failure absorbed");
        self.incidents.push(incident);
    }

    /// Handles the widget's one-time load event.
    pub fn on_load(&mut self, host: &mut impl PageHost) {
        match self.lifecycle {
            Lifecycle::Mounted { loaded: false } => {
                self.lifecycle = Lifecycle::Mounted { loaded: true };
            }
            Lifecycle::Mounted { loaded: true } => {
                tracing::debug!("ignoring repeated load event");
                return;
            }
            Lifecycle::TornDown => return,
        }
        tracing::info!("map loaded");

        match &self.config.seeding {
            MarkerSeeding::Geolocation => self.request_position(),
            MarkerSeeding::Predefined(locations) => {
                for location in locations {
                    host.add_marker(
                        Marker::new(location.coordinate, MarkerColor::Green).with_scale(PAGE_MARKER_SCALE),
                    );
                }
                tracing::debug!(count = locations.len(), "seeded predefined markers");
            }
        }
    }

    fn request_position(&mut self) {
        let ticket = self.issue_ticket();
        match self.geolocation.as_mut() {
            Some(provider) => {
                provider.request_current_position(ticket);
                self.pending_position = Some(ticket);
            }
            None => self.record(PageIncident::GeolocationUnsupported),
        }
    }

    /// Dispatches any finished geolocation requests.
    pub fn poll_geolocation(&mut self, host: &mut impl PageHost) {
        loop {
            let Some(update) = self.geolocation.as_mut().and_then(|g| g.poll_position()) else {
                break;
            };
            self.on_position(host, update.ticket, update.result);
        }
    }

    pub fn on_position(
        &mut self,
        host: &mut impl PageHost,
        ticket: Ticket,
        result: Result<Coordinate, GeolocationError>,
    ) {
        if !self.is_mounted() || self.pending_position != Some(ticket) {
            tracing::debug!(?ticket, "dropping stale position result");
            return;
        }
        self.pending_position = None;

        match result {
            Ok(at) => {
                tracing::info!(lng = at.lng(), lat = at.lat(), "device located");
                host.add_marker(Marker::new(at, MarkerColor::Blue).with_scale(PAGE_MARKER_SCALE));
                host.fly_to(at, LOCATE_ZOOM);
                let point = host.project(at);
                self.feature_query(host, point, QueryMode::Location);
            }
            Err(err) => self.record(PageIncident::Geolocation(err)),
        }
    }

    /// Queries label features at `point` and reports them. A point that
    /// could not be projected counts as an empty result.
    pub fn feature_query(&self, host: &mut impl PageHost, point: Option<ScreenPoint>, mode: QueryMode) {
        let features = point
            .map(|p| host.query_rendered_features(p, &LABEL_LAYERS))
            .unwrap_or_default();

        match (mode, features.first()) {
            (QueryMode::Location, None) => {
                host.warning("Nothing found at your current location".to_string());
            }
            (QueryMode::Click, None) => {
                host.warning("No label or feature found at this location.".to_string());
            }
            (QueryMode::Location, Some(_)) => {
                for feature in &features {
                    tracing::debug!(name = feature.display_name(), layer = %feature.source_layer, "feature at location");
                    host.info(format!("You are around {}", feature.display_name()));
                }
            }
            (QueryMode::Click, Some(first)) => {
                host.info(format!("Clicked place: {}", first.display_name()));
            }
        }
    }

    pub fn on_pointer_move(&mut self, host: &mut impl PageHost, point: ScreenPoint) {
        if !self.is_mounted() {
            return;
        }
        let hovering = !host.query_rendered_features(point, &LABEL_LAYERS).is_empty();
        host.set_cursor(if hovering { CursorStyle::Pointer } else { CursorStyle::Default });
    }

    pub fn on_click(&mut self, host: &mut impl PageHost, click: MapClick) {
        if !self.is_mounted() {
            return;
        }
        match self.config.click {
            ClickBehavior::QueryAndNotify => self.feature_query(host, Some(click.point), QueryMode::Click),
            ClickBehavior::DropMarker => {
                let at = click.coordinate;
                host.add_marker(Marker::new(at, MarkerColor::Red).with_scale(PAGE_MARKER_SCALE));
                host.info(format!("lng: {:.2}, lat: {:.2}", at.lng(), at.lat()));
            }
            ClickBehavior::ReverseGeocodeOverlay => self.request_boundary(host, click.coordinate),
        }
    }

    fn request_boundary(&mut self, host: &mut impl PageHost, at: Coordinate) {
        let Some(token) = self.config.access_token.clone() else {
            self.record(PageIncident::Geocode(GeocodeError::Network(
                "no access token configured".to_string(),
            )));
            return;
        };
        let ticket = self.issue_ticket();
        let url = reverse_geocode_url(&self.config.geocoding_endpoint, at, &token);
        tracing::debug!(?ticket, lng = at.lng(), lat = at.lat(), "reverse geocoding click");
        self.pending_geocodes.insert(ticket);
        host.get(ticket, &url);
    }

    /// Handles the body (or failure) of a reverse geocoding request.
    pub fn on_geocode_response(
        &mut self,
        host: &mut impl PageHost,
        ticket: Ticket,
        response: Result<Vec<u8>, GeocodeError>,
    ) {
        if !self.is_mounted() || !self.pending_geocodes.remove(&ticket) {
            tracing::debug!(?ticket, "dropping stale geocoding response");
            return;
        }

        let boundary = match response.and_then(|body| parse_boundary(&body)) {
            Ok(Some(boundary)) => boundary,
            Ok(None) => {
                tracing::debug!(?ticket, "no place found for click");
                return;
            }
            Err(err) => {
                self.record(PageIncident::Geocode(err));
                return;
            }
        };

        tracing::info!(place = %boundary.place_name, "drawing city boundary");
        host.set_geojson_source(CITY_BOUNDARY_SOURCE, boundary.polygon);
        if !host.has_layer(CITY_BOUNDARY_LAYER) {
            if let Err(err) = host.add_fill_layer(FillLayer::city_boundary()) {
                self.record(PageIncident::Overlay(err));
            }
        }
    }

    /// Unmounts the page. Results that arrive afterwards are ignored.
    pub fn teardown(&mut self) {
        if self.lifecycle == Lifecycle::TornDown {
            return;
        }
        tracing::info!(
            pending_position = self.pending_position.is_some(),
            pending_geocodes = self.pending_geocodes.len(),
            "tearing down map page"
        );
        self.lifecycle = Lifecycle::TornDown;
        self.pending_position = None;
        self.pending_geocodes.clear();
        self.geolocation = None;
    }
}
