use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use makepad_map_page::config::{AccessToken, ClickBehavior, MapPageConfig, MarkerSeeding, PredefinedLocation};
use makepad_map_page::controller::{
    CursorStyle, HttpClient, MapClick, MapPageController, MapSurface, PageIncident, QueryMode, LOCATE_ZOOM,
};
use makepad_map_page::error::{GeocodeError, GeolocationError, MapError};
use makepad_map_page::features::{RenderedFeature, LABEL_LAYERS, SETTLEMENT_LABEL};
use makepad_map_page::geo::{Coordinate, ScreenPoint};
use makepad_map_page::geolocation::{FixedGeolocation, GeolocationProvider, PositionUpdate, Ticket};
use makepad_map_page::markers::{Marker, MarkerColor, PAGE_MARKER_SCALE};
use makepad_map_page::notify::{Notification, Notifier, Severity};
use makepad_map_page::overlay::{FillLayer, Polygon, CITY_BOUNDARY_LAYER, CITY_BOUNDARY_SOURCE};

/// Records everything the page does to its host.
#[derive(Default)]
struct RecordingHost {
    markers: Vec<Marker>,
    flights: Vec<(Coordinate, f64)>,
    cursors: Vec<CursorStyle>,
    notifications: Vec<Notification>,
    requests: Vec<(Ticket, String)>,
    sources: HashMap<String, Polygon>,
    source_writes: usize,
    layers: Vec<FillLayer>,
    queries: RefCell<Vec<(ScreenPoint, Vec<String>)>>,
    /// Screen position every coordinate projects to
    projected: Option<ScreenPoint>,
    /// Features returned by every query
    features: Vec<RenderedFeature>,
}

impl RecordingHost {
    fn answering(features: &[&str]) -> Self {
        Self {
            projected: Some(ScreenPoint::new(200.0, 150.0)),
            features: features
                .iter()
                .map(|name| RenderedFeature {
                    name: Some(name.to_string()),
                    source_layer: SETTLEMENT_LABEL.to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }

    fn texts(&self) -> Vec<(Severity, &str)> {
        self.notifications.iter().map(|n| (n.severity, n.text.as_str())).collect()
    }
}

impl MapSurface for RecordingHost {
    fn add_marker(&mut self, marker: Marker) {
        self.markers.push(marker);
    }

    fn fly_to(&mut self, center: Coordinate, zoom: f64) {
        self.flights.push((center, zoom));
    }

    fn project(&self, _at: Coordinate) -> Option<ScreenPoint> {
        self.projected
    }

    fn query_rendered_features(&self, at: ScreenPoint, layers: &[&str]) -> Vec<RenderedFeature> {
        self.queries
            .borrow_mut()
            .push((at, layers.iter().map(|l| l.to_string()).collect()));
        self.features.clone()
    }

    fn set_cursor(&mut self, cursor: CursorStyle) {
        self.cursors.push(cursor);
    }

    fn set_geojson_source(&mut self, id: &str, polygon: Polygon) {
        self.source_writes += 1;
        self.sources.insert(id.to_string(), polygon);
    }

    fn add_fill_layer(&mut self, layer: FillLayer) -> Result<(), MapError> {
        if self.layers.iter().any(|l| l.id == layer.id) {
            return Err(MapError::DuplicateLayer(layer.id));
        }
        if !self.sources.contains_key(&layer.source) {
            return Err(MapError::MissingSource(layer.source));
        }
        self.layers.push(layer);
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|l| l.id == id)
    }
}

impl HttpClient for RecordingHost {
    fn get(&mut self, ticket: Ticket, url: &str) {
        self.requests.push((ticket, url.to_string()));
    }
}

impl Notifier for RecordingHost {
    fn notify(&mut self, severity: Severity, text: String) {
        self.notifications.push(Notification { severity, text });
    }
}

/// A provider that holds requests until the test answers them.
#[derive(Default)]
struct ManualGeolocation {
    requested: Rc<RefCell<Vec<Ticket>>>,
}

impl GeolocationProvider for ManualGeolocation {
    fn request_current_position(&mut self, ticket: Ticket) {
        self.requested.borrow_mut().push(ticket);
    }

    fn poll_position(&mut self) -> Option<PositionUpdate> {
        None
    }
}

fn coord(lng: f64, lat: f64) -> Coordinate {
    Coordinate::new(lng, lat).unwrap()
}

fn addis() -> Coordinate {
    coord(38.76, 9.04)
}

fn page(click: ClickBehavior) -> MapPageController {
    let config = MapPageConfig { click, ..MapPageConfig::default() };
    MapPageController::with_geolocation(config, Some(Box::new(FixedGeolocation::at(addis()))))
}

fn click_at(x: f64, y: f64) -> MapClick {
    MapClick { point: ScreenPoint::new(x, y), coordinate: addis() }
}

fn boundary_body() -> Vec<u8> {
    br#"{"features": [{"place_name": "Addis Ababa, Ethiopia",
        "geometry": {"coordinates": [[[38.6, 8.9], [38.9, 8.9], [38.9, 9.1], [38.6, 8.9]]]}}]}"#
        .to_vec()
}

#[test]
fn located_device_gets_a_blue_marker_and_flight() {
    let mut page = page(ClickBehavior::QueryAndNotify);
    let mut host = RecordingHost::answering(&["Arada"]);

    page.on_load(&mut host);
    assert!(page.has_pending_position());
    page.poll_geolocation(&mut host);

    assert_eq!(host.markers.len(), 1);
    assert_eq!(host.markers[0].coordinate, addis());
    assert_eq!(host.markers[0].color, MarkerColor::Blue);
    assert_eq!(host.markers[0].scale, PAGE_MARKER_SCALE);
    assert_eq!(host.flights, vec![(addis(), LOCATE_ZOOM)]);
    let queries = host.queries.borrow();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].0, ScreenPoint::new(200.0, 150.0));
    assert_eq!(queries[0].1, LABEL_LAYERS.map(String::from).to_vec());
    drop(queries);
    assert_eq!(host.texts(), vec![(Severity::Info, "You are around Arada")]);
    assert!(!page.has_pending_position());
}

#[test]
fn location_query_reports_every_feature_in_order() {
    let page = page(ClickBehavior::QueryAndNotify);
    let mut host = RecordingHost::answering(&["Arada", "Piassa", "Addis Ababa"]);

    page.feature_query(
        &mut host,
        Some(ScreenPoint::new(10.0, 10.0)),
        QueryMode::Location,
    );

    assert_eq!(
        host.texts(),
        vec![
            (Severity::Info, "You are around Arada"),
            (Severity::Info, "You are around Piassa"),
            (Severity::Info, "You are around Addis Ababa"),
        ]
    );
}

#[test]
fn location_without_features_warns_once() {
    let mut page = page(ClickBehavior::QueryAndNotify);
    let mut host = RecordingHost::answering(&[]);

    page.on_load(&mut host);
    page.poll_geolocation(&mut host);

    assert_eq!(host.texts(), vec![(Severity::Warning, "Nothing found at your current location")]);
}

#[test]
fn unprojectable_location_counts_as_nothing_found() {
    let mut page = page(ClickBehavior::QueryAndNotify);
    let mut host = RecordingHost { projected: None, ..RecordingHost::answering(&["Arada"]) };

    page.on_load(&mut host);
    page.poll_geolocation(&mut host);

    assert_eq!(host.markers.len(), 1);
    assert_eq!(host.texts(), vec![(Severity::Warning, "Nothing found at your current location")]);
}

#[test]
fn click_reports_only_the_topmost_feature() {
    let mut page = page(ClickBehavior::QueryAndNotify);
    let mut host = RecordingHost::answering(&["Piassa", "Arada"]);

    page.on_click(&mut host, click_at(100.0, 100.0));

    assert_eq!(host.texts(), vec![(Severity::Info, "Clicked place: Piassa")]);
}

#[test]
fn click_on_empty_map_warns() {
    let mut page = page(ClickBehavior::QueryAndNotify);
    let mut host = RecordingHost::answering(&[]);

    page.on_click(&mut host, click_at(100.0, 100.0));

    assert_eq!(host.texts(), vec![(Severity::Warning, "No label or feature found at this location.")]);
}

#[test]
fn unnamed_features_get_a_placeholder() {
    let mut page = page(ClickBehavior::QueryAndNotify);
    let mut host = RecordingHost::answering(&[]);
    host.features.push(RenderedFeature { name: None, source_layer: SETTLEMENT_LABEL.to_string() });

    page.on_click(&mut host, click_at(1.0, 1.0));

    assert_eq!(host.texts(), vec![(Severity::Info, "Clicked place: unnamed place")]);
}

#[test]
fn cursor_follows_features_under_the_pointer() {
    let mut page = page(ClickBehavior::QueryAndNotify);
    let mut host = RecordingHost::answering(&["Arada"]);

    page.on_pointer_move(&mut host, ScreenPoint::new(5.0, 5.0));
    host.features.clear();
    page.on_pointer_move(&mut host, ScreenPoint::new(300.0, 5.0));

    assert_eq!(host.cursors, vec![CursorStyle::Pointer, CursorStyle::Default]);
}

#[test]
fn drop_marker_places_red_marker_and_shows_coordinates() {
    let mut page = page(ClickBehavior::DropMarker);
    let mut host = RecordingHost::answering(&["Arada"]);

    page.on_click(&mut host, MapClick { point: ScreenPoint::new(1.0, 1.0), coordinate: coord(38.7612, 9.0411) });

    assert_eq!(host.markers.len(), 1);
    assert_eq!(host.markers[0].color, MarkerColor::Red);
    let texts = host.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].1.contains("38.76"));
    assert!(texts[0].1.contains("9.04"));
}

#[test]
fn denied_permission_is_absorbed() {
    let config = MapPageConfig::default();
    let mut page = MapPageController::with_geolocation(
        config,
        Some(Box::new(FixedGeolocation::failing(GeolocationError::PermissionDenied))),
    );
    let mut host = RecordingHost::answering(&["Arada"]);

    page.on_load(&mut host);
    page.poll_geolocation(&mut host);

    assert!(host.markers.is_empty());
    assert!(host.flights.is_empty());
    assert!(host.notifications.is_empty());
    assert_eq!(page.incidents().len(), 1);
    assert!(matches!(
        page.incidents()[0],
        PageIncident::Geolocation(GeolocationError::PermissionDenied)
    ));
}

#[test]
fn missing_geolocation_is_recorded() {
    let mut page = MapPageController::with_geolocation(MapPageConfig::default(), None);
    let mut host = RecordingHost::answering(&["Arada"]);

    page.on_load(&mut host);

    assert!(!page.has_pending_position());
    assert!(host.markers.is_empty());
    assert!(matches!(page.incidents(), [PageIncident::GeolocationUnsupported]));
}

#[test]
fn load_seeds_only_once() {
    let provider = ManualGeolocation::default();
    let requested = provider.requested.clone();
    let mut page = MapPageController::with_geolocation(MapPageConfig::default(), Some(Box::new(provider)));
    let mut host = RecordingHost::answering(&[]);

    page.on_load(&mut host);
    page.on_load(&mut host);

    assert_eq!(requested.borrow().len(), 1);
}

#[test]
fn predefined_seeding_skips_geolocation() {
    let provider = ManualGeolocation::default();
    let requested = provider.requested.clone();
    let config = MapPageConfig {
        seeding: MarkerSeeding::Predefined(vec![
            PredefinedLocation { name: None, coordinate: addis() },
            PredefinedLocation { name: Some("Bole".to_string()), coordinate: coord(38.79, 8.98) },
        ]),
        ..MapPageConfig::default()
    };
    let mut page = MapPageController::with_geolocation(config, Some(Box::new(provider)));
    let mut host = RecordingHost::answering(&["Arada"]);

    page.on_load(&mut host);

    assert!(requested.borrow().is_empty());
    assert_eq!(host.markers.len(), 2);
    assert!(host.markers.iter().all(|m| m.color == MarkerColor::Green));
    assert!(host.notifications.is_empty());
}

#[test]
fn stale_position_results_are_dropped() {
    let provider = ManualGeolocation::default();
    let requested = provider.requested.clone();
    let mut page = MapPageController::with_geolocation(MapPageConfig::default(), Some(Box::new(provider)));
    let mut host = RecordingHost::answering(&["Arada"]);

    page.on_load(&mut host);
    let ticket = requested.borrow()[0];

    page.on_position(&mut host, Ticket(ticket.0 + 41), Ok(addis()));
    assert!(host.markers.is_empty());
    assert!(page.has_pending_position());

    page.on_position(&mut host, ticket, Ok(addis()));
    page.on_position(&mut host, ticket, Ok(addis()));
    assert_eq!(host.markers.len(), 1);
}

#[test]
fn results_after_teardown_are_ignored() {
    let provider = ManualGeolocation::default();
    let requested = provider.requested.clone();
    let config = MapPageConfig {
        access_token: Some(AccessToken::new("pk.test")),
        click: ClickBehavior::ReverseGeocodeOverlay,
        ..MapPageConfig::default()
    };
    let mut page = MapPageController::with_geolocation(config, Some(Box::new(provider)));
    let mut host = RecordingHost::answering(&["Arada"]);

    page.on_load(&mut host);
    page.on_click(&mut host, click_at(1.0, 1.0));
    let position = requested.borrow()[0];
    let (geocode, _) = host.requests[0].clone();

    page.teardown();
    assert!(!page.is_mounted());
    assert_eq!(page.pending_geocodes().count(), 0);

    page.on_position(&mut host, position, Ok(addis()));
    page.on_geocode_response(&mut host, geocode, Ok(boundary_body()));
    page.on_click(&mut host, click_at(1.0, 1.0));
    page.on_pointer_move(&mut host, ScreenPoint::new(1.0, 1.0));

    assert!(host.markers.is_empty());
    assert!(host.notifications.is_empty());
    assert!(host.sources.is_empty());
    assert!(host.cursors.is_empty());
    assert_eq!(host.requests.len(), 1);
}

#[test]
fn reverse_geocode_draws_the_boundary_once() {
    let config = MapPageConfig {
        access_token: Some(AccessToken::new("pk.test")),
        click: ClickBehavior::ReverseGeocodeOverlay,
        ..MapPageConfig::default()
    };
    let mut page = MapPageController::with_geolocation(config, None);
    let mut host = RecordingHost::answering(&[]);

    page.on_click(&mut host, click_at(1.0, 1.0));
    page.on_click(&mut host, click_at(2.0, 2.0));
    assert_eq!(host.requests.len(), 2);
    assert!(host.requests[0].1.contains("38.76,9.04.json?types=place&access_token=pk.test"));

    let tickets: Vec<Ticket> = host.requests.iter().map(|(t, _)| *t).collect();
    for ticket in tickets {
        page.on_geocode_response(&mut host, ticket, Ok(boundary_body()));
    }

    assert_eq!(host.source_writes, 2);
    assert!(host.sources.contains_key(CITY_BOUNDARY_SOURCE));
    assert_eq!(host.layers.len(), 1);
    assert_eq!(host.layers[0].id, CITY_BOUNDARY_LAYER);
    assert!(page.incidents().is_empty());
    assert!(host.notifications.is_empty());
}

#[test]
fn failed_geocode_leaves_the_map_alone() {
    let config = MapPageConfig {
        access_token: Some(AccessToken::new("pk.test")),
        click: ClickBehavior::ReverseGeocodeOverlay,
        ..MapPageConfig::default()
    };
    let mut page = MapPageController::with_geolocation(config, None);
    let mut host = RecordingHost::answering(&[]);

    page.on_click(&mut host, click_at(1.0, 1.0));
    let ticket = host.requests[0].0;
    page.on_geocode_response(&mut host, ticket, Err(GeocodeError::Status(401)));

    assert!(host.sources.is_empty());
    assert!(host.layers.is_empty());
    assert!(matches!(page.incidents(), [PageIncident::Geocode(GeocodeError::Status(401))]));
}
