//! Binds the page controller to a live Makepad map widget.

use makepad_widgets::*;

use crate::controller::{CursorStyle, HttpClient, MapSurface};
use crate::error::{GeocodeError, MapError};
use crate::features::RenderedFeature;
use crate::geo::{Coordinate, ScreenPoint};
use crate::geolocation::Ticket;
use crate::map_view::GeoMapViewRef;
use crate::markers::Marker;
use crate::notify::{Notifier, Severity, ToastQueue};
use crate::overlay::{FillLayer, Polygon};

/// Distinguishes geocoding requests from tile requests
const GEOCODE_REQUEST_CHANNEL: u64 = 0x6765_6f63;

pub fn geocode_request_id(ticket: Ticket) -> LiveId {
    LiveId::from_num(GEOCODE_REQUEST_CHANNEL, ticket.0)
}

/// Turns a network response into the body the controller expects, or None
/// for responses that carry no outcome.
pub fn geocode_body(response: &NetworkResponse) -> Option<Result<Vec<u8>, GeocodeError>> {
    match response {
        NetworkResponse::HttpResponse(http) if http.status_code == 200 => {
            Some(http.body.clone().ok_or(GeocodeError::EmptyBody))
        }
        NetworkResponse::HttpResponse(http) => Some(Err(GeocodeError::Status(http.status_code))),
        NetworkResponse::HttpRequestError(error) => Some(Err(GeocodeError::Network(format!("{:?}", error)))),
        _ => None,
    }
}

/// Everything the controller needs for one event: the map widget, the
/// platform context for HTTP and the toast queue.
///
/// A widget reference that does not resolve means the container is not
/// mounted; operations then do nothing.
pub struct LivePageHost<'a> {
    cx: &'a mut Cx,
    map: GeoMapViewRef,
    toasts: &'a mut ToastQueue,
}

impl<'a> LivePageHost<'a> {
    pub fn new(cx: &'a mut Cx, map: GeoMapViewRef, toasts: &'a mut ToastQueue) -> Self {
        Self { cx, map, toasts }
    }

    fn container_missing(&self) {
        tracing::warn!(error = %MapError::ContainerMissing, "map operation skipped");
    }
}

impl MapSurface for LivePageHost<'_> {
    fn add_marker(&mut self, marker: Marker) {
        match self.map.borrow_mut() {
            Some(mut map) => map.add_marker(self.cx, marker),
            None => self.container_missing(),
        }
    }

    fn fly_to(&mut self, center: Coordinate, zoom: f64) {
        match self.map.borrow_mut() {
            Some(mut map) => map.fly_to(self.cx, center, zoom),
            None => self.container_missing(),
        }
    }

    fn project(&self, at: Coordinate) -> Option<ScreenPoint> {
        self.map.borrow().and_then(|map| map.project(at))
    }

    fn query_rendered_features(&self, at: ScreenPoint, layers: &[&str]) -> Vec<RenderedFeature> {
        self.map
            .borrow()
            .map(|map| map.query_rendered_features(at, layers))
            .unwrap_or_default()
    }

    fn set_cursor(&mut self, cursor: CursorStyle) {
        if let Some(mut map) = self.map.borrow_mut() {
            map.set_cursor(self.cx, cursor);
        }
    }

    fn set_geojson_source(&mut self, id: &str, polygon: Polygon) {
        match self.map.borrow_mut() {
            Some(mut map) => map.set_geojson_source(self.cx, id, polygon),
            None => self.container_missing(),
        }
    }

    fn add_fill_layer(&mut self, layer: FillLayer) -> Result<(), MapError> {
        let mut map = self.map.borrow_mut().ok_or(MapError::ContainerMissing)?;
        map.add_fill_layer(self.cx, layer)
    }

    fn has_layer(&self, id: &str) -> bool {
        self.map.borrow().is_some_and(|map| map.has_layer(id))
    }
}

impl HttpClient for LivePageHost<'_> {
    fn get(&mut self, ticket: Ticket, url: &str) {
        let mut request = HttpRequest::new(url.to_string(), HttpMethod::GET);
        request.set_header("User-Agent".to_string(), "MakepadMapPage/0.1".to_string());
        self.cx.http_request(geocode_request_id(ticket), request);
    }
}

impl Notifier for LivePageHost<'_> {
    fn notify(&mut self, severity: Severity, text: String) {
        self.toasts.notify(severity, text);
    }
}
