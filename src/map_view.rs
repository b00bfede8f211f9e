use makepad_widgets::*;

use crate::controller::{CursorStyle, MapOptions};
use crate::error::MapError;
use crate::features::{FeatureIndex, RenderedFeature, LABEL_FONT_SIZE};
use crate::geo::{Coordinate, FlyTo, Projection, ScreenPoint, Viewport, TILE_SIZE};
use crate::markers::Marker;
use crate::overlay::{fill_spans, FillLayer, OverlayStore, Polygon};
use crate::tiles::{TileCache, TileCoord};

live_design! {
    link widgets;
    use link::shaders::*;
    use link::widgets::*;
    use link::theme::*;

    // Shader for rendering map tiles with UV offset/scale for parent tile fallback
    DrawMapTile = {{DrawMapTile}} {
        texture tile_texture: texture2d
        has_texture: 0.0
        uv_offset: vec2(0.0, 0.0)
        uv_scale: vec2(1.0, 1.0)

        fn pixel(self) -> vec4 {
            if self.has_texture > 0.5 {
                let uv = self.uv_offset + self.pos * self.uv_scale;
                return sample2d(self.tile_texture, uv)
            }
            // Loading placeholder
            return vec4(0.95, 0.95, 0.95, 1.0)
        }
    }

    // Teardrop pin with a white center, tip at the bottom of the rect
    DrawMapMarker = {{DrawMapMarker}} {
        fn pixel(self) -> vec4 {
            let sdf = Sdf2d::viewport(self.pos * self.rect_size);
            let r = self.rect_size.x * 0.5;
            sdf.circle(r, r, r - 1.0);
            sdf.fill(self.color);
            sdf.move_to(r * 0.3, r * 1.5);
            sdf.line_to(r * 1.7, r * 1.5);
            sdf.line_to(r, self.rect_size.y);
            sdf.close_path();
            sdf.fill(self.color);
            sdf.circle(r, r, r * 0.35);
            sdf.fill(#ffffff);
            return sdf.result
        }
    }

    pub GeoMapViewBase = {{GeoMapView}} {
        draw_scale_bg: {
            color: #333333
        }
        draw_scale_text: {
            color: #333333
            text_style: <THEME_FONT_REGULAR> {
                font_size: 10.0
            }
        }
        draw_attribution_bg: {
            color: #ffffffcc
        }
        draw_attribution_text: {
            color: #666666
            text_style: <THEME_FONT_REGULAR> {
                font_size: 9.0
            }
        }
        draw_label_dot: {
            color: #555555
        }
        draw_label_text: {
            color: #222222
            text_style: <THEME_FONT_BOLD> {
                font_size: 11.0
            }
        }
    }

    pub GeoMapView = <GeoMapViewBase> {
        width: Fill,
        height: Fill,
    }
}

#[derive(Live, LiveRegister, LiveHook)]
#[repr(C)]
pub struct DrawMapTile {
    #[deref] pub draw_super: DrawQuad,
    #[live] pub has_texture: f32,
    #[live] pub uv_offset: Vec2,
    #[live] pub uv_scale: Vec2,
}

#[derive(Live, LiveRegister, LiveHook)]
#[repr(C)]
pub struct DrawMapMarker {
    #[deref] pub draw_super: DrawQuad,
    #[live] pub color: Vec4,
}

#[derive(Clone, Debug, DefaultNone)]
pub enum GeoMapViewAction {
    None,
    /// First frame with a non-empty viewport; emitted once per widget
    Loaded,
    /// Pointer hovering at a widget-local position
    PointerMoved {
        point: ScreenPoint,
    },
    /// Press and release without dragging the map
    Tapped {
        lng: f64,
        lat: f64,
        point: ScreenPoint,
    },
}

/// Scale bar step values in meters (from 10m to 1000km)
const SCALE_STEPS: &[f64] = &[
    10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0,
    10000.0, 20000.0, 50000.0, 100000.0, 200000.0, 500000.0, 1000000.0,
];

/// A press that travels further than this many pixels is a drag, not a tap
const TAP_SLOP: f64 = 4.0;

/// Height of one scanline row when filling overlays
const FILL_ROW: f64 = 2.0;

/// Globe tiles are fetched this many levels below the view zoom
const GLOBE_TILE_ZOOM_RANGE: (u8, u8) = (2, 4);

#[derive(Live, LiveHook, Widget)]
pub struct GeoMapView {
    #[walk] walk: Walk,
    #[redraw] #[live] pub draw_tile: DrawMapTile,

    // Scale bar drawing
    #[live] draw_scale_bg: DrawColor,
    #[live] draw_scale_text: DrawText,
    #[live(true)] pub show_scale_bar: bool,

    // Attribution overlay
    #[live] draw_attribution_bg: DrawColor,
    #[live] draw_attribution_text: DrawText,
    #[live(true)] pub show_attribution: bool,

    // Annotations
    #[live] draw_marker: DrawMapMarker,
    #[live] draw_label_dot: DrawColor,
    #[live] draw_label_text: DrawText,
    #[live] draw_fill: DrawColor,

    // Map state (in geo coordinates)
    #[live(38.76123)] pub center_lng: f64,
    #[live(9.01068)] pub center_lat: f64,
    #[live(10.0)] pub zoom: f64,
    #[rust] pub projection: Projection,

    // Zoom constraints
    #[live(0.0)] pub min_zoom: f64,
    #[live(19.0)] pub max_zoom: f64,

    // Internal state
    #[rust] drag_start: Option<DVec2>,
    #[rust] drag_start_center: Option<(f64, f64)>,
    #[rust] dragged: bool,
    #[rust] last_abs: DVec2,
    #[rust] viewport_origin: DVec2,
    #[rust] viewport_size: DVec2,
    #[rust] loaded: bool,
    #[rust] cursor: CursorStyle,

    // Pinch zoom state
    #[rust] initial_pinch_distance: Option<f64>,
    #[rust] pinch_zoom_start: Option<f64>,

    // Momentum scrolling state
    #[rust] velocity_samples: Vec<(DVec2, f64)>,  // (position, time in seconds)
    #[rust] flick_velocity: DVec2,
    #[rust] next_frame: NextFrame,
    #[rust] is_flicking: bool,
    #[rust] fly_to: Option<FlyTo>,

    // Momentum tunable parameters
    #[live(0.95)] pub momentum_decay: f64,
    #[live(0.5)] pub momentum_threshold: f64,

    // Content
    #[rust] tile_cache: TileCache,
    #[rust] markers: Vec<Marker>,
    #[rust] labels: FeatureIndex,
    #[rust] overlays: OverlayStore,
}

impl Widget for GeoMapView {
    fn handle_event(&mut self, cx: &mut Cx, event: &Event, scope: &mut Scope) {
        let uid = self.widget_uid();

        // Handle HTTP responses for tile loading
        if let Event::NetworkResponses(responses) = event {
            for response in responses {
                match &response.response {
                    NetworkResponse::HttpResponse(http_response) => {
                        if self.tile_cache.handle_response(cx, response.request_id, http_response) {
                            self.draw_tile.redraw(cx);
                        }
                    }
                    NetworkResponse::HttpRequestError(error) => {
                        self.tile_cache.handle_error(response.request_id, error);
                    }
                    _ => {}
                }
            }
        }

        if let Some(ne) = self.next_frame.is_event(event) {
            if !self.loaded && self.viewport_size.x > 0.0 && self.viewport_size.y > 0.0 {
                self.loaded = true;
                cx.widget_action(uid, &scope.path, GeoMapViewAction::Loaded);
            }
            if self.fly_to.is_some() {
                self.advance_fly_to(cx, ne.time);
            } else if self.is_flicking {
                self.apply_momentum(cx);
            }
        }

        // Handle touch events for pinch zoom
        if let Event::TouchUpdate(te) = event {
            if te.touches.len() >= 2 {
                let t0 = &te.touches[0];
                let t1 = &te.touches[1];
                let dx = t1.abs.x - t0.abs.x;
                let dy = t1.abs.y - t0.abs.y;
                let distance = (dx * dx + dy * dy).sqrt();

                if let (Some(initial_distance), Some(start_zoom)) = (self.initial_pinch_distance, self.pinch_zoom_start) {
                    // Log scale for a natural zoom feel
                    let scale = distance / initial_distance;
                    let zoom_delta = scale.ln() / std::f64::consts::LN_2;
                    let new_zoom = (start_zoom + zoom_delta).clamp(self.min_zoom, self.max_zoom);

                    if (new_zoom - self.zoom).abs() > 0.01 {
                        self.zoom = new_zoom;
                        self.draw_tile.redraw(cx);
                    }
                } else {
                    self.initial_pinch_distance = Some(distance);
                    self.pinch_zoom_start = Some(self.zoom);
                    self.fly_to = None;
                }

                self.drag_start = None;
                self.drag_start_center = None;
            }
        }

        match event.hits(cx, self.draw_tile.area()) {
            Hit::FingerHoverIn(fh) | Hit::FingerHoverOver(fh) => {
                cx.set_cursor(mouse_cursor(self.cursor));
                let point = self.local_point(fh.abs);
                cx.widget_action(uid, &scope.path, GeoMapViewAction::PointerMoved { point });
            }
            Hit::FingerHoverOut(_) => {
                cx.set_cursor(MouseCursor::Default);
            }
            Hit::FingerDown(fe) if fe.is_primary_hit() => {
                cx.set_key_focus(self.draw_tile.area());
                self.drag_start = Some(fe.abs);
                self.drag_start_center = Some((self.center_lng, self.center_lat));
                self.dragged = false;
                self.last_abs = fe.abs;

                // Grabbing the map stops any animation
                self.is_flicking = false;
                self.fly_to = None;
                self.velocity_samples.clear();
                self.velocity_samples.push((fe.abs, fe.time));
            }
            Hit::FingerMove(fe) => {
                if self.initial_pinch_distance.is_none() {
                    if let (Some(start), Some((start_lng, start_lat))) = (self.drag_start, self.drag_start_center) {
                        let delta = fe.abs - start;
                        self.dragged |= beyond_tap_slop(start, fe.abs);
                        let (dlng, dlat) = self.pixels_to_degrees(delta);
                        self.center_lng = start_lng - dlng;
                        self.center_lat = start_lat + dlat;
                        self.normalize_center();

                        self.last_abs = fe.abs;
                        self.draw_tile.redraw(cx);

                        // Keep the last 4 velocity samples
                        self.velocity_samples.push((fe.abs, fe.time));
                        if self.velocity_samples.len() > 4 {
                            self.velocity_samples.remove(0);
                        }
                    }
                }
            }
            Hit::FingerUp(fe) if fe.is_primary_hit() => {
                self.initial_pinch_distance = None;
                self.pinch_zoom_start = None;

                let tapped = self
                    .drag_start
                    .is_some_and(|start| !self.dragged && !beyond_tap_slop(start, fe.abs));
                if fe.is_over && fe.tap_count == 1 && tapped {
                    let point = self.local_point(fe.abs);
                    if let Some(at) = self.viewport().unproject(point) {
                        cx.widget_action(uid, &scope.path, GeoMapViewAction::Tapped {
                            lng: at.lng(),
                            lat: at.lat(),
                            point,
                        });
                    }
                } else if fe.is_over && fe.tap_count == 2 {
                    self.zoom = (self.zoom + 1.0).min(self.max_zoom);
                    self.draw_tile.redraw(cx);
                }

                let velocity = self.calculate_flick_velocity();
                let speed = (velocity.x * velocity.x + velocity.y * velocity.y).sqrt();
                if speed > self.momentum_threshold && self.initial_pinch_distance.is_none() {
                    self.flick_velocity = velocity;
                    self.is_flicking = true;
                    self.next_frame = cx.new_next_frame();
                }

                self.drag_start = None;
                self.drag_start_center = None;
                self.dragged = false;
                self.velocity_samples.clear();
            }
            Hit::FingerScroll(fe) => {
                let zoom_delta = if fe.scroll.y > 0.0 { 0.5 } else { -0.5 };
                let new_zoom = (self.zoom + zoom_delta).clamp(self.min_zoom, self.max_zoom);

                if new_zoom != self.zoom {
                    self.fly_to = None;
                    self.zoom = new_zoom;
                    self.draw_tile.redraw(cx);
                }
            }
            _ => {}
        }
    }

    fn draw_walk(&mut self, cx: &mut Cx2d, _scope: &mut Scope, walk: Walk) -> DrawStep {
        cx.begin_turtle(walk, Layout::default());
        let rect = cx.turtle().rect();
        self.viewport_origin = rect.pos;
        self.viewport_size = rect.size;

        // The load event goes out on the first frame that has a surface
        if !self.loaded && rect.size.x > 0.0 && rect.size.y > 0.0 {
            self.next_frame = cx.new_next_frame();
        }

        let vp = self.viewport();
        if vp.renders_globe() {
            self.draw_globe_tiles(cx, rect, &vp);
        } else {
            self.draw_mercator_tiles(cx, rect);
        }

        self.draw_fills(cx, rect, &vp);
        self.draw_labels(cx, rect, &vp);
        self.draw_markers(cx, rect, &vp);

        if self.show_scale_bar {
            let (bar_width, label) = self.calculate_scale_bar(&vp, 100.0);
            let margin = 10.0;
            let bar_height = 4.0;
            let bar_y = rect.pos.y + rect.size.y - margin - bar_height;
            let bar_x = rect.pos.x + margin;

            self.draw_scale_bg.draw_abs(cx, Rect {
                pos: dvec2(bar_x, bar_y),
                size: dvec2(bar_width, bar_height),
            });
            self.draw_scale_text.draw_abs(cx, dvec2(bar_x, bar_y - 14.0), &label);
        }

        if self.show_attribution {
            let attribution = self.tile_cache.source().attribution.clone();
            let margin = 10.0;
            let padding = 4.0;

            // Approximate character width of 0.5 * font_size for small text
            let font_size = self.draw_attribution_text.text_style.font_size as f64;
            let text_width = attribution.chars().count() as f64 * font_size * 0.5;
            let text_height = font_size * 1.2;

            let bg_width = text_width + padding * 2.0;
            let bg_height = text_height + padding * 2.0;
            let bg_x = rect.pos.x + rect.size.x - margin - bg_width;
            let bg_y = rect.pos.y + rect.size.y - margin - bg_height;

            self.draw_attribution_bg.draw_abs(cx, Rect {
                pos: dvec2(bg_x, bg_y),
                size: dvec2(bg_width, bg_height),
            });
            self.draw_attribution_text.draw_abs(cx, dvec2(bg_x + padding, bg_y + padding), &attribution);
        }

        cx.end_turtle_with_area(&mut self.draw_tile.draw_super.draw_vars.area);

        DrawStep::done()
    }
}

/// Whether a press that started at `start` has moved far enough to be a drag
fn beyond_tap_slop(start: DVec2, at: DVec2) -> bool {
    let d = at - start;
    d.x * d.x + d.y * d.y > TAP_SLOP * TAP_SLOP
}

fn mouse_cursor(style: CursorStyle) -> MouseCursor {
    match style {
        CursorStyle::Default => MouseCursor::Default,
        CursorStyle::Pointer => MouseCursor::Hand,
    }
}

/// North-west corner of a tile
fn tile_corner(x: u32, y: u32, z: u8) -> Coordinate {
    let n = 2.0_f64.powi(z as i32);
    let lng = x as f64 / n * 360.0 - 180.0;
    let lat = (std::f64::consts::PI * (1.0 - 2.0 * y as f64 / n)).sinh().atan().to_degrees();
    Coordinate::normalized(lng, lat)
}

impl GeoMapView {
    pub fn viewport(&self) -> Viewport {
        Viewport {
            center: Coordinate::normalized(self.center_lng, self.center_lat),
            zoom: self.zoom,
            width: self.viewport_size.x,
            height: self.viewport_size.y,
            projection: self.projection,
        }
    }

    fn local_point(&self, abs: DVec2) -> ScreenPoint {
        ScreenPoint::new(abs.x - self.viewport_origin.x, abs.y - self.viewport_origin.y)
    }

    /// Geo delta covered by a pixel delta at the current center
    fn pixels_to_degrees(&self, delta: DVec2) -> (f64, f64) {
        let world_size = TILE_SIZE * 2.0_f64.powf(self.zoom);
        let degrees_per_pixel_x = 360.0 / world_size;
        let degrees_per_pixel_y = degrees_per_pixel_x * self.center_lat.to_radians().cos();
        (delta.x * degrees_per_pixel_x, delta.y * degrees_per_pixel_y)
    }

    fn normalize_center(&mut self) {
        let center = Coordinate::normalized(self.center_lng, self.center_lat.clamp(-85.0, 85.0));
        self.center_lng = center.lng();
        self.center_lat = center.lat();
    }

    fn set_tile_texture(&mut self, coord: &TileCoord) {
        if let Some(texture) = self.tile_cache.get_tile(coord) {
            self.draw_tile.draw_vars.set_texture(0, texture);
            self.draw_tile.has_texture = 1.0;
            self.draw_tile.uv_offset = vec2(0.0, 0.0);
            self.draw_tile.uv_scale = vec2(1.0, 1.0);
        } else if let Some((texture, uv_offset, uv_scale)) = self.tile_cache.parent_fallback(coord) {
            self.draw_tile.draw_vars.set_texture(0, texture);
            self.draw_tile.has_texture = 1.0;
            self.draw_tile.uv_offset = uv_offset;
            self.draw_tile.uv_scale = uv_scale;
        } else {
            self.draw_tile.has_texture = 0.0;
            self.draw_tile.uv_offset = vec2(0.0, 0.0);
            self.draw_tile.uv_scale = vec2(1.0, 1.0);
        }
    }

    fn draw_mercator_tiles(&mut self, cx: &mut Cx2d, rect: Rect) {
        // Integer zoom for tiles, fractional part scales them
        let tile_zoom = self.zoom.floor().clamp(0.0, 19.0) as u8;
        let zoom_scale = 2.0_f64.powf(self.zoom - tile_zoom as f64);

        let world_size = TILE_SIZE * 2.0_f64.powf(tile_zoom as f64);
        let center_world_x = (self.center_lng + 180.0) / 360.0 * world_size;
        let lat_rad = self.center_lat.to_radians();
        let center_world_y = (1.0 - lat_rad.tan().asinh() / std::f64::consts::PI) / 2.0 * world_size;

        let scaled_tile_size = TILE_SIZE * zoom_scale;
        let tiles_x = (self.viewport_size.x / scaled_tile_size / 2.0).ceil() as i32 + 1;
        let tiles_y = (self.viewport_size.y / scaled_tile_size / 2.0).ceil() as i32 + 1;

        let center_tile_x = (center_world_x / TILE_SIZE).floor() as i32;
        let center_tile_y = (center_world_y / TILE_SIZE).floor() as i32;
        let max_tile = 2_i32.pow(tile_zoom as u32);

        // Offset of the center tile from the viewport center
        let offset_x = (center_world_x - center_tile_x as f64 * TILE_SIZE) * zoom_scale;
        let offset_y = (center_world_y - center_tile_y as f64 * TILE_SIZE) * zoom_scale;

        for dy in -tiles_y..=tiles_y {
            for dx in -tiles_x..=tiles_x {
                let tile_x = (center_tile_x + dx).rem_euclid(max_tile);
                let tile_y = center_tile_y + dy;
                if tile_y < 0 || tile_y >= max_tile {
                    continue;
                }

                let coord = TileCoord { x: tile_x as u32, y: tile_y as u32, z: tile_zoom };
                self.tile_cache.request_tile(cx.cx.cx, coord);
                self.set_tile_texture(&coord);

                let tile_rect = Rect {
                    pos: dvec2(
                        rect.pos.x + self.viewport_size.x / 2.0 + dx as f64 * scaled_tile_size - offset_x,
                        rect.pos.y + self.viewport_size.y / 2.0 + dy as f64 * scaled_tile_size - offset_y,
                    ),
                    size: dvec2(scaled_tile_size, scaled_tile_size),
                };
                self.draw_tile.draw_abs(cx, tile_rect);
            }
        }
    }

    /// Draws each visible tile into the screen box of its projected corners.
    /// Only used at low zoom, where tiles are small on the globe.
    fn draw_globe_tiles(&mut self, cx: &mut Cx2d, rect: Rect, vp: &Viewport) {
        let (lo, hi) = GLOBE_TILE_ZOOM_RANGE;
        let tile_zoom = ((vp.zoom.floor().max(0.0) as u8) + 1).clamp(lo, hi);
        let n = 1u32 << tile_zoom;

        for y in 0..n {
            for x in 0..n {
                let corners = [
                    tile_corner(x, y, tile_zoom),
                    tile_corner(x + 1, y, tile_zoom),
                    tile_corner(x, y + 1, tile_zoom),
                    tile_corner(x + 1, y + 1, tile_zoom),
                ];
                let Some(points) = corners
                    .iter()
                    .map(|c| vp.project(*c))
                    .collect::<Option<Vec<_>>>()
                else {
                    continue;
                };

                let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
                let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
                let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
                let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
                if max_x < 0.0 || max_y < 0.0 || min_x > vp.width || min_y > vp.height {
                    continue;
                }

                let coord = TileCoord { x, y, z: tile_zoom };
                self.tile_cache.request_tile(cx.cx.cx, coord);
                self.set_tile_texture(&coord);
                self.draw_tile.draw_abs(cx, Rect {
                    pos: dvec2(rect.pos.x + min_x, rect.pos.y + min_y),
                    size: dvec2(max_x - min_x, max_y - min_y),
                });
            }
        }
    }

    fn draw_fills(&mut self, cx: &mut Cx2d, rect: Rect, vp: &Viewport) {
        for (layer, polygon) in self.overlays.fills() {
            let Some(rings) = polygon
                .rings
                .iter()
                .map(|ring| ring.iter().map(|c| vp.project(*c)).collect::<Option<Vec<_>>>())
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };

            let ys = rings.iter().flatten().map(|p| p.y);
            let min_y = ys.clone().fold(f64::INFINITY, f64::min).max(0.0);
            let max_y = ys.fold(f64::NEG_INFINITY, f64::max).min(vp.height);

            let [r, g, b, _] = layer.color;
            self.draw_fill.color = vec4(r, g, b, layer.opacity);

            let mut y = min_y;
            while y < max_y {
                for (x0, x1) in fill_spans(&rings, y + FILL_ROW / 2.0) {
                    let (x0, x1) = (x0.max(0.0), x1.min(vp.width));
                    if x1 > x0 {
                        self.draw_fill.draw_abs(cx, Rect {
                            pos: dvec2(rect.pos.x + x0, rect.pos.y + y),
                            size: dvec2(x1 - x0, FILL_ROW),
                        });
                    }
                }
                y += FILL_ROW;
            }
        }
    }

    fn draw_labels(&mut self, cx: &mut Cx2d, rect: Rect, vp: &Viewport) {
        for (label, anchor) in self.labels.rendered(vp) {
            self.draw_label_dot.draw_abs(cx, Rect {
                pos: dvec2(rect.pos.x + anchor.x - 2.0, rect.pos.y + anchor.y - 2.0),
                size: dvec2(4.0, 4.0),
            });

            let text = label.text();
            if text.is_empty() {
                continue;
            }
            let text_width = text.chars().count() as f64 * LABEL_FONT_SIZE * 0.5;
            self.draw_label_text.draw_abs(
                cx,
                dvec2(
                    rect.pos.x + anchor.x - text_width / 2.0,
                    rect.pos.y + anchor.y - LABEL_FONT_SIZE * 1.2 - 2.0,
                ),
                text,
            );
        }
    }

    fn draw_markers(&mut self, cx: &mut Cx2d, rect: Rect, vp: &Viewport) {
        for marker in &self.markers {
            let Some(anchor) = vp.project(marker.coordinate) else {
                continue;
            };
            let (x, y, w, h) = marker.rect_at(anchor);
            let [r, g, b, a] = marker.color.rgba();
            self.draw_marker.color = vec4(r, g, b, a);
            self.draw_marker.draw_abs(cx, Rect {
                pos: dvec2(rect.pos.x + x, rect.pos.y + y),
                size: dvec2(w, h),
            });
        }
    }

    /// Calculate the scale bar width and label for a given maximum width
    fn calculate_scale_bar(&self, vp: &Viewport, max_width: f64) -> (f64, String) {
        let mpp = vp.meters_per_pixel();
        let max_meters = max_width * mpp;

        let selected_meters = SCALE_STEPS
            .iter()
            .copied()
            .take_while(|step| *step <= max_meters)
            .last()
            .unwrap_or(SCALE_STEPS[0]);

        let bar_width = selected_meters / mpp;
        let label = if selected_meters >= 1000.0 {
            format!("{} km", (selected_meters / 1000.0) as i32)
        } else {
            format!("{} m", selected_meters as i32)
        };

        (bar_width, label)
    }

    /// Calculate flick velocity from position/time samples
    fn calculate_flick_velocity(&self) -> DVec2 {
        let mut total = dvec2(0.0, 0.0);
        let mut count = 0;

        for pair in self.velocity_samples.windows(2) {
            let (pos_prev, time_prev) = pair[0];
            let (pos_curr, time_curr) = pair[1];
            let dt = time_curr - time_prev;
            if dt > 0.0001 {
                total.x += (pos_curr.x - pos_prev.x) / dt;
                total.y += (pos_curr.y - pos_prev.y) / dt;
                count += 1;
            }
        }

        if count == 0 {
            return dvec2(0.0, 0.0);
        }
        // Pixels per second to pixels per frame at ~60fps
        let scale = 0.016;
        dvec2(total.x / count as f64 * scale, total.y / count as f64 * scale)
    }

    /// Apply momentum decay and update map position
    fn apply_momentum(&mut self, cx: &mut Cx) {
        self.flick_velocity.x *= self.momentum_decay;
        self.flick_velocity.y *= self.momentum_decay;

        let speed = (self.flick_velocity.x * self.flick_velocity.x
            + self.flick_velocity.y * self.flick_velocity.y)
            .sqrt();
        if speed < self.momentum_threshold * 0.01 {
            self.is_flicking = false;
            return;
        }

        // Dragging right moves the map left
        let (dlng, dlat) = self.pixels_to_degrees(self.flick_velocity);
        self.center_lng -= dlng;
        self.center_lat += dlat;
        self.normalize_center();

        self.draw_tile.redraw(cx);
        self.next_frame = cx.new_next_frame();
    }

    fn advance_fly_to(&mut self, cx: &mut Cx, time: f64) {
        let Some(fly) = self.fly_to.as_mut() else {
            return;
        };
        let (center, zoom, done) = fly.step(time);
        self.center_lng = center.lng();
        self.center_lat = center.lat();
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        self.normalize_center();
        self.draw_tile.redraw(cx);

        if done {
            self.fly_to = None;
        } else {
            self.next_frame = cx.new_next_frame();
        }
    }

    /// Applies the construction options of a page.
    pub fn apply_options(&mut self, cx: &mut Cx, options: &MapOptions) {
        self.center_lng = options.center.lng();
        self.center_lat = options.center.lat();
        self.zoom = options.zoom.clamp(self.min_zoom, self.max_zoom);
        self.projection = options.projection;
        self.normalize_center();
        self.draw_tile.redraw(cx);
    }

    pub fn set_tile_cache(&mut self, cx: &mut Cx, tile_cache: TileCache) {
        self.tile_cache = tile_cache;
        self.draw_tile.redraw(cx);
    }

    /// Animates to `center` at `zoom`
    pub fn fly_to(&mut self, cx: &mut Cx, center: Coordinate, zoom: f64) {
        let from = Coordinate::normalized(self.center_lng, self.center_lat);
        let to_zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        self.is_flicking = false;
        self.fly_to = Some(FlyTo::new(from, self.zoom, center, to_zoom));
        self.next_frame = cx.new_next_frame();
    }

    pub fn add_marker(&mut self, cx: &mut Cx, marker: Marker) {
        self.markers.push(marker);
        self.draw_tile.redraw(cx);
    }

    pub fn set_labels(&mut self, cx: &mut Cx, labels: FeatureIndex) {
        self.labels = labels;
        self.draw_tile.redraw(cx);
    }

    pub fn project(&self, at: Coordinate) -> Option<ScreenPoint> {
        self.viewport().project(at)
    }

    pub fn query_rendered_features(&self, at: ScreenPoint, layers: &[&str]) -> Vec<RenderedFeature> {
        self.labels.query(&self.viewport(), at, layers)
    }

    pub fn set_cursor(&mut self, cx: &mut Cx, cursor: CursorStyle) {
        self.cursor = cursor;
        cx.set_cursor(mouse_cursor(cursor));
    }

    pub fn set_geojson_source(&mut self, cx: &mut Cx, id: &str, polygon: Polygon) {
        self.overlays.set_source(id, polygon);
        self.draw_tile.redraw(cx);
    }

    pub fn add_fill_layer(&mut self, cx: &mut Cx, layer: FillLayer) -> Result<(), MapError> {
        self.overlays.add_layer(layer)?;
        self.draw_tile.redraw(cx);
        Ok(())
    }

    pub fn has_layer(&self, id: &str) -> bool {
        self.overlays.has_layer(id)
    }
}

impl GeoMapViewRef {
    pub fn apply_options(&self, cx: &mut Cx, options: &MapOptions) {
        if let Some(mut inner) = self.borrow_mut() {
            inner.apply_options(cx, options);
        }
    }

    pub fn set_tile_cache(&self, cx: &mut Cx, tile_cache: TileCache) {
        if let Some(mut inner) = self.borrow_mut() {
            inner.set_tile_cache(cx, tile_cache);
        }
    }

    pub fn set_labels(&self, cx: &mut Cx, labels: FeatureIndex) {
        if let Some(mut inner) = self.borrow_mut() {
            inner.set_labels(cx, labels);
        }
    }

    /// All actions this map emitted, in order
    pub fn actions(&self, actions: &Actions) -> Vec<GeoMapViewAction> {
        actions
            .filter_widget_actions(self.widget_uid())
            .map(|action| action.cast::<GeoMapViewAction>())
            .filter(|action| !matches!(action, GeoMapViewAction::None))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_still_press_is_a_tap() {
        let start = dvec2(100.0, 100.0);
        assert!(!beyond_tap_slop(start, start));
        assert!(!beyond_tap_slop(start, dvec2(102.0, 97.5)));
    }

    #[test]
    fn a_pan_is_not_a_tap() {
        let start = dvec2(100.0, 100.0);
        assert!(beyond_tap_slop(start, dvec2(300.0, 100.0)));
        assert!(beyond_tap_slop(start, dvec2(100.0, 95.0)));
    }
}
