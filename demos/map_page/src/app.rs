use makepad_widgets::*;
use makepad_map_page::config::MapPageConfig;
use makepad_map_page::controller::{MapClick, MapPageController};
use makepad_map_page::features::FeatureIndex;
use makepad_map_page::geo::Coordinate;
use makepad_map_page::host::{geocode_body, geocode_request_id, LivePageHost};
use makepad_map_page::map_view::*;
use makepad_map_page::notify::{Severity, ToastQueue};
use makepad_map_page::tiles::TileCache;

const BUNDLED_LABELS: &str = include_str!("../resources/addis_labels.geojson");

live_design! {
    use link::theme::*;
    use link::shaders::*;
    use link::widgets::*;

    use makepad_map_page::map_view::GeoMapView;

    App = {{App}} {
        ui: <Root> {
            main_window = <Window> {
                window: { title: "Map Page" },
                body = <View> {
                    flow: Down,

                    <View> {
                        width: Fill, height: 50.0
                        show_bg: true
                        draw_bg: { color: #2196F3 }
                        align: { x: 0.5, y: 0.5 }

                        <Label> {
                            width: Fit, height: Fit
                            draw_text: {
                                text_style: { font_size: 18.0 }
                                color: #ffffff
                            }
                            text: "Where am I?"
                        }
                    }

                    toast_bar = <View> {
                        width: Fill,
                        height: Fit,
                        padding: { top: 6, bottom: 6, left: 10, right: 10 },
                        show_bg: true
                        draw_bg: { color: #fafafa }

                        toast_label = <Label> {
                            width: Fill,
                            height: Fit,
                            text: ""
                            draw_text: {
                                text_style: { font_size: 12.0 }
                                color: #333333
                            }
                        }
                    }

                    <View> {
                        width: Fill,
                        height: Fill,

                        geo_map = <GeoMapView> {
                            width: Fill,
                            height: Fill,
                        }
                    }
                }
            }
        }
    }
}

app_main!(App);

#[derive(Live, LiveHook)]
pub struct App {
    #[live] ui: WidgetRef,
    #[rust] page: Option<MapPageController>,
    #[rust] toasts: ToastQueue,
    #[rust] toast_timer: Timer,
    #[rust] geolocation_frame: NextFrame,
}

impl LiveRegister for App {
    fn live_register(cx: &mut Cx) {
        makepad_widgets::live_design(cx);
        makepad_map_page::live_design(cx);
    }
}

impl App {
    fn mount_page(&mut self, cx: &mut Cx) {
        let config = MapPageConfig::from_env().unwrap_or_else(|err| {
            tracing::error!(%err, "invalid map page configuration, using defaults");
            MapPageConfig::default()
        });

        let labels = match &config.labels_path {
            Some(path) => FeatureIndex::from_file(path),
            None => FeatureIndex::from_geojson(BUNDLED_LABELS),
        }
        .unwrap_or_else(|err| {
            tracing::warn!(%err, "no label features available");
            FeatureIndex::new()
        });

        let tile_cache = TileCache::from_config(&config).unwrap_or_else(|err| {
            tracing::warn!(%err, "falling back to the tokenless tile source");
            TileCache::default()
        });

        let page = MapPageController::new(config);
        let map = self.ui.geo_map_view(ids!(geo_map));
        if map.borrow().is_none() {
            tracing::warn!("map container is not mounted");
        }
        map.apply_options(cx, &page.map_options());
        map.set_tile_cache(cx, tile_cache);
        map.set_labels(cx, labels);
        self.page = Some(page);
    }

    fn refresh_toasts(&mut self, cx: &mut Cx) {
        let text = self
            .toasts
            .iter()
            .map(|n| match n.severity {
                Severity::Info => format!("\u{2139} {}", n.text),
                Severity::Warning => format!("\u{26A0} {}", n.text),
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.ui.label(ids!(toast_label)).set_text(cx, &text);

        cx.stop_timer(self.toast_timer);
        if !self.toasts.is_empty() {
            self.toast_timer = cx.start_timeout(self.toasts.lifetime().as_secs_f64());
        }
    }
}

impl MatchEvent for App {
    fn handle_startup(&mut self, cx: &mut Cx) {
        self.mount_page(cx);
    }

    fn handle_actions(&mut self, cx: &mut Cx, actions: &Actions) {
        let map = self.ui.geo_map_view(ids!(geo_map));
        let Some(page) = self.page.as_mut() else {
            return;
        };

        let before = self.toasts.revision();
        let mut host = LivePageHost::new(cx, map.clone(), &mut self.toasts);
        for action in map.actions(actions) {
            match action {
                GeoMapViewAction::Loaded => page.on_load(&mut host),
                GeoMapViewAction::PointerMoved { point } => page.on_pointer_move(&mut host, point),
                GeoMapViewAction::Tapped { lng, lat, point } => {
                    if let Ok(coordinate) = Coordinate::new(lng, lat) {
                        page.on_click(&mut host, MapClick { point, coordinate });
                    }
                }
                _ => {}
            }
        }
        let requested_position = page.has_pending_position();
        drop(host);

        if requested_position {
            self.geolocation_frame = cx.new_next_frame();
        }
        if self.toasts.revision() != before {
            self.refresh_toasts(cx);
        }
    }
}

impl AppMain for App {
    fn handle_event(&mut self, cx: &mut Cx, event: &Event) {
        if let Event::Shutdown = event {
            if let Some(page) = self.page.as_mut() {
                page.teardown();
            }
        }

        // Geolocation answers arrive on the frame after the request
        if self.geolocation_frame.is_event(event).is_some() {
            if let Some(page) = self.page.as_mut() {
                let map = self.ui.geo_map_view(ids!(geo_map));
                let mut host = LivePageHost::new(cx, map, &mut self.toasts);
                page.poll_geolocation(&mut host);
            }
            self.refresh_toasts(cx);
        }

        if let Event::NetworkResponses(responses) = event {
            if let Some(page) = self.page.as_mut() {
                let map = self.ui.geo_map_view(ids!(geo_map));
                let pending: Vec<_> = page.pending_geocodes().collect();
                let mut host = LivePageHost::new(cx, map, &mut self.toasts);
                for response in responses {
                    let Some(ticket) = pending
                        .iter()
                        .copied()
                        .find(|t| geocode_request_id(*t) == response.request_id)
                    else {
                        continue;
                    };
                    if let Some(result) = geocode_body(&response.response) {
                        page.on_geocode_response(&mut host, ticket, result);
                    }
                }
            }
        }

        if self.toast_timer.is_event(event).is_some() {
            if self.toasts.expire(std::time::Instant::now()) {
                self.refresh_toasts(cx);
            } else if !self.toasts.is_empty() {
                self.toast_timer = cx.start_timeout(0.5);
            }
        }

        self.match_event(cx, event);
        self.ui.handle_event(cx, event, &mut Scope::empty());
    }
}
