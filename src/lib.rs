pub use makepad_widgets;
pub use makepad_widgets::*;

pub mod config;
pub mod controller;
pub mod disk_cache;
pub mod error;
pub mod features;
pub mod geo;
pub mod geocoding;
pub mod geolocation;
pub mod host;
pub mod map_view;
pub mod markers;
pub mod notify;
pub mod overlay;
pub mod tiles;

pub use config::MapPageConfig;
pub use controller::{MapOptions, MapPageController};
pub use geo::Coordinate;
pub use map_view::*;
pub use tiles::*;

pub fn live_design(cx: &mut Cx) {
    crate::map_view::live_design(cx);
}
