use std::collections::HashMap;

use crate::error::MapError;
use crate::geo::{Coordinate, ScreenPoint};
use crate::markers::parse_color;

pub const CITY_BOUNDARY_SOURCE: &str = "city-boundary";
pub const CITY_BOUNDARY_LAYER: &str = "city-boundary-layer";
pub const CITY_BOUNDARY_COLOR: &str = "#088";
pub const CITY_BOUNDARY_OPACITY: f32 = 0.4;

/// Polygon in GeoJSON ring order: the first ring is the outline, the rest
/// are holes.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    pub rings: Vec<Vec<Coordinate>>,
}

impl Polygon {
    pub fn new(rings: Vec<Vec<Coordinate>>) -> Self {
        Self { rings }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FillLayer {
    pub id: String,
    pub source: String,
    pub color: [f32; 4],
    pub opacity: f32,
}

impl FillLayer {
    /// The overlay drawn for a reverse-geocoded city.
    pub fn city_boundary() -> Self {
        Self {
            id: CITY_BOUNDARY_LAYER.to_string(),
            source: CITY_BOUNDARY_SOURCE.to_string(),
            color: parse_color(CITY_BOUNDARY_COLOR).unwrap_or([0.0, 0.533, 0.533, 1.0]),
            opacity: CITY_BOUNDARY_OPACITY,
        }
    }
}

/// GeoJSON sources and the fill layers drawn from them.
#[derive(Clone, Debug, Default)]
pub struct OverlayStore {
    sources: HashMap<String, Polygon>,
    layers: Vec<FillLayer>,
}

impl OverlayStore {
    /// Adds a source, replacing the data of an existing one with that id.
    pub fn set_source(&mut self, id: &str, polygon: Polygon) {
        self.sources.insert(id.to_string(), polygon);
    }

    pub fn add_layer(&mut self, layer: FillLayer) -> Result<(), MapError> {
        if self.has_layer(&layer.id) {
            return Err(MapError::DuplicateLayer(layer.id));
        }
        if !self.sources.contains_key(&layer.source) {
            return Err(MapError::MissingSource(layer.source));
        }
        self.layers.push(layer);
        Ok(())
    }

    pub fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|l| l.id == id)
    }

    /// Layers in draw order with their source polygon.
    pub fn fills(&self) -> impl Iterator<Item = (&FillLayer, &Polygon)> {
        self.layers
            .iter()
            .filter_map(|layer| self.sources.get(&layer.source).map(|p| (layer, p)))
    }
}

/// Horizontal spans `(x_start, x_end)` covered by the rings at row `y`,
/// using the even-odd rule.
pub fn fill_spans(rings: &[Vec<ScreenPoint>], y: f64) -> Vec<(f64, f64)> {
    let mut crossings = Vec::new();
    for ring in rings {
        let n = ring.len();
        if n < 3 {
            continue;
        }
        for i in 0..n {
            let a = ring[i];
            let b = ring[(i + 1) % n];
            // Half-open rule so shared vertices count once
            if (a.y <= y && b.y > y) || (b.y <= y && a.y > y) {
                let t = (y - a.y) / (b.y - a.y);
                crossings.push(a.x + t * (b.x - a.x));
            }
        }
    }

    crossings.sort_by(|a, b| a.total_cmp(b));
    crossings
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .filter(|(x0, x1)| x1 > x0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Vec<ScreenPoint> {
        vec![
            ScreenPoint::new(x0, y0),
            ScreenPoint::new(x0 + size, y0),
            ScreenPoint::new(x0 + size, y0 + size),
            ScreenPoint::new(x0, y0 + size),
        ]
    }

    #[test]
    fn spans_cover_a_square() {
        let spans = fill_spans(&[square(10.0, 10.0, 20.0)], 15.0);
        assert_eq!(spans, vec![(10.0, 30.0)]);
        assert!(fill_spans(&[square(10.0, 10.0, 20.0)], 40.0).is_empty());
    }

    #[test]
    fn holes_are_left_unfilled() {
        let rings = vec![square(0.0, 0.0, 30.0), square(10.0, 10.0, 10.0)];
        assert_eq!(fill_spans(&rings, 15.0), vec![(0.0, 10.0), (20.0, 30.0)]);
    }

    #[test]
    fn layers_need_a_source_and_a_unique_id() {
        let mut store = OverlayStore::default();
        assert_eq!(
            store.add_layer(FillLayer::city_boundary()),
            Err(MapError::MissingSource(CITY_BOUNDARY_SOURCE.to_string()))
        );

        let c = Coordinate::new(38.7, 9.0).unwrap();
        store.set_source(CITY_BOUNDARY_SOURCE, Polygon::new(vec![vec![c, c, c]]));
        assert!(store.add_layer(FillLayer::city_boundary()).is_ok());
        assert_eq!(
            store.add_layer(FillLayer::city_boundary()),
            Err(MapError::DuplicateLayer(CITY_BOUNDARY_LAYER.to_string()))
        );
        assert_eq!(store.fills().count(), 1);
    }
}
