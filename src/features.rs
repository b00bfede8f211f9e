//! Point labels held by the map widget and the spatial query over them.

use serde::Deserialize;

use crate::error::FeatureError;
use crate::geo::{Coordinate, ScreenPoint, Viewport};

pub const SETTLEMENT_LABEL: &str = "settlement-label";
pub const SETTLEMENT_SUBDIVISION_LABEL: &str = "settlement-subdivision-label";
pub const POI_LABEL: &str = "poi-label";
pub const AIRPORT_LABEL: &str = "airport-label";

/// Layers the page queries for place names
pub const LABEL_LAYERS: [&str; 4] = [
    SETTLEMENT_LABEL,
    SETTLEMENT_SUBDIVISION_LABEL,
    POI_LABEL,
    AIRPORT_LABEL,
];

/// Label font size in pixels, used for drawing and hit boxes
pub const LABEL_FONT_SIZE: f64 = 11.0;

/// Extra pixels around a label's text box that still count as a hit
const HIT_PADDING: f64 = 4.0;

/// Smallest zoom at which a layer's labels are drawn
pub fn default_min_zoom(layer: &str) -> f64 {
    match layer {
        SETTLEMENT_LABEL => 3.0,
        AIRPORT_LABEL => 8.0,
        SETTLEMENT_SUBDIVISION_LABEL => 10.0,
        POI_LABEL => 12.0,
        _ => 0.0,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LabelFeature {
    pub name: Option<String>,
    pub layer: String,
    pub coordinate: Coordinate,
    pub min_zoom: f64,
}

impl LabelFeature {
    pub fn new(name: impl Into<String>, layer: &str, coordinate: Coordinate) -> Self {
        Self {
            name: Some(name.into()),
            layer: layer.to_string(),
            coordinate,
            min_zoom: default_min_zoom(layer),
        }
    }

    pub fn text(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Estimated screen box `(min, max)` of the label anchored at `anchor`.
    /// Text sits centered above the anchor dot.
    pub fn hit_box(&self, anchor: ScreenPoint) -> (ScreenPoint, ScreenPoint) {
        // Approximate character width of 0.5 * font_size for small text
        let text_width = self.text().chars().count() as f64 * LABEL_FONT_SIZE * 0.5;
        let text_height = LABEL_FONT_SIZE * 1.2;
        let half = text_width.max(LABEL_FONT_SIZE) / 2.0;
        (
            ScreenPoint::new(anchor.x - half - HIT_PADDING, anchor.y - text_height - HIT_PADDING),
            ScreenPoint::new(anchor.x + half + HIT_PADDING, anchor.y + HIT_PADDING),
        )
    }
}

/// A feature returned by a rendered-feature query. Only meaningful for the
/// duration of the callback that received it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedFeature {
    pub name: Option<String>,
    pub source_layer: String,
}

impl RenderedFeature {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed place")
    }
}

#[derive(Clone, Debug, Default)]
pub struct FeatureIndex {
    features: Vec<LabelFeature>,
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<GeoJsonFeature>,
}

#[derive(Deserialize)]
struct GeoJsonFeature {
    geometry: Option<GeoJsonGeometry>,
    #[serde(default)]
    properties: LabelProperties,
}

#[derive(Deserialize)]
struct GeoJsonGeometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: serde_json::Value,
}

#[derive(Deserialize, Default)]
struct LabelProperties {
    name: Option<String>,
    layer: Option<String>,
    min_zoom: Option<f64>,
}

impl FeatureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads point labels from a GeoJSON `FeatureCollection`.
    pub fn from_geojson(text: &str) -> Result<Self, FeatureError> {
        let collection: FeatureCollection = serde_json::from_str(text)?;
        let mut index = FeatureIndex::new();

        for (i, feature) in collection.features.into_iter().enumerate() {
            let Some(geometry) = feature.geometry else {
                tracing::debug!(index = i, "skipping label without geometry");
                continue;
            };
            if geometry.kind != "Point" {
                tracing::debug!(index = i, kind = %geometry.kind, "skipping non-point label");
                continue;
            }
            let [lng, lat]: [f64; 2] = serde_json::from_value(geometry.coordinates)?;
            let coordinate = Coordinate::new(lng, lat)
                .map_err(|source| FeatureError::Coordinate { index: i, source })?;

            let layer = feature.properties.layer.unwrap_or_else(|| SETTLEMENT_LABEL.to_string());
            let min_zoom = feature.properties.min_zoom.unwrap_or_else(|| default_min_zoom(&layer));
            index.push(LabelFeature {
                name: feature.properties.name,
                layer,
                coordinate,
                min_zoom,
            });
        }

        tracing::debug!(count = index.len(), "loaded label features");
        Ok(index)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, FeatureError> {
        Self::from_geojson(&std::fs::read_to_string(path)?)
    }

    pub fn push(&mut self, feature: LabelFeature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Labels currently drawn, in draw order (later ones on top).
    pub fn rendered<'a>(
        &'a self,
        viewport: &'a Viewport,
    ) -> impl Iterator<Item = (&'a LabelFeature, ScreenPoint)> + 'a {
        self.features.iter().filter_map(move |f| {
            if viewport.zoom < f.min_zoom {
                return None;
            }
            let anchor = viewport.project(f.coordinate)?;
            viewport.contains(anchor).then_some((f, anchor))
        })
    }

    /// Rendered labels whose box contains `point`, restricted to `layers`,
    /// topmost first.
    pub fn query(&self, viewport: &Viewport, point: ScreenPoint, layers: &[&str]) -> Vec<RenderedFeature> {
        let mut hits: Vec<RenderedFeature> = self
            .rendered(viewport)
            .filter(|(f, _)| layers.contains(&f.layer.as_str()))
            .filter(|(f, anchor)| {
                let (min, max) = f.hit_box(*anchor);
                point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
            })
            .map(|(f, _)| RenderedFeature {
                name: f.name.clone(),
                source_layer: f.layer.clone(),
            })
            .collect();
        hits.reverse();
        hits
    }
}
