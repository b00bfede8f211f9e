use crate::error::SettingError;
use crate::geo::{Coordinate, ScreenPoint};

/// Scale used for every marker the page places
pub const PAGE_MARKER_SCALE: f64 = 0.7;

/// Unscaled pin size in pixels
pub const MARKER_WIDTH: f64 = 27.0;
pub const MARKER_HEIGHT: f64 = 41.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerColor {
    Blue,
    Green,
    Red,
}

impl MarkerColor {
    pub fn rgba(&self) -> [f32; 4] {
        match self {
            MarkerColor::Blue => [0.0, 0.0, 1.0, 1.0],
            MarkerColor::Green => [0.0, 0.5, 0.0, 1.0],
            MarkerColor::Red => [1.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Parses a `#rgb` or `#rrggbb` color.
pub fn parse_color(s: &str) -> Result<[f32; 4], SettingError> {
    let invalid = || SettingError::Color(s.to_string());
    let digits: Vec<u8> = s
        .trim()
        .strip_prefix('#')
        .ok_or_else(invalid)?
        .chars()
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect::<Option<_>>()
        .ok_or_else(invalid)?;

    let channels: [u8; 3] = match digits.as_slice() {
        [r, g, b] => [r * 17, g * 17, b * 17],
        [r1, r0, g1, g0, b1, b0] => [r1 * 16 + r0, g1 * 16 + g0, b1 * 16 + b0],
        _ => return Err(invalid()),
    };
    Ok([
        channels[0] as f32 / 255.0,
        channels[1] as f32 / 255.0,
        channels[2] as f32 / 255.0,
        1.0,
    ])
}

/// A pin on the map. Once handed to the widget it stays there until the
/// widget goes away.
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub coordinate: Coordinate,
    pub color: MarkerColor,
    pub scale: f64,
}

impl Marker {
    pub fn new(coordinate: Coordinate, color: MarkerColor) -> Self {
        Self { coordinate, color, scale: 1.0 }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Pin rectangle `(x, y, width, height)` with its tip at `anchor`.
    pub fn rect_at(&self, anchor: ScreenPoint) -> (f64, f64, f64, f64) {
        let w = MARKER_WIDTH * self.scale;
        let h = MARKER_HEIGHT * self.scale;
        (anchor.x - w / 2.0, anchor.y - h, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        assert_eq!(parse_color("#088"), Ok([0.0, 136.0 / 255.0, 136.0 / 255.0, 1.0]));
        assert_eq!(parse_color("#ff0000"), Ok([1.0, 0.0, 0.0, 1.0]));
        assert!(parse_color("#12345").is_err());
        assert_eq!(parse_color("teal"), Err(SettingError::Color("teal".to_string())));
    }

    #[test]
    fn pin_is_anchored_at_its_tip() {
        let marker = Marker::new(Coordinate::new(38.76, 9.04).unwrap(), MarkerColor::Red)
            .with_scale(PAGE_MARKER_SCALE);
        let (x, y, w, h) = marker.rect_at(ScreenPoint::new(100.0, 100.0));
        assert!((x + w / 2.0 - 100.0).abs() < 1e-9);
        assert!((y + h - 100.0).abs() < 1e-9);
        assert!((w - MARKER_WIDTH * 0.7).abs() < 1e-9);
    }
}
