// 📍 Coordinates embedded in free-text addresses
// Shared by geocoding (accept/reject AI output) and the map-link builder

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Coarse bounding box for Vietnam: latitude 8..24 N, longitude 102..110 E.
pub const LAT_RANGE: (f64, f64) = (8.0, 24.0);
pub const LNG_RANGE: (f64, f64) = (102.0, 110.0);

/// Label used when a coordinate is folded into an address.
pub const ANNOTATION_LABEL: &str = "Tọa độ";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Bounding box check against the service area.
    pub fn in_service_area(&self) -> bool {
        (LAT_RANGE.0..=LAT_RANGE.1).contains(&self.lat) && (LNG_RANGE.0..=LNG_RANGE.1).contains(&self.lng)
    }
}

fn annotation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // (Tọa độ: <lat>, <lng>)
        Regex::new(r"(?i)\(\s*tọa\s*độ\s*:\s*(-?\d{1,3}(?:\.\d+)?)\s*,\s*(-?\d{1,3}(?:\.\d+)?)\s*\)")
            .expect("coordinate annotation regex")
    })
}

fn bare_pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Decimals required on both sides so "Số 12, 34" house numbers don't match
        Regex::new(r"(?:^|[^\d.])(-?\d{1,3}\.\d+)\s*,\s*(-?\d{1,3}\.\d+)\.?(?:$|[^\d])")
            .expect("bare coordinate regex")
    })
}

fn whole_pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(-?\d{1,3}\.\d+)\s*,\s*(-?\d{1,3}\.\d+)\s*$").expect("whole pair regex")
    })
}

fn from_captures(caps: &regex::Captures<'_>) -> Option<Coordinate> {
    let lat = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let lng = caps.get(2)?.as_str().parse::<f64>().ok()?;
    Some(Coordinate::new(lat, lng))
}

/// First bare `lat, lng` decimal pair in `text`, without a bounds check.
pub fn parse_pair(text: &str) -> Option<Coordinate> {
    bare_pair_pattern()
        .captures(text)
        .and_then(|caps| from_captures(&caps))
}

/// Embedded coordinate, preferring an explicit `(Tọa độ: ...)` annotation.
pub fn find_in_text(text: &str) -> Option<Coordinate> {
    annotation_pattern()
        .captures(text)
        .and_then(|caps| from_captures(&caps))
        .or_else(|| parse_pair(text))
}

/// True when the whole text is nothing but a coordinate pair.
pub fn is_bare_pair(text: &str) -> bool {
    whole_pair_pattern().is_match(text)
}

/// Remove `(Tọa độ: ...)` annotations and tidy the leftover separators.
pub fn strip_annotations(text: &str) -> String {
    let stripped = annotation_pattern().replace_all(text, "");
    stripped
        .trim()
        .trim_end_matches(|c: char| c == ',' || c == ';' || c == '-' || c.is_whitespace())
        .to_string()
}

/// Fold a coordinate into an address in the form `find_in_text` recognizes.
pub fn annotate(address: &str, coord: Coordinate) -> String {
    format!("{} ({}: {}, {})", address.trim(), ANNOTATION_LABEL, coord.lat, coord.lng)
}
