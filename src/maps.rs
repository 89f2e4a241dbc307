// 🗺️ Map-Link Builder
// Pure and total: every input yields a Google Maps URL

use crate::coords::{self, Coordinate};

const COORDINATE_URL: &str = "https://www.google.com/maps?q=";
const SEARCH_URL: &str = "https://www.google.com/maps/search/?api=1&query=";

/// Country token appended to text searches that don't already name it.
pub const COUNTRY_SUFFIX: &str = "Việt Nam";

/// Build a Maps link for an address.
///
/// An embedded coordinate inside the service area wins; otherwise the
/// annotation-free text is searched with the country appended.
pub fn build_link(address: &str) -> String {
    match coords::find_in_text(address) {
        Some(coord) if coord.in_service_area() => coordinate_link(coord),
        _ => search_link(address),
    }
}

pub fn coordinate_link(coord: Coordinate) -> String {
    format!("{}{},{}", COORDINATE_URL, coord.lat, coord.lng)
}

pub fn search_link(address: &str) -> String {
    let text = coords::strip_annotations(address);

    let query = if text.is_empty() {
        COUNTRY_SUFFIX.to_string()
    } else if names_country(&text) {
        text
    } else {
        format!("{}, {}", text, COUNTRY_SUFFIX)
    };

    format!("{}{}", SEARCH_URL, urlencoding::encode(&query))
}

fn names_country(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("việt nam") || lower.contains("vietnam") || lower.contains("viet nam")
}
