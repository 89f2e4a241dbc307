// ✨ Address Enrichment
// Prompt → single completion → parse, with a safe fallback for every failure

use crate::ai::{AiCollaborator, AiError};
use crate::coords::{self, Coordinate};
use crate::record::REGION_UNKNOWN;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Improved addresses must be longer than this many characters.
const MIN_IMPROVED_LEN: usize = 5;
/// Regions shorter than this many characters are treated as empty.
const MIN_REGION_LEN: usize = 2;
/// Label the model sometimes echoes back in front of the region.
const REGION_LABEL: &str = "Khu vực:";

// ============================================================================
// STATUS
// ============================================================================

/// Outcome of a single enrichment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Success,
    /// Model answered but the answer was too short to use
    NotImproved,
    /// Model answered with nothing usable; the default was applied
    Empty,
    /// Answer could not be parsed or failed the bounds check
    Unparseable,
    /// No collaborator configured or step not applicable
    Skipped,
    Failed(AiError),
}

impl EnrichmentStatus {
    pub fn label(&self) -> String {
        match self {
            EnrichmentStatus::Success => "success".to_string(),
            EnrichmentStatus::NotImproved => "not improved".to_string(),
            EnrichmentStatus::Empty => "success-classified-as-empty".to_string(),
            EnrichmentStatus::Unparseable => "unparseable".to_string(),
            EnrichmentStatus::Skipped => "skipped".to_string(),
            EnrichmentStatus::Failed(err) => err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EnrichmentStatus::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, EnrichmentStatus::Failed(_))
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

// ============================================================================
// PROMPTS
// ============================================================================

fn improve_prompt(address: &str) -> String {
    format!(
        "Phân tích và làm rõ địa chỉ sau đây, trả về địa chỉ đã được chuẩn hóa và rõ ràng hơn.\n\
         Nếu địa chỉ đã rõ ràng thì giữ nguyên. Chỉ trả về địa chỉ đã được cải thiện, không thêm giải thích.\n\n\
         Địa chỉ gốc: {}\n\n\
         Địa chỉ đã được chuẩn hóa:",
        address
    )
}

fn region_prompt(address: &str) -> String {
    format!(
        "Từ địa chỉ sau, xác định địa danh hoặc khu vực chính (xã, thôn, phường hoặc địa điểm nổi bật).\n\
         Chỉ trả về tên khu vực, không thêm giải thích. Nếu không xác định được thì trả về chuỗi rỗng.\n\n\
         Địa chỉ: {}\n\n\
         Khu vực:",
        address
    )
}

fn geocode_prompt(address: &str) -> String {
    format!(
        "Cho biết tọa độ (vĩ độ, kinh độ) gần đúng nhất của địa chỉ sau tại Việt Nam.\n\
         Chỉ trả về đúng định dạng \"vĩ_độ, kinh_độ\" bằng số thập phân, ví dụ: 12.2388, 109.1967.\n\
         Không thêm giải thích.\n\n\
         Địa chỉ: {}",
        address
    )
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Ask the model to normalize an address. Any failure returns the original.
pub fn improve_address(ai: &dyn AiCollaborator, raw: &str) -> (String, EnrichmentStatus) {
    match ai.generate(&improve_prompt(raw)) {
        Ok(text) => {
            let improved = text.trim();
            if improved.chars().count() > MIN_IMPROVED_LEN {
                debug!(original = raw, improved, "address improved");
                (improved.to_string(), EnrichmentStatus::Success)
            } else {
                (raw.to_string(), EnrichmentStatus::NotImproved)
            }
        }
        Err(err) => {
            warn!(error = %err, "address improvement failed, keeping original");
            (raw.to_string(), EnrichmentStatus::Failed(err))
        }
    }
}

/// Ask the model for the dominant place name in an address.
pub fn extract_region(ai: &dyn AiCollaborator, address: &str) -> (String, EnrichmentStatus) {
    match ai.generate(&region_prompt(address)) {
        Ok(text) => {
            let region = clean_region(&text);
            if region.chars().count() < MIN_REGION_LEN {
                (REGION_UNKNOWN.to_string(), EnrichmentStatus::Empty)
            } else {
                (region, EnrichmentStatus::Success)
            }
        }
        Err(err) => {
            warn!(error = %err, "region extraction failed, using default");
            (REGION_UNKNOWN.to_string(), EnrichmentStatus::Failed(err))
        }
    }
}

/// Ask the model for coordinates. Only pairs inside the service area are kept.
pub fn geocode(ai: &dyn AiCollaborator, address: &str) -> (Option<Coordinate>, EnrichmentStatus) {
    match ai.generate(&geocode_prompt(address)) {
        Ok(text) => match coords::parse_pair(&text) {
            Some(coord) if coord.in_service_area() => (Some(coord), EnrichmentStatus::Success),
            _ => {
                debug!(response = %text.trim(), "geocode answer rejected");
                (None, EnrichmentStatus::Unparseable)
            }
        },
        Err(err) => {
            warn!(error = %err, "geocoding failed");
            (None, EnrichmentStatus::Failed(err))
        }
    }
}

fn clean_region(text: &str) -> String {
    let first_line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");

    let without_label = first_line
        .strip_prefix(REGION_LABEL)
        .unwrap_or(first_line)
        .trim();

    without_label
        .trim_end_matches('.')
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '`')
        .trim()
        .to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Collaborator that always answers with the same text (or error).
    pub(crate) struct FixedReply {
        pub reply: Result<String, AiError>,
        pub calls: AtomicUsize,
    }

    impl FixedReply {
        pub fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn err(err: AiError) -> Self {
            Self {
                reply: Err(err),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AiCollaborator for FixedReply {
        fn generate(&self, _prompt: &str) -> Result<String, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    #[test]
    fn test_improve_address_success() {
        let ai = FixedReply::ok("  Thôn Trường Thạnh, xã Diên Thạnh, huyện Diên Khánh, Khánh Hòa \n");
        let (text, status) = improve_address(&ai, "thôn Trường Thạnh");

        assert_eq!(text, "Thôn Trường Thạnh, xã Diên Thạnh, huyện Diên Khánh, Khánh Hòa");
        assert_eq!(status, EnrichmentStatus::Success);
        assert_eq!(ai.call_count(), 1);
    }

    #[test]
    fn test_improve_address_too_short_keeps_original() {
        let ai = FixedReply::ok("Thôn");
        let (text, status) = improve_address(&ai, "thôn 2 gần chợ");

        assert_eq!(text, "thôn 2 gần chợ");
        assert_eq!(status, EnrichmentStatus::NotImproved);
        assert_eq!(status.label(), "not improved");
    }

    #[test]
    fn test_improve_address_failure_keeps_original() {
        let ai = FixedReply::err(AiError::QuotaExhausted);
        let (text, status) = improve_address(&ai, "xã Diên An");

        assert_eq!(text, "xã Diên An");
        assert_eq!(status, EnrichmentStatus::Failed(AiError::QuotaExhausted));
        assert!(status.is_failure());
    }

    #[test]
    fn test_extract_region_empty_answer() {
        let ai = FixedReply::ok("");
        let (region, status) = extract_region(&ai, "đâu đó");

        assert_eq!(region, "Khác");
        assert_eq!(status, EnrichmentStatus::Empty);
        assert_eq!(status.label(), "success-classified-as-empty");
    }

    #[test]
    fn test_extract_region_strips_label() {
        let ai = FixedReply::ok("Khu vực: Diên Khánh");
        let (region, status) = extract_region(&ai, "thị trấn Diên Khánh");

        assert_eq!(region, "Diên Khánh");
        assert_eq!(status, EnrichmentStatus::Success);
    }

    #[test]
    fn test_extract_region_single_char_is_empty() {
        let ai = FixedReply::ok("Khu vực: X");
        assert_eq!(extract_region(&ai, "?").0, "Khác");
    }

    #[test]
    fn test_extract_region_first_line_and_quotes() {
        let ai = FixedReply::ok("\n\"Nhà thờ Hà Dừa\".\nGiải thích: ...");
        assert_eq!(extract_region(&ai, "gần nhà thờ").0, "Nhà thờ Hà Dừa");
    }

    #[test]
    fn test_extract_region_failure_defaults() {
        let ai = FixedReply::err(AiError::InvalidCredential);
        let (region, status) = extract_region(&ai, "xã Diên Lâm");

        assert_eq!(region, "Khác");
        assert_eq!(status, EnrichmentStatus::Failed(AiError::InvalidCredential));
    }

    #[test]
    fn test_geocode_inside_box() {
        let ai = FixedReply::ok("12.2388, 109.1967");
        let (coord, status) = geocode(&ai, "Diên Khánh");

        assert_eq!(coord, Some(Coordinate::new(12.2388, 109.1967)));
        assert_eq!(status, EnrichmentStatus::Success);
        assert_eq!(status.label(), "success");
    }

    #[test]
    fn test_geocode_outside_box_is_unparseable() {
        let ai = FixedReply::ok("30.5, 50.2");
        let (coord, status) = geocode(&ai, "somewhere");

        assert_eq!(coord, None);
        assert_eq!(status, EnrichmentStatus::Unparseable);
        assert_eq!(status.label(), "unparseable");
    }

    #[test]
    fn test_geocode_garbage_is_unparseable() {
        let ai = FixedReply::ok("Tôi không biết địa chỉ này.");
        assert_eq!(geocode(&ai, "??"), (None, EnrichmentStatus::Unparseable));
    }

    #[test]
    fn test_prompts_embed_address() {
        let address = "từ nhà thờ Hà Dừa đi hướng lên Diên Bình";
        assert!(improve_prompt(address).contains(address));
        assert!(region_prompt(address).contains(address));
        assert!(geocode_prompt(address).contains(address));
    }
}
