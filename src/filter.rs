// 🔍 Filter/Search Engine
// Equality + substring filters over the in-memory table, then pagination

use crate::record::{Priority, RescueRequest, Table};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Dropdown sentinel meaning "no constraint".
pub const ALL_SENTINEL: &str = "Tất cả";

/// Page sizes offered to operators.
pub const PAGE_SIZES: [usize; 4] = [10, 25, 50, 100];
pub const DEFAULT_PAGE_SIZE: usize = 25;

// ============================================================================
// CRITERIA
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub priority: Option<Priority>,
    pub region: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl FilterCriteria {
    /// No constraints at all
    pub fn all() -> Self {
        Self::default()
    }

    /// Build criteria from raw form input. Blank values and `Tất cả` mean
    /// "no constraint"; an unknown priority label is rejected.
    pub fn from_selection(
        priority: Option<&str>,
        region: Option<&str>,
        address: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Self> {
        let priority = match selection(priority) {
            Some(label) => Some(label.parse::<Priority>()?),
            None => None,
        };

        Ok(Self {
            priority,
            region: selection(region),
            address: search_term(address),
            phone: search_term(phone),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.priority.is_none() && self.region.is_none() && self.address.is_none() && self.phone.is_none()
    }

    pub fn matches(&self, record: &RescueRequest) -> bool {
        if let Some(priority) = self.priority {
            if record.priority != priority {
                return false;
            }
        }

        if let Some(ref region) = self.region {
            if &record.region != region {
                return false;
            }
        }

        if let Some(ref term) = self.address {
            if !contains_ignore_case(&record.address, term) {
                return false;
            }
        }

        if let Some(ref term) = self.phone {
            if !contains_ignore_case(&record.phone, term) {
                return false;
            }
        }

        true
    }
}

fn selection(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != ALL_SENTINEL)
        .map(str::to_string)
}

// Search terms keep inner whitespace but not surrounding blanks
fn search_term(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

// ============================================================================
// FILTER + PAGINATION
// ============================================================================

/// Apply all criteria (logical AND). Order is preserved.
pub fn filter(table: &Table, criteria: &FilterCriteria) -> Table {
    if criteria.is_empty() {
        return table.clone();
    }

    table.subset(
        table
            .iter()
            .filter(|record| criteria.matches(record))
            .cloned()
            .collect(),
    )
}

/// Rows `[(page-1)*size, page*size)`. Page is 1-based; anything out of range
/// yields an empty table.
pub fn paginate(table: &Table, page_size: usize, page_number: usize) -> Table {
    if page_size == 0 || page_number == 0 {
        return table.subset(Vec::new());
    }

    let start = match (page_number - 1).checked_mul(page_size) {
        Some(start) if start < table.len() => start,
        _ => return table.subset(Vec::new()),
    };
    let end = start.saturating_add(page_size).min(table.len());

    table.subset(table.rows()[start..end].to_vec())
}

pub fn page_count(len: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    len.div_ceil(page_size)
}

/// Clamp a requested page into `[1, page_count]` (at least 1 for empty tables).
pub fn clamp_page(page_number: usize, len: usize, page_size: usize) -> usize {
    let last = page_count(len, page_size).max(1);
    page_number.clamp(1, last)
}

// ============================================================================
// DROPDOWN OPTIONS
// ============================================================================

/// Priorities present in the table, sorted, prefixed with `Tất cả`.
pub fn distinct_priorities(table: &Table) -> Vec<String> {
    let present: BTreeSet<Priority> = table.iter().map(|r| r.priority).collect();

    std::iter::once(ALL_SENTINEL.to_string())
        .chain(present.into_iter().map(|p| p.label().to_string()))
        .collect()
}

/// Non-blank regions present in the table, sorted, prefixed with `Tất cả`.
pub fn distinct_regions(table: &Table) -> Vec<String> {
    let present: BTreeSet<&str> = table
        .iter()
        .map(|r| r.region.as_str())
        .filter(|r| !r.trim().is_empty())
        .collect();

    std::iter::once(ALL_SENTINEL.to_string())
        .chain(present.into_iter().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_table() -> Table {
        let rows = vec![
            RescueRequest::new(Priority::Urgent, "Diên Khánh", "5", "Thôn Trường Thạnh, xã Diên Thạnh", "0912345678"),
            RescueRequest::new(Priority::High, "Diên Phú", "Nhiều", "Gần nhà thờ Hà Dừa", "0901234567"),
            RescueRequest::new(Priority::Urgent, "Diên Phú", "2", "thôn Phú Ân Nam", "0988000111"),
            RescueRequest::new(Priority::Low, "Khác", "", "12.2388,109.1967", "0977"),
            RescueRequest::new(Priority::Medium, "Diên Khánh", "10-15", "TỔ 5, THỊ TRẤN", "0912 999 000"),
        ];
        Table::from_rows(rows)
    }

    #[test]
    fn test_no_criteria_returns_everything() {
        let table = create_test_table();
        assert_eq!(filter(&table, &FilterCriteria::all()), table);
    }

    #[test]
    fn test_priority_and_region_exact_match() {
        let table = create_test_table();
        let criteria = FilterCriteria {
            priority: Some(Priority::Urgent),
            region: Some("Diên Phú".to_string()),
            ..Default::default()
        };

        let result = filter(&table, &criteria);
        assert_eq!(result.len(), 1);
        assert_eq!(result.get(0).unwrap().address, "thôn Phú Ân Nam");

        let partial_region = FilterCriteria {
            region: Some("Diên".to_string()),
            ..Default::default()
        };
        assert!(filter(&table, &partial_region).is_empty());
    }

    #[test]
    fn test_address_substring_is_case_insensitive() {
        let table = create_test_table();
        let criteria = FilterCriteria {
            address: Some("thị trấn".to_string()),
            ..Default::default()
        };

        let result = filter(&table, &criteria);
        assert_eq!(result.len(), 1);
        assert_eq!(result.get(0).unwrap().region, "Diên Khánh");
    }

    #[test]
    fn test_phone_substring() {
        let table = create_test_table();
        let criteria = FilterCriteria {
            phone: Some("0912".to_string()),
            ..Default::default()
        };
        assert_eq!(filter(&table, &criteria).len(), 2);
    }

    #[test]
    fn test_sentinel_and_blank_mean_no_constraint() {
        let criteria =
            FilterCriteria::from_selection(Some(ALL_SENTINEL), Some(" "), Some(""), None).unwrap();
        assert!(criteria.is_empty());

        let criteria =
            FilterCriteria::from_selection(Some("Cao"), Some(ALL_SENTINEL), Some(" hà "), None).unwrap();
        assert_eq!(criteria.priority, Some(Priority::High));
        assert_eq!(criteria.region, None);
        assert_eq!(criteria.address.as_deref(), Some("hà"));

        assert!(FilterCriteria::from_selection(Some("Siêu gấp"), None, None, None).is_err());
    }

    #[test]
    fn test_filter_is_idempotent() {
        let table = create_test_table();
        let criteria = FilterCriteria {
            priority: Some(Priority::Urgent),
            address: Some("thôn".to_string()),
            ..Default::default()
        };

        let once = filter(&table, &criteria);
        let twice = filter(&once, &criteria);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_pages_cover_table_exactly_once() {
        let table = create_test_table();

        for size in 1..=7 {
            let pages = page_count(table.len(), size);
            let mut rebuilt = Vec::new();
            for page in 1..=pages {
                rebuilt.extend(paginate(&table, size, page).into_rows());
            }
            assert_eq!(Table::from_rows(rebuilt), table, "page size {}", size);
        }
    }

    #[test]
    fn test_out_of_range_pages_are_empty() {
        let table = create_test_table();
        assert!(paginate(&table, 2, 0).is_empty());
        assert!(paginate(&table, 2, 4).is_empty());
        assert!(paginate(&table, 0, 1).is_empty());
        assert!(paginate(&table, 2, usize::MAX).is_empty());
        assert_eq!(paginate(&table, 2, 3).len(), 1);
    }

    #[test]
    fn test_clamp_page() {
        assert_eq!(clamp_page(0, 5, 2), 1);
        assert_eq!(clamp_page(9, 5, 2), 3);
        assert_eq!(clamp_page(2, 5, 2), 2);
        assert_eq!(clamp_page(4, 0, 25), 1);
    }

    #[test]
    fn test_distinct_options() {
        let table = create_test_table();

        let priorities = distinct_priorities(&table);
        assert_eq!(priorities[0], ALL_SENTINEL);
        assert_eq!(priorities.len(), 5);

        let regions = distinct_regions(&table);
        assert_eq!(regions, vec!["Tất cả", "Diên Khánh", "Diên Phú", "Khác"]);
    }
}
