// 🚨 Rescue Request Model
// One row of the rescue table + the table value type itself

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// COLUMNS
// ============================================================================

pub const COL_PRIORITY: &str = "Mức độ ưu tiên";
pub const COL_REGION: &str = "Chi tiết khu vực";
pub const COL_PEOPLE: &str = "Số người";
pub const COL_ADDRESS: &str = "Địa chỉ";
pub const COL_PHONE: &str = "Số điện thoại";

/// Header row of the persisted file, in column order.
pub const COLUMNS: [&str; 5] = [COL_PRIORITY, COL_REGION, COL_PEOPLE, COL_ADDRESS, COL_PHONE];

/// Region label used whenever the real region is unknown.
pub const REGION_UNKNOWN: &str = "Khác";

fn default_region() -> String {
    REGION_UNKNOWN.to_string()
}

// ============================================================================
// PRIORITY
// ============================================================================

/// Urgency level assigned when the request is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "Khẩn cấp")]
    Urgent,
    #[serde(rename = "Cao")]
    High,
    #[serde(rename = "Trung bình")]
    Medium,
    #[serde(rename = "Thấp")]
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::Urgent, Priority::High, Priority::Medium, Priority::Low];

    /// Label as stored in the CSV file and shown to operators
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Urgent => "Khẩn cấp",
            Priority::High => "Cao",
            Priority::Medium => "Trung bình",
            Priority::Low => "Thấp",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    /// Accepts labels with stray whitespace or in any letter case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Priority::ALL
            .iter()
            .copied()
            .find(|p| p.label().to_lowercase() == wanted)
            .ok_or_else(|| anyhow::anyhow!("Unknown priority: {:?}", s))
    }
}

// ============================================================================
// RESCUE REQUEST
// ============================================================================

/// A single rescue request. Row position is its only identity.
///
/// Columns missing from files written by older revisions load as empty
/// strings (region falls back to `Khác`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescueRequest {
    #[serde(rename = "Mức độ ưu tiên")]
    pub priority: Priority,

    #[serde(rename = "Chi tiết khu vực", default = "default_region")]
    pub region: String,

    #[serde(rename = "Số người", default)]
    pub people_count: String,

    #[serde(rename = "Địa chỉ", default)]
    pub address: String,

    #[serde(rename = "Số điện thoại", default)]
    pub phone: String,

    /// Values of columns this app does not know about, in the order of
    /// [`Table::extra_columns`]. Carried so a rewrite keeps them.
    #[serde(skip)]
    pub extra: Vec<String>,
}

impl RescueRequest {
    pub fn new(
        priority: Priority,
        region: impl Into<String>,
        people_count: impl Into<String>,
        address: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        Self {
            priority,
            region: region.into(),
            people_count: people_count.into(),
            address: address.into(),
            phone: phone.into(),
            extra: Vec::new(),
        }
    }

    pub fn is_urgent(&self) -> bool {
        self.priority == Priority::Urgent
    }
}

/// A file row whose priority could not be read. It is hidden from views but
/// written back verbatim, at its original position, on every save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableRow {
    /// Position among all data rows of the file (0-based).
    pub position: usize,
    /// Cells in persisted column order: [`COLUMNS`] then the extra columns.
    pub fields: Vec<String>,
}

// ============================================================================
// TABLE
// ============================================================================

/// The in-memory table. Treated as a value: appending yields a new table.
///
/// Besides the readable rows it carries whatever else the file held (extra
/// columns, unreadable rows) so that saving never drops data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    rows: Vec<RescueRequest>,
    extra_columns: Vec<String>,
    unreadable: Vec<UnreadableRow>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<RescueRequest>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub(crate) fn from_parts(
        rows: Vec<RescueRequest>,
        extra_columns: Vec<String>,
        unreadable: Vec<UnreadableRow>,
    ) -> Self {
        Self {
            rows,
            extra_columns,
            unreadable,
        }
    }

    /// A table over `rows` with the same columns as `self` and no unreadable rows.
    pub fn subset(&self, rows: Vec<RescueRequest>) -> Table {
        Table {
            rows,
            extra_columns: self.extra_columns.clone(),
            unreadable: Vec::new(),
        }
    }

    /// Returns a new table with `record` at the end; `self` is left untouched.
    pub fn append(&self, mut record: RescueRequest) -> Table {
        record.extra.resize(self.extra_columns.len(), String::new());
        let mut rows = Vec::with_capacity(self.rows.len() + 1);
        rows.extend(self.rows.iter().cloned());
        rows.push(record);
        Table {
            rows,
            extra_columns: self.extra_columns.clone(),
            unreadable: self.unreadable.clone(),
        }
    }

    /// Header names found in the file beyond [`COLUMNS`].
    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    pub fn unreadable(&self) -> &[UnreadableRow] {
        &self.unreadable
    }

    pub fn rows(&self) -> &[RescueRequest] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RescueRequest> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RescueRequest> {
        self.rows.get(index)
    }

    pub fn into_rows(self) -> Vec<RescueRequest> {
        self.rows
    }
}

impl FromIterator<RescueRequest> for Table {
    fn from_iter<I: IntoIterator<Item = RescueRequest>>(iter: I) -> Self {
        Table::from_rows(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = &'a RescueRequest;
    type IntoIter = std::slice::Iter<'a, RescueRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
