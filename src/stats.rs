// 📊 Table statistics for the operator sidebar

use crate::record::{Priority, Table};
use serde::Serialize;
use std::collections::HashMap;

/// How many regions the sidebar lists.
pub const TOP_REGIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionCount {
    pub region: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub total: usize,
    pub urgent: usize,
    pub by_priority: Vec<(Priority, usize)>,
    pub top_regions: Vec<RegionCount>,
    /// File rows left out of every count because their priority is unreadable.
    pub unreadable: usize,
}

pub fn compute(table: &Table) -> TableStats {
    let mut by_priority: HashMap<Priority, usize> = HashMap::new();
    let mut by_region: HashMap<&str, usize> = HashMap::new();

    for record in table {
        *by_priority.entry(record.priority).or_insert(0) += 1;

        let region = record.region.trim();
        if !region.is_empty() {
            *by_region.entry(region).or_insert(0) += 1;
        }
    }

    let mut top_regions: Vec<RegionCount> = by_region
        .into_iter()
        .map(|(region, count)| RegionCount {
            region: region.to_string(),
            count,
        })
        .collect();
    // Most frequent first, ties by name so output is stable
    top_regions.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.region.cmp(&b.region)));
    top_regions.truncate(TOP_REGIONS);

    TableStats {
        total: table.len(),
        urgent: table.iter().filter(|r| r.is_urgent()).count(),
        by_priority: Priority::ALL
            .iter()
            .map(|p| (*p, by_priority.get(p).copied().unwrap_or(0)))
            .collect(),
        top_regions,
        unreadable: table.unreadable().len(),
    }
}
