// 🧭 Session - one operator's working context
//
// Owns the store handle, the in-memory table, the optional AI collaborator
// and the enrichment switches. Surfaces (CLI, HTTP) only talk to this.

use crate::ai::{AiCollaborator, AiError};
use crate::coords;
use crate::enrichment::{self, EnrichmentStatus};
use crate::filter::{self, FilterCriteria};
use crate::maps;
use crate::record::{Priority, RescueRequest, Table, REGION_UNKNOWN};
use crate::stats::{self, TableStats};
use crate::store::{self, RecordStore};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

// ============================================================================
// INPUT / OUTPUT TYPES
// ============================================================================

/// Which AI-derived fields are produced on intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentOptions {
    pub improve_address: bool,
    pub extract_region: bool,
    pub geocode: bool,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            improve_address: true,
            extract_region: true,
            geocode: true,
        }
    }
}

impl EnrichmentOptions {
    pub fn disabled() -> Self {
        Self {
            improve_address: false,
            extract_region: false,
            geocode: false,
        }
    }
}

/// The "add request" form as submitted by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub priority: Priority,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub people_count: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error(transparent)]
    Persist(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStep {
    ImproveAddress,
    ExtractRegion,
    Geocode,
}

impl EnrichmentStep {
    /// What the record falls back to when this step fails
    fn fallback(&self) -> &'static str {
        match self {
            EnrichmentStep::ImproveAddress => "địa chỉ gốc",
            EnrichmentStep::ExtractRegion => "khu vực \"Khác\"",
            EnrichmentStep::Geocode => "địa chỉ không có tọa độ",
        }
    }
}

impl fmt::Display for EnrichmentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnrichmentStep::ImproveAddress => "improve_address",
            EnrichmentStep::ExtractRegion => "extract_region",
            EnrichmentStep::Geocode => "geocode",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: EnrichmentStep,
    pub status: EnrichmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    pub record: RescueRequest,
    pub map_link: String,
    pub steps: Vec<StepReport>,
    /// Operator-facing warnings for degraded enrichment
    pub warnings: Vec<String>,
}

impl SubmitOutcome {
    pub fn status_of(&self, step: EnrichmentStep) -> Option<&EnrichmentStatus> {
        self.steps.iter().find(|s| s.step == step).map(|s| &s.status)
    }
}

/// `page_size: None` shows every row on a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_size: Option<usize>,
    pub page: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_size: Some(filter::DEFAULT_PAGE_SIZE),
            page: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowView {
    #[serde(flatten)]
    pub record: RescueRequest,
    pub map_link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView {
    pub rows: Vec<RowView>,
    /// Rows matching the filter, across all pages
    pub total: usize,
    pub page: usize,
    pub page_count: usize,
    pub page_size: Option<usize>,
}

impl PageView {
    /// 1-based (first, last) row numbers shown, None when empty
    pub fn shown_range(&self) -> Option<(usize, usize)> {
        if self.rows.is_empty() {
            return None;
        }
        let first = match self.page_size {
            Some(size) => (self.page - 1) * size + 1,
            None => 1,
        };
        Some((first, first + self.rows.len() - 1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub priorities: Vec<String>,
    pub regions: Vec<String>,
    pub page_sizes: Vec<usize>,
}

/// Presence checks only; run before any AI call.
pub fn validate(request: &NewRequest) -> Result<(), IntakeError> {
    if request.address.trim().is_empty() {
        return Err(IntakeError::MissingRequiredField("address"));
    }
    if request.phone.trim().is_empty() {
        return Err(IntakeError::MissingRequiredField("phone"));
    }
    Ok(())
}

fn warning_for(step: EnrichmentStep, err: &AiError) -> String {
    let reason = match err {
        AiError::QuotaExhausted => "Quota API đã hết".to_string(),
        AiError::InvalidCredential => "API key không hợp lệ".to_string(),
        AiError::Failed(detail) => format!("Lỗi: {}", detail),
    };
    format!("{} ({}). Sử dụng {}.", reason, step, step.fallback())
}

// ============================================================================
// SESSION
// ============================================================================

pub struct Session {
    store: RecordStore,
    table: Table,
    ai: Option<Box<dyn AiCollaborator>>,
    options: EnrichmentOptions,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("store", &self.store)
            .field("rows", &self.table.len())
            .field("ai", &self.ai.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl Session {
    /// Start a session: the table is loaded once, here.
    pub fn open(
        store: RecordStore,
        ai: Option<Box<dyn AiCollaborator>>,
        options: EnrichmentOptions,
    ) -> Result<Self> {
        let table = store.load()?;
        info!(rows = table.len(), ai = ai.is_some(), "session opened");

        Ok(Self {
            store,
            table,
            ai,
            options,
        })
    }

    /// End the session, handing back the final table.
    pub fn close(self) -> Table {
        info!(rows = self.table.len(), "session closed");
        self.table
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn options(&self) -> EnrichmentOptions {
        self.options
    }

    pub fn has_ai(&self) -> bool {
        self.ai.is_some()
    }

    // ------------------------------------------------------------------------
    // Intake
    // ------------------------------------------------------------------------

    /// Validate, enrich, append and persist a new request.
    ///
    /// Enrichment failures never block the append; they surface as warnings.
    /// If persisting fails the session table is left unchanged.
    pub fn submit(&mut self, request: NewRequest) -> Result<SubmitOutcome, IntakeError> {
        validate(&request)?;

        let mut steps = Vec::new();
        let mut warnings = Vec::new();
        let mut note = |step: EnrichmentStep, status: EnrichmentStatus| {
            if let EnrichmentStatus::Failed(ref err) = status {
                warnings.push(warning_for(step, err));
            }
            steps.push(StepReport { step, status });
        };

        let ai = self.ai.as_deref();
        let mut address = request.address.trim().to_string();

        if self.options.improve_address {
            let status = match ai {
                Some(ai) => {
                    let (text, status) = enrichment::improve_address(ai, &address);
                    address = text;
                    status
                }
                None => EnrichmentStatus::Skipped,
            };
            note(EnrichmentStep::ImproveAddress, status);
        }

        let operator_region = request.region.trim();
        let region = if !operator_region.is_empty() {
            operator_region.to_string()
        } else if self.options.extract_region {
            match ai {
                // A bare coordinate pair names no place to extract
                Some(ai) if !coords::is_bare_pair(&address) => {
                    let (region, status) = enrichment::extract_region(ai, &address);
                    note(EnrichmentStep::ExtractRegion, status);
                    region
                }
                _ => {
                    note(EnrichmentStep::ExtractRegion, EnrichmentStatus::Skipped);
                    REGION_UNKNOWN.to_string()
                }
            }
        } else {
            REGION_UNKNOWN.to_string()
        };

        if self.options.geocode {
            let status = match ai {
                Some(ai) if coords::find_in_text(&address).is_none() => {
                    let (coord, status) = enrichment::geocode(ai, &address);
                    if let Some(coord) = coord {
                        address = coords::annotate(&address, coord);
                    }
                    status
                }
                _ => EnrichmentStatus::Skipped,
            };
            note(EnrichmentStep::Geocode, status);
        }

        let record = RescueRequest {
            priority: request.priority,
            region,
            people_count: request.people_count.trim().to_string(),
            address,
            phone: request.phone.trim().to_string(),
            extra: Vec::new(),
        };

        let table = self.table.append(record.clone());
        self.store.save(&table)?;
        self.table = table;

        for warning in &warnings {
            warn!(warning = %warning, "enrichment degraded");
        }
        info!(
            priority = %record.priority,
            region = %record.region,
            rows = self.table.len(),
            "rescue request added"
        );

        Ok(SubmitOutcome {
            map_link: maps::build_link(&record.address),
            record,
            steps,
            warnings,
        })
    }

    /// Stand-alone address cleanup, without touching the table.
    pub fn analyze_address(&self, raw: &str) -> Result<(String, EnrichmentStatus), IntakeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(IntakeError::MissingRequiredField("address"));
        }

        Ok(match self.ai.as_deref() {
            Some(ai) => enrichment::improve_address(ai, raw),
            None => (raw.to_string(), EnrichmentStatus::Skipped),
        })
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    pub fn view(&self, criteria: &FilterCriteria, request: PageRequest) -> PageView {
        let filtered = filter::filter(&self.table, criteria);
        let total = filtered.len();

        let (rows, page, page_count) = match request.page_size {
            Some(size) => {
                let size = size.max(1);
                let page = filter::clamp_page(request.page, total, size);
                (
                    filter::paginate(&filtered, size, page),
                    page,
                    filter::page_count(total, size),
                )
            }
            None => (filtered, 1, usize::from(total > 0)),
        };

        PageView {
            rows: rows
                .into_rows()
                .into_iter()
                .map(|record| RowView {
                    map_link: maps::build_link(&record.address),
                    record,
                })
                .collect(),
            total,
            page,
            page_count,
            page_size: request.page_size.map(|s| s.max(1)),
        }
    }

    /// CSV bytes of the filtered view, in the persisted encoding.
    pub fn export(&self, criteria: &FilterCriteria) -> Result<Vec<u8>> {
        store::export_csv(&filter::filter(&self.table, criteria))
    }

    pub fn stats(&self) -> TableStats {
        stats::compute(&self.table)
    }

    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            priorities: filter::distinct_priorities(&self.table),
            regions: filter::distinct_regions(&self.table),
            page_sizes: filter::PAGE_SIZES.to_vec(),
        }
    }
}
