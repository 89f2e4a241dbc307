// Rescue Desk - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod record;
pub mod store;
pub mod filter;
pub mod stats;
pub mod coords;
pub mod maps;
pub mod ai;          // AI collaborator contract + Gemini adapter
pub mod enrichment;  // Address cleanup, region, geocode
pub mod session;     // Per-operator context: intake + views
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use record::{
    Priority, RescueRequest, Table, UnreadableRow,
    COLUMNS, REGION_UNKNOWN,
};
pub use store::{RecordStore, export_csv, export_filename};
pub use filter::{
    FilterCriteria, filter, paginate, page_count, clamp_page,
    distinct_priorities, distinct_regions, ALL_SENTINEL,
};
pub use stats::{TableStats, RegionCount};
pub use coords::Coordinate;
pub use maps::build_link;
pub use ai::{AiCollaborator, AiError, GeminiClient, classify_failure};
pub use enrichment::{EnrichmentStatus, improve_address, extract_region, geocode};
pub use session::{
    Session, NewRequest, IntakeError, EnrichmentOptions, EnrichmentStep,
    StepReport, SubmitOutcome, PageRequest, PageView, RowView, FilterOptions,
};
pub use config::AppConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
