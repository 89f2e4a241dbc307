use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use rescue_desk::logging::init_logging;
use rescue_desk::{
    build_link, export_filename, AppConfig, EnrichmentOptions, FilterCriteria, NewRequest,
    PageRequest, Priority, RecordStore, Session, ALL_SENTINEL,
};

#[derive(Parser)]
#[command(name = "rescue-desk", version, about = "Rescue request tracking")]
struct Cli {
    /// CSV data file (overrides RESCUE_DATA_FILE)
    #[arg(long, global = true)]
    data_file: Option<PathBuf>,

    /// Never call the AI service
    #[arg(long, global = true)]
    no_ai: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List requests with optional filters
    List {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 25)]
        page_size: usize,
        /// Show every matching row on one page
        #[arg(long)]
        all: bool,
    },
    /// Add a new request (address is cleaned up by AI when configured)
    Add {
        /// Khẩn cấp | Cao | Trung bình | Thấp
        #[arg(long, default_value = "Khẩn cấp")]
        priority: String,
        /// Leave empty to derive it from the address
        #[arg(long, default_value = "")]
        region: String,
        #[arg(long, default_value = "")]
        people: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        phone: String,
    },
    /// Clean up an address without saving anything
    Analyze { address: String },
    /// Export the filtered view as CSV
    Export {
        #[command(flatten)]
        filters: FilterArgs,
        /// Output directory
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Totals, urgent cases and top regions
    Stats,
    /// Print the Google Maps link for an address
    Link { address: String },
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    priority: Option<String>,
    #[arg(long)]
    region: Option<String>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    phone: Option<String>,
}

impl FilterArgs {
    fn criteria(&self) -> Result<FilterCriteria> {
        FilterCriteria::from_selection(
            self.priority.as_deref(),
            self.region.as_deref(),
            self.address.as_deref(),
            self.phone.as_deref(),
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    init_logging(config.log_json);

    if let Some(path) = cli.data_file.clone() {
        config.data_file = path;
    }

    match &cli.command {
        // No session needed
        Command::Link { address } => run_link(address),
        command => {
            let session = open_session(&config, cli.no_ai)?;
            run_command(session, command)
        }
    }
}

fn open_session(config: &AppConfig, no_ai: bool) -> Result<Session> {
    let (ai, options) = if no_ai {
        (None, EnrichmentOptions::disabled())
    } else {
        (config.build_collaborator()?, config.enrichment)
    };

    Session::open(RecordStore::new(config.data_file.clone()), ai, options)
}

fn run_command(mut session: Session, command: &Command) -> Result<()> {
    match command {
        Command::List { filters, page, page_size, all } => {
            let page_size = if *all { None } else { Some(*page_size) };
            run_list(&session, &filters.criteria()?, PageRequest { page_size, page: *page })
        }
        Command::Add { priority, region, people, address, phone } => {
            let request = NewRequest {
                priority: priority.parse::<Priority>()?,
                region: region.clone(),
                people_count: people.clone(),
                address: address.clone(),
                phone: phone.clone(),
            };
            run_add(&mut session, request)
        }
        Command::Analyze { address } => run_analyze(&session, address),
        Command::Export { filters, out_dir } => run_export(&session, &filters.criteria()?, out_dir),
        Command::Stats => {
            run_stats(&session);
            Ok(())
        }
        Command::Link { address } => run_link(address),
    }
}

fn run_list(session: &Session, criteria: &FilterCriteria, page: PageRequest) -> Result<()> {
    if session.table().is_empty() {
        println!("⚠️  No data. Check the CSV file: {:?}", session.store().path());
        return Ok(());
    }

    let view = session.view(criteria, page);
    println!("🔍 Found {} result(s)", view.total);

    if view.rows.is_empty() {
        println!("   No rows match the filters.");
        return Ok(());
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for row in &view.rows {
        let r = &row.record;
        println!("[{}] {} | {} người | ☎ {}", r.priority, r.region, r.people_count, r.phone);
        println!("    📍 {}", r.address);
        println!("    🗺️  {}", row.map_link);
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if let Some((first, last)) = view.shown_range() {
        println!("Showing {}-{} / {} (page {}/{})", first, last, view.total, view.page, view.page_count);
    }
    Ok(())
}

fn run_add(session: &mut Session, request: NewRequest) -> Result<()> {
    if session.has_ai() {
        println!("🔄 Analyzing address with Gemini...");
    }

    let original = request.address.trim().to_string();
    let outcome = session.submit(request)?;

    for warning in &outcome.warnings {
        println!("⚠️  {}", warning);
    }
    if outcome.record.address != original {
        println!("✨ Address improved:");
        println!("   before: {}", original);
        println!("   after:  {}", outcome.record.address);
    }

    println!("✅ Rescue request added ({} rows total)", session.table().len());
    println!("   Region: {}", outcome.record.region);
    println!("   Map:    {}", outcome.map_link);
    Ok(())
}

fn run_analyze(session: &Session, address: &str) -> Result<()> {
    if !session.has_ai() {
        bail!("AI is not configured. Set GEMINI_API_KEY (or drop --no-ai).");
    }

    let (improved, status) = session.analyze_address(address)?;
    if status.is_failure() {
        println!("❌ {}", status);
        println!("💡 The original address can still be used when adding a request.");
    } else if status.is_success() {
        println!("✅ Analysis succeeded");
        println!("📝 Original: {}", address.trim());
        println!("✨ Improved: {}", improved);
    } else {
        println!("⚠️  Address could not be improved ({}). Use the original.", status);
    }
    Ok(())
}

fn run_export(session: &Session, criteria: &FilterCriteria, out_dir: &Path) -> Result<()> {
    let bytes = session.export(criteria)?;
    let path = out_dir.join(export_filename(Local::now().naive_local()));

    fs::create_dir_all(out_dir).with_context(|| format!("Failed to create {:?}", out_dir))?;
    fs::write(&path, bytes).with_context(|| format!("Failed to write {:?}", path))?;

    println!("📥 Exported to {}", path.display());
    Ok(())
}

fn run_link(address: &str) -> Result<()> {
    println!("{}", build_link(address));
    Ok(())
}

fn run_stats(session: &Session) {
    let stats = session.stats();

    println!("📊 Statistics");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Total cases:  {}", stats.total);
    println!("Urgent cases: {}", stats.urgent);
    if stats.unreadable > 0 {
        println!("⚠️  {} row(s) have an unreadable priority and are kept unchanged in the file", stats.unreadable);
    }
    for (priority, count) in &stats.by_priority {
        println!("  {:<12} {}", priority.label(), count);
    }

    if !stats.top_regions.is_empty() {
        println!("\nTop {} regions:", stats.top_regions.len());
        for rc in &stats.top_regions {
            println!("  {}: {}", rc.region, rc.count);
        }
    }

    let options = session.filter_options();
    if options.regions.len() > 1 {
        println!("\nFilter values (use \"{}\" for no filter): {}", ALL_SENTINEL, options.regions[1..].join(", "));
    }
}
