// 🗄️ Record Store - single flat CSV file
// Whole-table load at session start, whole-table rewrite on every append

use crate::record::{
    Priority, RescueRequest, Table, UnreadableRow, COLUMNS, COL_PRIORITY, REGION_UNKNOWN,
};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Spreadsheet apps need the BOM to detect UTF-8.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Handle to the backing CSV file.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the table. A missing file is an empty table, not an error.
    pub fn load(&self) -> Result<Table> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "data file not found, starting with empty table");
            return Ok(Table::new());
        }

        let bytes = fs::read(&self.path)
            .with_context(|| format!("Failed to read data file: {:?}", self.path))?;
        let table = decode_csv(&bytes)?;

        info!(path = %self.path.display(), rows = table.len(), "loaded rescue requests");
        Ok(table)
    }

    /// Overwrite the file with the full table.
    pub fn save(&self, table: &Table) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create data directory: {:?}", parent))?;
            }
        }

        let bytes = export_csv(table)?;
        fs::write(&self.path, bytes)
            .with_context(|| format!("Failed to write data file: {:?}", self.path))?;

        debug!(path = %self.path.display(), rows = table.len(), "saved rescue requests");
        Ok(())
    }
}

// ============================================================================
// ENCODING
// ============================================================================

/// Where each column sits in a file as found on disk.
struct Layout {
    /// Index of each of [`COLUMNS`], if the file has it.
    known: [Option<usize>; 5],
    /// Index and name of every other column, in file order.
    extra: Vec<(usize, String)>,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let mut known = [None; 5];
        let mut extra = Vec::new();

        for (idx, name) in headers.iter().enumerate() {
            match COLUMNS.iter().position(|col| *col == name) {
                Some(slot) if known[slot].is_none() => known[slot] = Some(idx),
                _ => extra.push((idx, name.to_string())),
            }
        }
        Self { known, extra }
    }

    fn extra_columns(&self) -> Vec<String> {
        self.extra.iter().map(|(_, name)| name.clone()).collect()
    }

    /// Cell for a known column, `None` when the column or the cell is missing.
    fn cell<'r>(&self, record: &'r csv::StringRecord, col: usize) -> Option<&'r str> {
        self.known[col].and_then(|idx| record.get(idx))
    }

    fn extra_cells(&self, record: &csv::StringRecord) -> Vec<String> {
        self.extra
            .iter()
            .map(|(idx, _)| record.get(*idx).unwrap_or("").to_string())
            .collect()
    }

    fn parse(&self, record: &csv::StringRecord) -> Result<RescueRequest> {
        let text = |col| self.cell(record, col).unwrap_or("").to_string();

        let priority = self
            .cell(record, 0)
            .unwrap_or("")
            .parse::<Priority>()
            .with_context(|| format!("Bad value in column {:?}", COL_PRIORITY))?;

        Ok(RescueRequest {
            priority,
            region: self
                .cell(record, 1)
                .map_or_else(|| REGION_UNKNOWN.to_string(), str::to_string),
            people_count: text(2),
            address: text(3),
            phone: text(4),
            extra: self.extra_cells(record),
        })
    }

    /// Cells in persisted order, for rows that cannot be parsed.
    fn raw_cells(&self, record: &csv::StringRecord) -> Vec<String> {
        (0..COLUMNS.len())
            .map(|col| self.cell(record, col).unwrap_or("").to_string())
            .chain(self.extra_cells(record))
            .collect()
    }
}

/// Parse CSV bytes (BOM optional).
///
/// Cells are trimmed and short rows read missing cells as defaults. A row
/// whose priority cannot be read is kept aside as an [`UnreadableRow`] and
/// unknown columns are carried along, so [`export_csv`] reproduces them.
pub fn decode_csv(bytes: &[u8]) -> Result<Table> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(body);

    let layout = Layout::from_headers(rdr.headers().context("Failed to read CSV header")?);

    let mut rows = Vec::new();
    let mut unreadable = Vec::new();
    for (position, result) in rdr.records().enumerate() {
        let record = result.context("Failed to read CSV row")?;
        match layout.parse(&record) {
            Ok(request) => rows.push(request),
            Err(e) => {
                // Header is line 1
                warn!(line = position + 2, error = %e, "keeping unreadable row as-is");
                unreadable.push(UnreadableRow {
                    position,
                    fields: layout.raw_cells(&record),
                });
            }
        }
    }

    Ok(Table::from_parts(rows, layout.extra_columns(), unreadable))
}

/// Encode a table exactly as it is persisted: BOM, header row, one row per
/// record. Unreadable rows go back to their original positions.
pub fn export_csv(table: &Table) -> Result<Vec<u8>> {
    let width = COLUMNS.len() + table.extra_columns().len();

    let mut buf = UTF8_BOM.to_vec();
    {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut buf);

        let header = COLUMNS
            .iter()
            .copied()
            .chain(table.extra_columns().iter().map(String::as_str));
        wtr.write_record(header).context("Failed to write CSV header")?;

        let mut pending = table.unreadable().iter().peekable();
        let mut written = 0;
        for record in table {
            while let Some(raw) = pending.next_if(|raw| raw.position <= written) {
                wtr.write_record(padded(&raw.fields, width))
                    .context("Failed to write unreadable row")?;
                written += 1;
            }

            let cells = [
                record.priority.label(),
                record.region.as_str(),
                record.people_count.as_str(),
                record.address.as_str(),
                record.phone.as_str(),
            ];
            let mut fields: Vec<&str> = cells.to_vec();
            fields.extend(record.extra.iter().map(String::as_str));
            wtr.write_record(padded_str(fields, width))
                .context("Failed to write rescue request")?;
            written += 1;
        }
        for raw in pending {
            wtr.write_record(padded(&raw.fields, width))
                .context("Failed to write unreadable row")?;
        }

        wtr.flush().context("Failed to flush CSV writer")?;
    }
    Ok(buf)
}

fn padded(fields: &[String], width: usize) -> Vec<&str> {
    padded_str(fields.iter().map(String::as_str).collect(), width)
}

/// Cut or pad with empty cells so every row matches the header.
fn padded_str(mut fields: Vec<&str>, width: usize) -> Vec<&str> {
    fields.resize(width, "");
    fields
}

/// Download name for an export of the filtered view.
pub fn export_filename(timestamp: NaiveDateTime) -> String {
    format!("cuu_ho_filtered_{}.csv", timestamp.format("%Y%m%d_%H%M%S"))
}
