//! Per-record report rows and the dated CSV file they end up in.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::allocator::CallNumber;
use crate::creator::{CreationOutcome, ResourceStatus};
use crate::error::ReportError;
use crate::lookup::MatchStatus;

/// Shown in place of a call number that was never allocated.
pub const NOT_ALLOCATED: &str = "N/A";

const JOIN: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Created,
    Partial,
    Failed,
    SkippedMatch,
    Simulated,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordStatus::Created => "CREATED",
            RecordStatus::Partial => "PARTIAL",
            RecordStatus::Failed => "FAILED",
            RecordStatus::SkippedMatch => "SKIPPED_MATCH",
            RecordStatus::Simulated => "SIMULATED",
        };
        f.write_str(s)
    }
}

impl RecordStatus {
    pub fn of(outcome: &CreationOutcome) -> Self {
        if outcome.simulated {
            RecordStatus::Simulated
        } else if outcome.bib_status != ResourceStatus::Created {
            RecordStatus::Failed
        } else if outcome.is_complete() {
            RecordStatus::Created
        } else {
            RecordStatus::Partial
        }
    }
}

/// One processed source record. Rows are appended once and never changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub record_index: usize,
    pub source_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub call_number: Option<CallNumber>,
    pub match_status: MatchStatus,
    pub match_id: Option<String>,
    pub record_status: RecordStatus,
    pub outcome: CreationOutcome,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CsvRow {
    record_index: usize,
    source_id: String,
    title: String,
    author: String,
    call_number: String,
    match_status: String,
    match_id: String,
    bib_id: String,
    bib_status: String,
    record_status: String,
    simulated: bool,
    holding_locations: String,
    holding_ids: String,
    holding_statuses: String,
    holding_errors: String,
    item_ids: String,
    item_statuses: String,
    item_errors: String,
    warnings: String,
    errors: String,
}

impl From<&ReportRow> for CsvRow {
    fn from(row: &ReportRow) -> Self {
        let mut holding_locations = Vec::new();
        let mut holding_ids = Vec::new();
        let mut holding_statuses = Vec::new();
        let mut holding_errors = Vec::new();
        let mut item_ids = Vec::new();
        let mut item_statuses = Vec::new();
        let mut item_errors = Vec::new();

        for holding in &row.outcome.holdings {
            let loc = &holding.location;
            holding_locations.push(loc.clone());
            if let Some(id) = &holding.holding_id {
                holding_ids.push(id.clone());
            }
            holding_statuses.push(format!("{loc}:{}", holding.status));
            if let Some(e) = &holding.error {
                holding_errors.push(format!("{loc}:{e}"));
            }
            for item in &holding.items {
                if let Some(id) = &item.item_id {
                    item_ids.push(id.clone());
                }
                item_statuses.push(format!("{loc}:{}", item.status));
                if let Some(e) = &item.error {
                    item_errors.push(format!("{loc}:{e}"));
                }
            }
        }

        CsvRow {
            record_index: row.record_index,
            source_id: row.source_id.clone().unwrap_or_default(),
            title: row.title.clone().unwrap_or_default(),
            author: row.author.clone().unwrap_or_default(),
            call_number: row
                .call_number
                .as_ref()
                .map_or_else(|| NOT_ALLOCATED.to_string(), |c| c.to_string()),
            match_status: row.match_status.to_string(),
            match_id: row.match_id.clone().unwrap_or_default(),
            bib_id: row.outcome.bib_id.clone().unwrap_or_default(),
            bib_status: row.outcome.bib_status.to_string(),
            record_status: row.record_status.to_string(),
            simulated: row.outcome.simulated,
            holding_locations: holding_locations.join(JOIN),
            holding_ids: holding_ids.join(JOIN),
            holding_statuses: holding_statuses.join(JOIN),
            holding_errors: holding_errors.join(JOIN),
            item_ids: item_ids.join(JOIN),
            item_statuses: item_statuses.join(JOIN),
            item_errors: item_errors.join(JOIN),
            warnings: row.warnings.join(JOIN),
            errors: row.errors.join(JOIN),
        }
    }
}

/// End-of-run counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub records: usize,
    pub by_status: BTreeMap<RecordStatus, usize>,
    pub call_numbers_allocated: u64,
    pub pages_fetched: u32,
}

impl RunSummary {
    pub fn count(&self, status: RecordStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn trace(&self) {
        info!(
            records = self.records,
            created = self.count(RecordStatus::Created),
            partial = self.count(RecordStatus::Partial),
            failed = self.count(RecordStatus::Failed),
            skipped_match = self.count(RecordStatus::SkippedMatch),
            simulated = self.count(RecordStatus::Simulated),
            call_numbers_allocated = self.call_numbers_allocated,
            pages_fetched = self.pages_fetched,
            "[REPORT] Run summary"
        );
    }
}

/// Append-only accumulator for the run.
#[derive(Debug, Default)]
pub struct Report {
    rows: Vec<ReportRow>,
    pages_fetched: u32,
    call_numbers_allocated: u64,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: ReportRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub(crate) fn page_fetched(&mut self) {
        self.pages_fetched += 1;
    }

    pub(crate) fn set_call_numbers_allocated(&mut self, count: u64) {
        self.call_numbers_allocated = count;
    }

    pub fn summary(&self) -> RunSummary {
        let mut by_status = BTreeMap::new();
        for row in &self.rows {
            *by_status.entry(row.record_status).or_insert(0) += 1;
        }
        RunSummary {
            records: self.rows.len(),
            by_status,
            call_numbers_allocated: self.call_numbers_allocated,
            pages_fetched: self.pages_fetched,
        }
    }

    /// Write every row as `;`-separated CSV with a header.
    pub fn write_csv_to<W: io::Write>(&self, writer: W) -> Result<(), ReportError> {
        let mut csv = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);
        if self.rows.is_empty() {
            // serialize() emits the header lazily; an empty run still gets one.
            csv.write_record(HEADER)?;
        }
        for row in &self.rows {
            csv.serialize(CsvRow::from(row))?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Write `<dir>/<prefix><YYYY-MM-DD>.csv` and return its path.
    pub fn write_csv(&self, dir: &Path, prefix: &str, date: NaiveDate) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{prefix}{}.csv", date.format("%Y-%m-%d")));
        let file = std::fs::File::create(&path)?;
        self.write_csv_to(file)?;
        info!(path = %path.display(), rows = self.rows.len(), "[REPORT] Report written");
        Ok(path)
    }
}

const HEADER: [&str; 20] = [
    "record_index",
    "source_id",
    "title",
    "author",
    "call_number",
    "match_status",
    "match_id",
    "bib_id",
    "bib_status",
    "record_status",
    "simulated",
    "holding_locations",
    "holding_ids",
    "holding_statuses",
    "holding_errors",
    "item_ids",
    "item_statuses",
    "item_errors",
    "warnings",
    "errors",
];
