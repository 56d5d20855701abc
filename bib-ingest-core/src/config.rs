use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::allocator::{CallNumberFormat, RetryPolicy};
use crate::creator::{HoldingConfig, ItemConfig};
use crate::harvest::HarvestMode;
use crate::mapper::MappingConfig;

/// Everything the orchestrator needs for one run. Built by the CLI from the
/// YAML file, the environment and the command line.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub dry_run: bool,
    pub validation: bool,
    pub existence_check: bool,
    pub harvest_mode: HarvestMode,
    /// `None` means no limit.
    pub max_records: Option<usize>,
    pub mapping: MappingConfig,
    pub holdings: HoldingConfig,
    pub items: ItemConfig,
    pub counter_retry: RetryPolicy,
    pub call_number: CallNumberFormat,
    pub last_value_file: Option<PathBuf>,
    /// Arrival date stamped on new items.
    pub run_date: NaiveDate,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            validation: true,
            existence_check: true,
            harvest_mode: HarvestMode::Paginated {
                start_page: 1,
                page_size: 100,
            },
            max_records: None,
            mapping: MappingConfig::default(),
            holdings: HoldingConfig::default(),
            items: ItemConfig::default(),
            counter_retry: RetryPolicy::default(),
            call_number: CallNumberFormat::default(),
            last_value_file: Some(PathBuf::from("last_call_number.txt")),
            run_date: chrono::Local::now().date_naive(),
        }
    }
}

/// Where and how the report file is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub dir: PathBuf,
    pub prefix: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("reports"),
            prefix: "rapport_".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn trace_loaded(&self) {
        info!(
            dry_run = self.dry_run,
            validation = self.validation,
            existence_check = self.existence_check,
            harvest_mode = ?self.harvest_mode,
            max_records = ?self.max_records,
            library = %self.holdings.library_code,
            locations = ?self.holdings.locations.iter().map(|l| l.code.as_str()).collect::<Vec<_>>(),
            call_number_prefix = %self.call_number.prefix,
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}

impl ReportConfig {
    pub fn trace_loaded(&self) {
        info!(dir = ?self.dir, prefix = %self.prefix, "Loaded ReportConfig");
    }
}
