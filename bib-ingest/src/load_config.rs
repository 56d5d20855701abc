/// `load_config` module: loads the static YAML config, injects secrets from the
/// environment and applies command-line overrides, producing the core's
/// [`PipelineConfig`] plus what the CLI needs to build its HTTP clients.
///
/// This module is the only place where untrusted YAML is parsed.
///
/// # Precedence
/// - Every YAML field has a default, and a missing `--config` means all defaults.
/// - Command-line flags override the file. Validation stays on only when
///   neither side disables it; the existence check is skipped as soon as
///   either side asks for it.
///
/// # Secrets
/// Never read from the YAML file:
/// - `PLATFORM_API_URL`: base URL of the platform API
/// - `PLATFORM_API_KEY`: read-only key for the analytics report
/// - `PLATFORM_ANALYTICS_PATH`: path of the analytics report holding the counter
/// - `PLATFORM_API_KEY_<INSTITUTION>_<ENV>`: write key, e.g. `PLATFORM_API_KEY_HPH_S`
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bib_ingest_core::allocator::{CallNumberFormat, RetryPolicy};
use bib_ingest_core::config::{PipelineConfig, ReportConfig};
use bib_ingest_core::creator::{HoldingConfig, ItemConfig};
use bib_ingest_core::harvest::HarvestMode;
use bib_ingest_core::mapper::MappingConfig;
use clap::ValueEnum;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::cli::IngestArgs;
use crate::export::{DateWindow, ExportQuery};

/// Target platform environment: sandbox or production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
pub enum Environment {
    #[value(name = "S")]
    S,
    #[value(name = "P")]
    P,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::S => "S",
            Environment::P => "P",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralSection {
    pub institution_code: String,
    pub env: Environment,
    pub dry_run: bool,
    pub validation: bool,
    pub skip_existence_check: bool,
    /// 0 means no limit.
    pub max_records: usize,
    pub call_number: CallNumberFormat,
    pub counter_retry: RetryPolicy,
    pub last_value_file: PathBuf,
    pub http_timeout_secs: u64,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            institution_code: "HPH".to_string(),
            env: Environment::S,
            dry_run: false,
            validation: true,
            skip_existence_check: false,
            max_records: 0,
            call_number: CallNumberFormat::default(),
            counter_retry: RetryPolicy::default(),
            last_value_file: PathBuf::from("last_call_number.txt"),
            http_timeout_secs: 60,
        }
    }
}

impl GeneralSection {
    pub fn trace_loaded(&self) {
        info!(
            institution_code = %self.institution_code,
            env = %self.env,
            dry_run = self.dry_run,
            validation = self.validation,
            skip_existence_check = self.skip_existence_check,
            max_records = self.max_records,
            "Loaded general section"
        );
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestSection {
    pub base_url: String,
    pub configuration: String,
    pub types: String,
    pub publisher: String,
    pub since: DateWindow,
    pub start_page: u32,
    pub page_size: u32,
    pub sort_field: String,
    pub sort_order: String,
    pub format: String,
    pub use_static_url: bool,
    pub static_url: String,
}

impl Default for HarvestSection {
    fn default() -> Self {
        Self {
            base_url: "https://infoscience.epfl.ch/server/api/discover/export".to_string(),
            configuration: "researchoutputs".to_string(),
            types: "thesis-coar-types:c_db06,authority".to_string(),
            publisher: "EPFL".to_string(),
            since: DateWindow::PreviousMonth,
            start_page: 1,
            page_size: 100,
            sort_field: "dc.date.accessioned".to_string(),
            sort_order: "DESC".to_string(),
            format: "xm".to_string(),
            use_static_url: false,
            static_url: "https://infoscience.epfl.ch/server/api/discover/export?spc.page=1\
                &query=Applications%20of%20Data-driven%20Predictive%20Control%20to%20Building%20Energy%20Systems\
                &configuration=researchoutputs&scope=4af344ef-0fb2-4593-a234-78d57f3df621\
                &f.types=thesis-coar-types:c_db06,authority&f.dateIssued.min=2025\
                &f.author_editor=koch,%20manuel%20pascal,equals&of=xm"
                .to_string(),
        }
    }
}

impl HarvestSection {
    pub fn trace_loaded(&self) {
        info!(
            base_url = %self.base_url,
            publisher = %self.publisher,
            since = %self.since,
            start_page = self.start_page,
            page_size = self.page_size,
            use_static_url = self.use_static_url,
            "Loaded harvest section"
        );
    }

    pub fn export_query(&self, today: chrono::NaiveDate) -> ExportQuery {
        ExportQuery {
            base_url: self.base_url.clone(),
            configuration: self.configuration.clone(),
            types: self.types.clone(),
            publisher: self.publisher.clone(),
            window_start: self.since.start(today),
            sort_field: self.sort_field.clone(),
            sort_order: self.sort_order.clone(),
            format: self.format.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesSection {
    pub sru_base_url: String,
    /// Joined with the institution code into the last path segment,
    /// e.g. `41SLSP_HPH`.
    pub sru_institution_prefix: String,
    /// Replaces the whole last path segment when set.
    pub sru_institution: Option<String>,
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            sru_base_url: "https://swisscovery.ch/view/sru".to_string(),
            sru_institution_prefix: "41SLSP_".to_string(),
            sru_institution: None,
        }
    }
}

impl ServicesSection {
    /// SRU endpoint of `institution_code`'s view of the union catalog.
    pub fn sru_endpoint(&self, institution_code: &str) -> String {
        let segment = match &self.sru_institution {
            Some(segment) => segment.clone(),
            None => format!(
                "{}{}",
                self.sru_institution_prefix,
                institution_code.to_uppercase()
            ),
        };
        format!("{}/{}", self.sru_base_url.trim_end_matches('/'), segment)
    }
}

/// The YAML file as written by the operator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub general: GeneralSection,
    pub harvest: HarvestSection,
    pub mapping: MappingConfig,
    pub holding: HoldingConfig,
    pub item: ItemConfig,
    pub services: ServicesSection,
    pub report: ReportConfig,
}

/// Credentials read from the environment.
#[derive(Clone)]
pub struct Secrets {
    pub api_url: String,
    pub analytics_api_key: String,
    pub analytics_path: String,
    pub write_api_key: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("api_url", &self.api_url)
            .field("analytics_path", &self.analytics_path)
            .finish_non_exhaustive()
    }
}

pub fn write_key_var(institution_code: &str, env: Environment) -> String {
    format!(
        "PLATFORM_API_KEY_{}_{}",
        institution_code.to_uppercase(),
        env
    )
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => {
            error!(var = name, "Missing environment variable");
            Err(anyhow::anyhow!("environment variable {name} is not set"))
        }
    }
}

impl Secrets {
    pub fn from_env(institution_code: &str, env: Environment) -> Result<Self> {
        let secrets = Secrets {
            api_url: require_env("PLATFORM_API_URL")?,
            analytics_api_key: require_env("PLATFORM_API_KEY")?,
            analytics_path: require_env("PLATFORM_ANALYTICS_PATH")?,
            write_api_key: require_env(&write_key_var(institution_code, env))?,
        };
        info!(api_url = %secrets.api_url, "Loaded platform secrets from environment");
        Ok(secrets)
    }
}

/// Everything a run needs, after merging file, environment and flags.
#[derive(Debug)]
pub struct LoadedConfig {
    pub pipeline: PipelineConfig,
    pub harvest: HarvestSection,
    pub services: ServicesSection,
    /// Built from the effective institution code.
    pub sru_endpoint: String,
    pub report: ReportConfig,
    pub institution_code: String,
    pub env: Environment,
    pub http_timeout_secs: u64,
    pub secrets: Secrets,
}

/// Parse a YAML config file.
pub fn read_config_file<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref).with_context(|| {
        error!(config_path = ?path_ref, "Failed to read config file");
        format!("Failed to read config file {path_ref:?}")
    })?;

    let config: FileConfig = serde_yaml::from_str(&content).with_context(|| {
        error!(config_path = ?path_ref, "Failed to parse config YAML");
        format!("Failed to parse config YAML {path_ref:?}")
    })?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");
    Ok(config)
}

/// Apply command-line overrides to the file configuration.
pub fn apply_overrides(mut file: FileConfig, args: &IngestArgs) -> FileConfig {
    let general = &mut file.general;
    general.dry_run |= args.dry_run;
    general.validation &= !args.no_validation;
    general.skip_existence_check |= args.skip_existence_check;
    if let Some(max) = args.max_records {
        general.max_records = max;
    }
    if let Some(env) = args.env {
        general.env = env;
    }
    if let Some(code) = &args.institution_code {
        general.institution_code = code.clone();
    }

    let harvest = &mut file.harvest;
    harvest.use_static_url |= args.use_static_url;
    if let Some(page) = args.start_page {
        harvest.start_page = page;
    }
    if let Some(size) = args.page_size {
        harvest.page_size = size;
    }
    file
}

/// Core configuration of the run described by `file`.
pub fn pipeline_config(file: &FileConfig, run_date: chrono::NaiveDate) -> PipelineConfig {
    let general = &file.general;
    let harvest_mode = if file.harvest.use_static_url {
        HarvestMode::Fixed
    } else {
        HarvestMode::Paginated {
            start_page: file.harvest.start_page,
            page_size: file.harvest.page_size,
        }
    };
    PipelineConfig {
        dry_run: general.dry_run,
        validation: general.validation,
        existence_check: !general.skip_existence_check,
        harvest_mode,
        max_records: (general.max_records > 0).then_some(general.max_records),
        mapping: file.mapping.clone(),
        holdings: file.holding.clone(),
        items: file.item.clone(),
        counter_retry: general.counter_retry.clone(),
        call_number: general.call_number.clone(),
        last_value_file: (!general.last_value_file.as_os_str().is_empty())
            .then(|| general.last_value_file.clone()),
        run_date,
    }
}

/// Load file (if any), apply flags, read secrets.
pub fn load_config(args: &IngestArgs) -> Result<LoadedConfig> {
    let file = match &args.config {
        Some(path) => read_config_file(path)?,
        None => {
            info!("No config file given, using defaults");
            FileConfig::default()
        }
    };
    let file = apply_overrides(file, args);
    file.general.trace_loaded();
    file.harvest.trace_loaded();
    debug!(?file, "Config loaded (full debug)");

    if file.holding.locations.is_empty() {
        return Err(anyhow::anyhow!("holding.locations must name at least one location"));
    }
    if let Some(policy) = file.holding.locations.iter().find(|l| l.quantity == 0) {
        return Err(anyhow::anyhow!(
            "holding location {} has quantity 0; at least one item is required",
            policy.code
        ));
    }
    if file.harvest.page_size == 0 {
        return Err(anyhow::anyhow!("harvest.page_size must be at least 1"));
    }

    let secrets = Secrets::from_env(&file.general.institution_code, file.general.env)?;
    let pipeline = pipeline_config(&file, chrono::Local::now().date_naive());
    let sru_endpoint = file.services.sru_endpoint(&file.general.institution_code);
    info!(%sru_endpoint, "Union catalog endpoint");

    Ok(LoadedConfig {
        pipeline,
        institution_code: file.general.institution_code.clone(),
        env: file.general.env,
        http_timeout_secs: file.general.http_timeout_secs,
        harvest: file.harvest,
        services: file.services,
        sru_endpoint,
        report: file.report,
        secrets,
    })
}
