//! # bib-ingest CLI interface
//!
//! Command parsing and run orchestration for the `bib-ingest` binary. Every
//! pipeline stage lives in [`bib_ingest_core`]; this module only turns flags
//! and configuration into concrete HTTP adapters and hands them to
//! [`bib_ingest_core::pipeline::run`].
//!
//! The CSV report is written whether or not the run aborts, so partial
//! progress is never lost. A run-level failure still makes the process exit
//! non-zero.
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bib_ingest_core::pipeline::{self, Services};
use bib_ingest_core::report::Report;
use bib_ingest_core::validate::StructuralValidator;
use clap::{Args, Parser, Subcommand};

use crate::analytics::AnalyticsClient;
use crate::export::ExportClient;
use crate::load_config::{load_config, Environment};
use crate::platform::PlatformClient;
use crate::sru::SruClient;

/// Ingest repository theses into the library services platform.
#[derive(Parser)]
#[clap(
    name = "bib-ingest",
    version,
    about = "Harvest theses from the institutional repository and create bib, holding and item records"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the harvest → create pipeline and write the CSV report
    Ingest(IngestArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct IngestArgs {
    /// Path to the YAML config file; defaults apply when omitted
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// Simulate creation: no call numbers, no platform writes
    #[clap(long)]
    pub dry_run: bool,
    /// Harvest the single fixed export URL instead of paginating
    #[clap(long)]
    pub use_static_url: bool,
    #[clap(long)]
    pub start_page: Option<u32>,
    #[clap(long)]
    pub page_size: Option<u32>,
    /// Platform environment (S = sandbox, P = production)
    #[clap(long, value_enum)]
    pub env: Option<Environment>,
    #[clap(long)]
    pub institution_code: Option<String>,
    /// Skip structural validation of source, bib, holding and item payloads
    #[clap(long)]
    pub no_validation: bool,
    /// Do not query the union catalog before creating
    #[clap(long)]
    pub skip_existence_check: bool,
    /// Stop after this many harvested records (0 = no limit)
    #[clap(long)]
    pub max_records: Option<usize>,
}

/// Async entrypoint shared by `main` and the integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Ingest(args) => ingest(&args).await,
    }
}

async fn ingest(args: &IngestArgs) -> Result<()> {
    let config = load_config(args)?;
    config.report.trace_loaded();
    config.pipeline.trace_loaded();
    tracing::info!(
        command = "ingest",
        institution = %config.institution_code,
        env = %config.env,
        "Starting ingestion"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let query = config.harvest.export_query(config.pipeline.run_date);
    let pages = ExportClient::new(http.clone(), query, config.harvest.static_url.clone());
    let catalog = SruClient::new(http.clone(), config.sru_endpoint.clone());
    let counter = AnalyticsClient::new(
        http.clone(),
        &config.secrets.api_url,
        &config.secrets.analytics_path,
        config.secrets.analytics_api_key.clone(),
    );
    let platform = PlatformClient::new(
        http,
        &config.secrets.api_url,
        config.secrets.write_api_key.clone(),
    );
    let validator = StructuralValidator;
    let services = Services {
        pages: &pages,
        catalog: &catalog,
        counter: &counter,
        platform: &platform,
        validator: &validator,
    };

    let mut report = Report::new();
    let outcome = pipeline::run(&config.pipeline, &services, &mut report).await;

    let written = report.write_csv(
        &config.report.dir,
        &config.report.prefix,
        config.pipeline.run_date,
    );
    if let Err(e) = &written {
        tracing::error!(command = "ingest", error = %e, "Failed to write report");
    }

    match outcome {
        Ok(summary) => {
            tracing::info!(command = "ingest", records = summary.records, "Ingestion complete");
            written.context("Failed to write report")?;
            Ok(())
        }
        Err(e) => {
            tracing::error!(command = "ingest", error = %e, "Ingestion aborted");
            Err(anyhow::Error::new(e).context("Ingestion aborted"))
        }
    }
}
