//! Top-level orchestration: harvest → normalize → map → check → allocate →
//! create → report, one record at a time in harvest order.
//!
//! # Run-level failures
//! Only two things abort a run, both surfaced as [`PipelineError`]:
//! - the call-number counter cannot be read at startup (nothing is harvested)
//! - a harvest page cannot be fetched or parsed
//!
//! Everything else (mapping, validation, creation errors) ends up in the
//! record's [`ReportRow`] and the run carries on with the next record. Rows
//! produced before an abort stay in the caller's [`Report`], so the caller can
//! still write them out.
//!
//! # Call numbers
//! A number is allocated exactly once per record that reaches creation: never
//! for a catalog match, never in dry-run, never for a record rejected before
//! creation. It is not given back if creation later fails. Once the counter
//! is exhausted, records that reach creation fail without one.

use futures::TryStreamExt;
use tracing::{error, info, warn};

use crate::allocator::CallNumberAllocator;
use crate::config::PipelineConfig;
use crate::contract::{CatalogLookup, CounterSource, PageSource, Platform};
use crate::creator::{CreationOutcome, ResourceCreator, ResourceStatus};
use crate::error::{HarvestError, PipelineError};
use crate::harvest::produce_pages;
use crate::lookup::{CatalogMatch, ExistenceChecker, MatchStatus};
use crate::mapper::{map, summarize};
use crate::normalize::normalize_record;
use crate::record::{RecordSummary, SourceRecord};
use crate::report::{RecordStatus, Report, ReportRow, RunSummary};
use crate::validate::SchemaValidator;

/// The external collaborators of a run.
pub struct Services<'a> {
    pub pages: &'a dyn PageSource,
    pub catalog: &'a dyn CatalogLookup,
    pub counter: &'a dyn CounterSource,
    pub platform: &'a dyn Platform,
    pub validator: &'a dyn SchemaValidator,
}

struct RecordStage<'a> {
    config: &'a PipelineConfig,
    validator: Option<&'a dyn SchemaValidator>,
    checker: ExistenceChecker<'a>,
    creator: ResourceCreator<'a>,
}

/// Run the whole pipeline, appending one row per harvested record to `report`.
pub async fn run(
    config: &PipelineConfig,
    services: &Services<'_>,
    report: &mut Report,
) -> Result<RunSummary, PipelineError> {
    info!(dry_run = config.dry_run, "[PIPELINE] Starting run");

    let mut allocator = match CallNumberAllocator::start(
        services.counter,
        &config.counter_retry,
        config.call_number.clone(),
        config.last_value_file.clone(),
    )
    .await
    {
        Ok(allocator) => allocator,
        Err(e) => {
            error!(error = %e, "[PIPELINE][ERROR] Call-number counter unavailable, aborting before harvest");
            return Err(e.into());
        }
    };

    let validator = config.validation.then_some(services.validator);
    if validator.is_none() {
        warn!("[PIPELINE] Schema validation disabled");
    }
    let stage = RecordStage {
        config,
        validator,
        checker: ExistenceChecker::new(config.existence_check.then_some(services.catalog)),
        creator: ResourceCreator::new(
            services.platform,
            validator,
            &config.holdings,
            &config.items,
            config.run_date,
        ),
    };

    let harvested = harvest_and_process(&stage, services.pages, &mut allocator, report).await;
    report.set_call_numbers_allocated(allocator.issued_count());

    if let Err(e) = harvested {
        error!(error = %e, records = report.rows().len(), "[PIPELINE][ERROR] Harvest failed, aborting run");
        return Err(e.into());
    }

    let summary = report.summary();
    summary.trace();
    Ok(summary)
}

async fn harvest_and_process(
    stage: &RecordStage<'_>,
    pages: &dyn PageSource,
    allocator: &mut CallNumberAllocator,
    report: &mut Report,
) -> Result<(), HarvestError> {
    let config = stage.config;
    let pages = produce_pages(pages, config.harvest_mode, config.max_records);
    futures::pin_mut!(pages);

    let mut record_index = 0;
    while let Some(page) = pages.try_next().await? {
        report.page_fetched();
        info!(page = page.page, records = page.records.len(), "[PIPELINE] Processing page");
        for source in page.records {
            record_index += 1;
            let row = stage.process(record_index, source, allocator).await;
            info!(
                record_index,
                source_id = row.source_id.as_deref().unwrap_or(""),
                record_status = %row.record_status,
                call_number = row.call_number.as_ref().map(|c| c.as_str()).unwrap_or("N/A"),
                "[PIPELINE] Record reported"
            );
            report.push(row);
        }
    }
    Ok(())
}

impl RecordStage<'_> {
    fn rejected(
        &self,
        record_index: usize,
        source_id: Option<String>,
        summary: RecordSummary,
        reason: String,
    ) -> ReportRow {
        error!(record_index, source_id = source_id.as_deref().unwrap_or(""), %reason, "[PIPELINE][ERROR] Record rejected");
        let mut warnings = Vec::new();
        if self.validator.is_none() {
            warnings.push("schema validation disabled".to_string());
        }
        ReportRow {
            record_index,
            source_id,
            title: summary.title,
            author: summary.author,
            call_number: None,
            match_status: MatchStatus::NotChecked,
            match_id: None,
            record_status: RecordStatus::Failed,
            outcome: CreationOutcome::rejected(ResourceStatus::Invalid, reason.clone()),
            warnings,
            errors: vec![reason],
        }
    }

    async fn process(
        &self,
        record_index: usize,
        source: SourceRecord,
        allocator: &mut CallNumberAllocator,
    ) -> ReportRow {
        let source_id = source.identifier().map(str::to_string);
        info!(record_index, source_id = source_id.as_deref().unwrap_or(""), "[PIPELINE] Processing record");

        if let Some(Err(problems)) = self.validator.map(|v| v.validate_source(source.marc())) {
            let reason = format!("invalid source record: {}", problems.join("; "));
            return self.rejected(record_index, source_id, summarize(source.marc()), reason);
        }

        let normalized = normalize_record(source);
        let mapped = match map(&normalized, &self.config.mapping) {
            Ok(mapped) => mapped,
            Err(e) => {
                let reason = format!("mapping failed: {e}");
                return self.rejected(record_index, source_id, summarize(normalized.marc()), reason);
            }
        };

        if let Some(Err(problems)) = self.validator.map(|v| v.validate_bib(&mapped.record)) {
            let reason = format!("invalid bib record: {}", problems.join("; "));
            return self.rejected(record_index, source_id, mapped.summary, reason);
        }

        let mut warnings = Vec::new();
        if self.validator.is_none() {
            warnings.push("schema validation disabled".to_string());
        }

        let lookup = self.checker.lookup(&mapped).await;
        warnings.extend(lookup.warning);

        let mut row = ReportRow {
            record_index,
            source_id: Some(mapped.source_id.clone()),
            title: mapped.summary.title.clone(),
            author: mapped.summary.author.clone(),
            call_number: None,
            match_status: lookup.status,
            match_id: None,
            record_status: RecordStatus::SkippedMatch,
            outcome: CreationOutcome::not_attempted(),
            warnings,
            errors: Vec::new(),
        };

        if let CatalogMatch::Found(existing) = lookup.catalog_match {
            info!(record_index, external_id = %existing.external_id, "[PIPELINE] Skipping creation, record already in union catalog");
            row.match_id = Some(existing.external_id);
            return row;
        }

        let outcome = if self.config.dry_run {
            self.creator.simulate(&mapped)
        } else {
            match allocator.next() {
                Ok(call_number) => {
                    let outcome = self.creator.create(&mapped, &call_number).await;
                    row.call_number = Some(call_number);
                    outcome
                }
                Err(e) => {
                    error!(record_index, error = %e, "[PIPELINE][ERROR] No call number available");
                    CreationOutcome::rejected(ResourceStatus::NotAttempted, e.to_string())
                }
            }
        };

        row.record_status = RecordStatus::of(&outcome);
        row.errors.extend(outcome.bib_error.clone());
        row.warnings.extend(outcome.warnings.iter().cloned());
        row.outcome = outcome;
        row
    }
}
