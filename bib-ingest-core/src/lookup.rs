//! Existence check against the union catalog.
//!
//! Policy: a disabled check and a failed query both answer
//! [`CatalogMatch::NotFound`] so the record proceeds to creation, but each
//! leaves a distinct [`MatchStatus`] and a warning for the report.
//! Failing open can create duplicates when the catalog is flaky.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::contract::{CatalogLookup, CatalogRecordRef, LookupQuery};
use crate::record::MappedRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogMatch {
    NotFound,
    Found(CatalogRecordRef),
}

/// How the match decision was reached, as shown in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    NotFound,
    Found,
    CheckSkipped,
    CheckFailed,
    /// The record never reached the check (e.g. mapping failed).
    NotChecked,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchStatus::NotFound => "NOT_FOUND",
            MatchStatus::Found => "FOUND",
            MatchStatus::CheckSkipped => "CHECK_SKIPPED",
            MatchStatus::CheckFailed => "CHECK_FAILED",
            MatchStatus::NotChecked => "NOT_CHECKED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupOutcome {
    pub catalog_match: CatalogMatch,
    pub status: MatchStatus,
    pub warning: Option<String>,
}

pub struct ExistenceChecker<'a> {
    catalog: Option<&'a dyn CatalogLookup>,
}

impl<'a> ExistenceChecker<'a> {
    /// `None` disables the check.
    pub fn new(catalog: Option<&'a dyn CatalogLookup>) -> Self {
        Self { catalog }
    }

    pub fn is_enabled(&self) -> bool {
        self.catalog.is_some()
    }

    pub async fn lookup(&self, record: &MappedRecord) -> LookupOutcome {
        let Some(catalog) = self.catalog else {
            info!(source_id = %record.source_id, "[LOOKUP] Existence check disabled, treating as not found");
            return LookupOutcome {
                catalog_match: CatalogMatch::NotFound,
                status: MatchStatus::CheckSkipped,
                warning: Some("existence check skipped by configuration".to_string()),
            };
        };

        let query = LookupQuery {
            source_id: record.source_id.clone(),
            title: record.summary.title.clone().unwrap_or_default(),
            author: record.summary.author.clone().unwrap_or_default(),
        };
        info!(source_id = %query.source_id, title = %query.title, author = %query.author, "[LOOKUP] Looking up record in union catalog");

        match catalog.lookup(&query).await {
            Ok(None) => LookupOutcome {
                catalog_match: CatalogMatch::NotFound,
                status: MatchStatus::NotFound,
                warning: None,
            },
            Ok(Some(found)) => {
                info!(
                    source_id = %query.source_id,
                    external_id = %found.external_id,
                    title = found.title.as_deref().unwrap_or(""),
                    author = found.author.as_deref().unwrap_or(""),
                    publisher = found.publisher.as_deref().unwrap_or(""),
                    year = found.year.as_deref().unwrap_or(""),
                    "[LOOKUP] Record already present in union catalog"
                );
                let warning = format!(
                    "already in union catalog as {}; creation skipped",
                    found.external_id
                );
                LookupOutcome {
                    catalog_match: CatalogMatch::Found(found),
                    status: MatchStatus::Found,
                    warning: Some(warning),
                }
            }
            Err(e) => {
                warn!(source_id = %query.source_id, error = %e, "[LOOKUP] Existence check failed, proceeding to creation");
                LookupOutcome {
                    catalog_match: CatalogMatch::NotFound,
                    status: MatchStatus::CheckFailed,
                    warning: Some(format!("existence check failed ({e}); record created anyway")),
                }
            }
        }
    }
}
