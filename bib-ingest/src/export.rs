//! Client for the institutional repository's discover/export endpoint.
//!
//! Each page is a MARCXML `<collection>`. The query is restricted to one
//! publisher and, depending on [`DateWindow`], to records created on or after a
//! start date.

use std::fmt;

use async_trait::async_trait;
use bib_ingest_core::contract::{PageRequest, PageSource};
use bib_ingest_core::error::ServiceError;
use bib_ingest_core::marc::parse_collection;
use bib_ingest_core::record::SourceRecord;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

/// Which `dc.date.created` values are harvested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum DateWindow {
    /// From the first day of the month before the run date.
    PreviousMonth,
    Since(NaiveDate),
    All,
}

impl DateWindow {
    pub fn start(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            DateWindow::PreviousMonth => Some(first_day_of_previous_month(today)),
            DateWindow::Since(date) => Some(*date),
            DateWindow::All => None,
        }
    }
}

impl TryFrom<String> for DateWindow {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim();
        match value {
            "previous_month" => Ok(DateWindow::PreviousMonth),
            "all" => Ok(DateWindow::All),
            _ => {
                let date = value.strip_prefix("since:").ok_or_else(|| {
                    format!("unknown date window {value:?}: expected previous_month, all or since:YYYY-MM-DD")
                })?;
                NaiveDate::parse_from_str(date, "%Y-%m-%d")
                    .map(DateWindow::Since)
                    .map_err(|e| format!("invalid date in {value:?}: {e}"))
            }
        }
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateWindow::PreviousMonth => f.write_str("previous_month"),
            DateWindow::Since(date) => write!(f, "since:{}", date.format("%Y-%m-%d")),
            DateWindow::All => f.write_str("all"),
        }
    }
}

pub fn first_day_of_previous_month(today: NaiveDate) -> NaiveDate {
    let (year, month) = if today.month() == 1 {
        (today.year() - 1, 12)
    } else {
        (today.year(), today.month() - 1)
    };
    // Day 1 exists in every month.
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(today)
}

/// Query parameters of the paginated export.
#[derive(Debug, Clone)]
pub struct ExportQuery {
    pub base_url: String,
    pub configuration: String,
    pub types: String,
    pub publisher: String,
    pub window_start: Option<NaiveDate>,
    pub sort_field: String,
    pub sort_order: String,
    pub format: String,
}

impl ExportQuery {
    pub fn query(&self) -> String {
        match self.window_start {
            Some(start) => format!(
                "dc.publisher:{} dc.date.created:[{} TO *]",
                self.publisher,
                start.format("%Y-%m-%d")
            ),
            None => format!("dc.publisher:{}", self.publisher),
        }
    }

    pub fn page_url(&self, page: u32, size: u32) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &self.base_url,
            &[
                ("configuration", self.configuration.clone()),
                ("spc.page", page.to_string()),
                ("spc.rpp", size.to_string()),
                ("f.types", self.types.clone()),
                ("query", self.query()),
                ("spc.sf", self.sort_field.clone()),
                ("spc.sd", self.sort_order.clone()),
                ("of", self.format.clone()),
            ],
        )
    }
}

pub struct ExportClient {
    http: reqwest::Client,
    query: ExportQuery,
    static_url: String,
}

impl ExportClient {
    pub fn new(http: reqwest::Client, query: ExportQuery, static_url: String) -> Self {
        Self {
            http,
            query,
            static_url,
        }
    }
}

#[async_trait]
impl PageSource for ExportClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<SourceRecord>, ServiceError> {
        let url = match request {
            PageRequest::Paged { page, size } => self.query.page_url(*page, *size)?,
            PageRequest::Fixed => Url::parse(&self.static_url)?,
        };
        info!(%url, "Downloading export page");

        let body = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!(bytes = body.len(), "Export page downloaded");

        let records = parse_collection(&body)?;
        Ok(records.into_iter().map(SourceRecord::new).collect())
    }
}
