//! Reads the last issued call number from the platform's analytics report.
//! The value is `Column3` of the first `Row` in the report's rowset.

use async_trait::async_trait;
use bib_ingest_core::contract::CounterSource;
use bib_ingest_core::error::ServiceError;
use reqwest::header::AUTHORIZATION;
use tracing::debug;

use crate::xml::first_text_in;

pub fn parse_last_issued(xml: &str) -> Result<u64, ServiceError> {
    let value = first_text_in(xml, "Row", "Column3")?
        .ok_or("no Row/Column3 in the analytics response")?;
    let value = value.trim();
    value
        .parse::<u64>()
        .map_err(|_| format!("Column3 is not a number: {value:?}").into())
}

pub struct AnalyticsClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl AnalyticsClient {
    pub fn new(http: reqwest::Client, api_url: &str, analytics_path: &str, api_key: String) -> Self {
        Self {
            http,
            url: format!("{}{}", api_url.trim_end_matches('/'), analytics_path),
            api_key,
        }
    }
}

#[async_trait]
impl CounterSource for AnalyticsClient {
    async fn fetch_last_issued(&self) -> Result<u64, ServiceError> {
        debug!(url = %self.url, "Fetching analytics report");
        let response = self
            .http
            .get(&self.url)
            .header(AUTHORIZATION, format!("apikey {}", self.api_key))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("analytics API returned HTTP {}", status.as_u16()).into());
        }
        parse_last_issued(&response.text().await?)
    }
}
