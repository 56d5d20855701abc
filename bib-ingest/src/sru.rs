//! Existence check against the union catalog's SRU 1.2 endpoint.

use async_trait::async_trait;
use bib_ingest_core::contract::{CatalogLookup, CatalogRecordRef, LookupQuery};
use bib_ingest_core::error::ServiceError;
use bib_ingest_core::marc::{parse_embedded_records, MarcRecord, MarcXmlError};
use tracing::{debug, info};
use url::Url;

/// `title="<title>" AND creator="<author>"`, with CQL quote escaping.
pub fn cql_query(query: &LookupQuery) -> String {
    let quote = |s: &str| s.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "title=\"{}\" AND creator=\"{}\"",
        quote(&query.title),
        quote(&query.author)
    )
}

/// The first MARC record of a searchRetrieve response, if any.
pub fn parse_response(xml: &str) -> Result<Option<CatalogRecordRef>, MarcXmlError> {
    let records = parse_embedded_records(xml)?;
    Ok(records.first().map(describe))
}

fn describe(marc: &MarcRecord) -> CatalogRecordRef {
    let first = |candidates: &[(&str, char)]| {
        candidates
            .iter()
            .find_map(|(tag, code)| marc.subfield(tag, *code))
            .map(str::to_string)
    };
    CatalogRecordRef {
        external_id: marc.control_field("001").unwrap_or_default().trim().to_string(),
        title: first(&[("245", 'a')]),
        author: first(&[("100", 'a'), ("700", 'a')]),
        publisher: first(&[("260", 'b'), ("264", 'b')]),
        year: first(&[("260", 'c'), ("264", 'c')]),
    }
}

pub struct SruClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SruClient {
    /// `endpoint` is the full SRU URL, institution segment included.
    pub fn new(http: reqwest::Client, endpoint: String) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl CatalogLookup for SruClient {
    async fn lookup(&self, query: &LookupQuery) -> Result<Option<CatalogRecordRef>, ServiceError> {
        let cql = cql_query(query);
        let url = Url::parse_with_params(
            &self.endpoint,
            &[
                ("version", "1.2"),
                ("operation", "searchRetrieve"),
                ("query", cql.as_str()),
                ("maximumRecords", "1"),
            ],
        )?;
        debug!(%url, "SRU searchRetrieve");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP error: {}", status.as_u16()).into());
        }
        let body = response.text().await?;
        let found = parse_response(&body)?;
        if let Some(found) = &found {
            info!(source_id = %query.source_id, external_id = %found.external_id, "SRU match");
        }
        Ok(found)
    }
}
