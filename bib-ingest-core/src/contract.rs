//! # contract: capability interfaces for every external collaborator
//!
//! The pipeline never talks HTTP itself. Each external system is reached through
//! one of the traits below, implemented once by the production client in the
//! `bib-ingest` crate and by `mockall` mocks in tests:
//!
//! - [`PageSource`]: paginated export of the institutional repository (harvest)
//! - [`CatalogLookup`]: the union catalog used for the existence check
//! - [`CounterSource`]: the analytics report holding the last issued call number
//! - [`Platform`]: bib / holding / item creation in the library services platform
//!
//! ## Mocking
//! The traits are annotated with `automock` when the `test-export-mocks` feature
//! is enabled (default), so dependent crates get `MockPageSource`,
//! `MockCatalogLookup`, `MockCounterSource` and `MockPlatform`.
//!
//! ## Errors
//! All methods return the boxed [`ServiceError`]; adapters convert transport,
//! status and parse failures into it.

#![allow(unused)]

use async_trait::async_trait;
use chrono::NaiveDate;
use mockall::{automock, predicate::*};
use serde::Serialize;

use crate::error::ServiceError;
use crate::marc::MarcRecord;
use crate::record::SourceRecord;

/// Which page the harvester wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    /// One page of the paginated export query.
    Paged { page: u32, size: u32 },
    /// The single fixed debug URL; fetched once.
    Fixed,
}

/// Paginated retrieval of source records.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one page. An empty vector means the export is exhausted.
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<SourceRecord>, ServiceError>;
}

/// Descriptive fields sent to the union catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupQuery {
    pub source_id: String,
    pub title: String,
    pub author: String,
}

/// A record already present in the union catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRecordRef {
    /// The catalog's identifier for the record (its `001`).
    pub external_id: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<String>,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// `Ok(None)` when no candidate matches.
    async fn lookup(&self, query: &LookupQuery) -> Result<Option<CatalogRecordRef>, ServiceError>;
}

/// Authoritative source of the last issued call-number value.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CounterSource: Send + Sync {
    async fn fetch_last_issued(&self) -> Result<u64, ServiceError>;
}

/// Body of a bibliographic record creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibRequest {
    pub record: MarcRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedBib {
    pub bib_id: String,
}

/// Body of a holding creation under an existing bib.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldingRequest {
    pub bib_id: String,
    pub library: String,
    pub location: String,
    /// MARC holding record carrying the `852`.
    pub record: MarcRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedHolding {
    pub holding_id: String,
}

/// `item_data` of an item creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemData {
    pub base_status: String,
    pub physical_material_type: String,
    pub policy: String,
    pub po_line: Option<String>,
    pub arrival_date: NaiveDate,
    pub library: String,
    pub location: String,
    /// When set, the item is put on a work order for this department.
    pub work_order_department: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemRequest {
    pub bib_id: String,
    pub holding_id: String,
    pub item: ItemData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedItem {
    pub item_id: String,
    /// Fields that were sent but not echoed back by the platform.
    pub ignored_fields: Vec<String>,
}

/// Creation operations of the target platform.
///
/// Implementors issue exactly one mutating request per call; retries, if any,
/// are the implementor's business.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    async fn create_bib(&self, req: &BibRequest) -> Result<CreatedBib, ServiceError>;

    async fn create_holding(&self, req: &HoldingRequest) -> Result<CreatedHolding, ServiceError>;

    async fn create_item(&self, req: &ItemRequest) -> Result<CreatedItem, ServiceError>;
}
