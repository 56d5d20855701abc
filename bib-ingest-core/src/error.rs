//! Error types shared by the pipeline components.
//!
//! Capability traits (see [`crate::contract`]) return the boxed [`ServiceError`];
//! the components translate those into the typed errors below. Only
//! [`PipelineError`] ever leaves the orchestrator.

use thiserror::Error;

/// Error returned by every capability adapter (HTTP client, mock, etc).
pub type ServiceError = Box<dyn std::error::Error + Send + Sync>;

/// Terminal failure while fetching a harvest page.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("failed to fetch harvest page {page}: {source}")]
    Fetch {
        page: u32,
        #[source]
        source: ServiceError,
    },
}

/// A source record could not be turned into a target bibliographic record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("required field {0} is missing")]
    MissingField(&'static str),
    #[error("field {field} is malformed: {reason}")]
    Malformed { field: &'static str, reason: String },
}

/// The counter source could not be read at startup.
#[derive(Debug, Error)]
#[error("call-number counter unavailable after {attempts} attempt(s): {last_error}")]
pub struct AllocatorUnavailable {
    pub attempts: u32,
    pub last_error: String,
}

/// The counter has no next value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("call-number counter exhausted at {last_issued}")]
pub struct CounterExhausted {
    pub last_issued: u64,
}

/// Failure while writing the report file.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors that abort the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Allocator(#[from] AllocatorUnavailable),
    #[error(transparent)]
    Harvest(#[from] HarvestError),
}
