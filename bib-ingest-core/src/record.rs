//! The record types a harvested record passes through:
//! [`SourceRecord`] → [`NormalizedRecord`] → [`MappedRecord`].

use crate::marc::MarcRecord;

/// A record exactly as harvested from the repository export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    marc: MarcRecord,
}

impl SourceRecord {
    pub fn new(marc: MarcRecord) -> Self {
        Self { marc }
    }

    pub fn marc(&self) -> &MarcRecord {
        &self.marc
    }

    /// Repository identifier (`001`).
    pub fn identifier(&self) -> Option<&str> {
        self.marc.control_field("001")
    }

    pub(crate) fn into_marc(self) -> MarcRecord {
        self.marc
    }
}

impl From<MarcRecord> for SourceRecord {
    fn from(marc: MarcRecord) -> Self {
        Self::new(marc)
    }
}

/// A source record whose title statement (`245$a`, `$b`, `$c`) is free of
/// markup and HTML entities. Only [`crate::normalize::normalize_record`] builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    marc: MarcRecord,
}

impl NormalizedRecord {
    pub(crate) fn from_clean(marc: MarcRecord) -> Self {
        Self { marc }
    }

    pub fn marc(&self) -> &MarcRecord {
        &self.marc
    }

    pub fn identifier(&self) -> Option<&str> {
        self.marc.control_field("001")
    }
}

/// Descriptive fields shown in the report and used for the existence check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub title: Option<String>,
    pub author: Option<String>,
    pub responsibility: Option<String>,
}

/// The target bibliographic record built from a normalized source record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRecord {
    pub source_id: String,
    pub record: MarcRecord,
    pub summary: RecordSummary,
}
