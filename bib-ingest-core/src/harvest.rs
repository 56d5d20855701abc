//! Paginated harvesting of the repository export.
//!
//! Pages are fetched lazily, one at a time. The sequence ends the first time a
//! page comes back empty, or once `max_records` records have been yielded (the
//! surplus of the last page is discarded). A fetch failure ends the sequence
//! with a terminal [`HarvestError`]; nothing is retried here.

use futures::stream::{self, Stream};
use tracing::{info, warn};

use crate::contract::{PageRequest, PageSource};
use crate::error::HarvestError;
use crate::record::SourceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestMode {
    Paginated { start_page: u32, page_size: u32 },
    /// Debug mode: the fixed URL is the entire corpus.
    Fixed,
}

/// One fetched batch of records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPage {
    /// Page index that was requested (0 in fixed mode).
    pub page: u32,
    pub records: Vec<SourceRecord>,
}

pub struct Harvester<'a> {
    source: &'a dyn PageSource,
    mode: HarvestMode,
    next_page: u32,
    max_records: Option<usize>,
    yielded: usize,
    exhausted: bool,
}

impl<'a> Harvester<'a> {
    pub fn new(source: &'a dyn PageSource, mode: HarvestMode, max_records: Option<usize>) -> Self {
        let next_page = match mode {
            HarvestMode::Paginated { start_page, .. } => start_page,
            HarvestMode::Fixed => 0,
        };
        Self {
            source,
            mode,
            next_page,
            max_records,
            yielded: 0,
            exhausted: false,
        }
    }

    /// Fetch the next non-empty page, or `None` once harvesting is over.
    pub async fn next_page(&mut self) -> Result<Option<RecordPage>, HarvestError> {
        if self.exhausted {
            return Ok(None);
        }
        if let Some(max) = self.max_records {
            if self.yielded >= max {
                info!(max_records = max, "[HARVEST] Record limit reached, harvesting stops");
                self.exhausted = true;
                return Ok(None);
            }
        }

        let page = self.next_page;
        let request = match self.mode {
            HarvestMode::Paginated { page_size, .. } => PageRequest::Paged {
                page,
                size: page_size,
            },
            HarvestMode::Fixed => PageRequest::Fixed,
        };
        info!(page, ?request, "[HARVEST] Fetching harvest page");

        let mut records = self
            .source
            .fetch_page(&request)
            .await
            .map_err(|source| HarvestError::Fetch { page, source })?;

        if records.is_empty() {
            info!(page, "[HARVEST] Empty page, harvest exhausted");
            self.exhausted = true;
            return Ok(None);
        }
        info!(page, count = records.len(), "[HARVEST] Harvest page received");

        match self.mode {
            HarvestMode::Paginated { .. } => self.next_page += 1,
            HarvestMode::Fixed => self.exhausted = true,
        }

        if let Some(max) = self.max_records {
            let remaining = max - self.yielded;
            if records.len() > remaining {
                warn!(
                    page,
                    discarded = records.len() - remaining,
                    max_records = max,
                    "[HARVEST] Discarding records beyond the limit"
                );
                records.truncate(remaining);
            }
        }
        self.yielded += records.len();

        Ok(Some(RecordPage { page, records }))
    }

    pub fn records_yielded(&self) -> usize {
        self.yielded
    }
}

/// Lazy sequence of harvested pages.
pub fn produce_pages<'a>(
    source: &'a dyn PageSource,
    mode: HarvestMode,
    max_records: Option<usize>,
) -> impl Stream<Item = Result<RecordPage, HarvestError>> + 'a {
    stream::try_unfold(
        Harvester::new(source, mode, max_records),
        |mut harvester| async move {
            let page = harvester.next_page().await?;
            Ok(page.map(|page| (page, harvester)))
        },
    )
}
