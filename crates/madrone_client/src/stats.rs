//! Collection statistics aggregation.
//!
//! Nodes report storage details in their own configured page size, so raw
//! page counts are not additive across a cluster. The builder rescales every
//! node's page counts to the smallest supported page-size unit while folding,
//! then re-normalizes the totals to the smallest page size actually seen.

use crate::error::{Error, Result};
use bson::{Bson, Document};
use madrone_driver::fields::{
    DETAILS, PAGE_SIZE, TOTAL_DATA_FREE_SPACE, TOTAL_DATA_PAGES, TOTAL_INDEX_PAGES, TOTAL_RECORDS,
};

/// Smallest supported page size; the unit page counts are folded in.
pub const PAGE_SIZE_MIN: i64 = 4096;

/// Largest supported page size; assumed for nodes that report none.
pub const PAGE_SIZE_MAX: i64 = 65536;

/// Aggregated storage statistics for one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionStatistics {
    /// Smallest page size reported by any contributing node, in bytes.
    pub page_size: i64,
    /// Data pages across all nodes, in `page_size` units.
    pub total_data_pages: i64,
    /// Index pages across all nodes, in `page_size` units.
    pub total_index_pages: i64,
    /// Free data space across all nodes, in bytes.
    pub total_data_free_space: i64,
    /// Records across all nodes.
    pub total_records: i64,
}

/// Incremental folder over per-node storage detail documents.
#[derive(Debug)]
pub struct StatisticsBuilder {
    page_size: i64,
    data_pages: i64,
    index_pages: i64,
    free_space: i64,
    records: i64,
}

impl StatisticsBuilder {
    /// Creates a builder with nothing folded in yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            page_size: PAGE_SIZE_MAX,
            data_pages: 0,
            index_pages: 0,
            free_space: 0,
            records: 0,
        }
    }

    /// Folds one node's detail document into the running totals.
    ///
    /// The node's page counts are rescaled to the minimum unit before
    /// accumulation; free space and record counts are additive as-is. A node
    /// reporting a zero or absent page size is assumed to use the maximum.
    ///
    /// # Errors
    ///
    /// `Internal` when the document carries no detail array whose first
    /// element is a document.
    pub fn absorb(&mut self, node: &Document) -> Result<()> {
        let detail = node
            .get(DETAILS)
            .and_then(Bson::as_array)
            .and_then(|details| details.first())
            .and_then(Bson::as_document)
            .ok_or_else(|| Error::internal("storage detail response carries no detail array"))?;

        let mut page_size = read_int(detail, PAGE_SIZE);
        if page_size == 0 {
            page_size = PAGE_SIZE_MAX;
        }
        if page_size < self.page_size {
            self.page_size = page_size;
        }
        let scale = (page_size / PAGE_SIZE_MIN).max(1);
        self.data_pages += read_int(detail, TOTAL_DATA_PAGES) * scale;
        self.index_pages += read_int(detail, TOTAL_INDEX_PAGES) * scale;
        self.free_space += read_int(detail, TOTAL_DATA_FREE_SPACE);
        self.records += read_int(detail, TOTAL_RECORDS);
        Ok(())
    }

    /// Re-normalizes the folded totals to the smallest page size seen and
    /// returns the aggregate.
    #[must_use]
    pub fn finish(self) -> CollectionStatistics {
        let unit = (self.page_size / PAGE_SIZE_MIN).max(1);
        CollectionStatistics {
            page_size: self.page_size,
            total_data_pages: self.data_pages / unit,
            total_index_pages: self.index_pages / unit,
            total_data_free_space: self.free_space,
            total_records: self.records,
        }
    }
}

impl Default for StatisticsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn read_int(document: &Document, key: &str) -> i64 {
    match document.get(key) {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(d)) => *d as i64,
        _ => 0,
    }
}
