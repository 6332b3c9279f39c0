//! Pagination module
//!
//! Drains an itembase collection page by page into an [`Accumulator`].
//!
//! # Overview
//!
//! The API only offers two continuation keys: a position offset
//! (`start_at_document`) and creation-time filters. Neither guarantees
//! exactly-once delivery while the collection changes underneath, so the
//! driver stops early on anything that looks like a loop and reports why
//! through [`DrainOutcome`].

mod driver;
mod types;

pub use driver::{drain_all, CollectionFetcher, PageFetcher};
pub use types::{
    Accumulator, Anomaly, DocumentCollector, DrainOutcome, DrainReport, Page, PaginationCursor,
    Timestamped,
};
