//! Pagination types and traits
//!
//! Page envelope, cursor state, drain outcomes and the accumulator seam.

use crate::error::{Error, Result};
use crate::types::{parse_timestamp, JsonValue, StringMap, CREATED_AT_FROM, START_AT_DOCUMENT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Page
// ============================================================================

/// One page of a collection, as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T = JsonValue> {
    /// Documents in server order
    #[serde(default = "Vec::new")]
    pub documents: Vec<T>,

    /// Documents matching the query across all pages
    #[serde(default, deserialize_with = "deserialize_count")]
    pub num_documents_found: u64,

    /// Documents in this page
    #[serde(default, deserialize_with = "deserialize_count")]
    pub num_documents_returned: u64,
}

/// Counts arrive as JSON numbers that may carry a fraction (`5.0`)
fn deserialize_count<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value.is_finite() && value >= 0.0 {
        Ok(value as u64)
    } else {
        Err(serde::de::Error::custom(format!("invalid document count {value}")))
    }
}

impl<T> Page<T> {
    /// Build a page whose returned count matches its documents
    pub fn new(documents: Vec<T>, num_documents_found: u64) -> Self {
        let returned = documents.len() as u64;
        Self {
            documents,
            num_documents_found,
            num_documents_returned: returned,
        }
    }

    /// Check the envelope's counts against its documents
    pub fn validate(&self) -> Result<()> {
        let len = self.documents.len() as u64;
        if self.num_documents_returned != len {
            return Err(Error::decode(format!(
                "Page reports {} documents returned but carries {len}",
                self.num_documents_returned
            )));
        }
        if self.num_documents_found < self.num_documents_returned {
            return Err(Error::decode(format!(
                "Page reports {} documents found but returned {}",
                self.num_documents_found, self.num_documents_returned
            )));
        }
        Ok(())
    }

    /// True when this single page holds the whole result set
    pub fn is_complete(&self) -> bool {
        self.num_documents_found == self.num_documents_returned
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// Position and filter state for one drain.
///
/// Never mutated in place: [`advance`](Self::advance) returns the next cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    base_offset: u64,
    received: u64,
    params: StringMap,
    max_allowed: Option<u64>,
}

impl PaginationCursor {
    /// Cursor for the first page.
    ///
    /// A `start_at_document` already in `params` is where the drain begins;
    /// later pages are requested relative to it.
    pub fn new(params: StringMap, max_allowed: Option<u64>) -> Self {
        let base_offset = params
            .get(START_AT_DOCUMENT)
            .and_then(|offset| offset.parse().ok())
            .unwrap_or(0);
        Self {
            base_offset,
            received: 0,
            params,
            max_allowed,
        }
    }

    /// Documents delivered by the server so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Offset in the collection after the documents received so far
    pub fn position(&self) -> u64 {
        self.base_offset + self.received
    }

    /// Query parameters for the next request
    pub fn params(&self) -> &StringMap {
        &self.params
    }

    /// Optional cap on accumulated documents
    pub fn max_allowed(&self) -> Option<u64> {
        self.max_allowed
    }

    /// The creation-time lower bound in effect, if any
    pub fn created_at_from(&self) -> Option<&str> {
        self.params.get(CREATED_AT_FROM).map(String::as_str)
    }

    /// Cursor positioned after `received` documents
    #[must_use]
    pub fn advance(self, received: u64) -> Self {
        let mut params = self.params;
        params.insert(
            START_AT_DOCUMENT.to_string(),
            (self.base_offset + received).to_string(),
        );
        Self {
            base_offset: self.base_offset,
            received,
            params,
            max_allowed: self.max_allowed,
        }
    }

    /// True if `added` documents fill the cap
    pub fn cap_reached(&self, added: u64) -> bool {
        self.max_allowed.is_some_and(|max| added >= max)
    }

    /// Whether `max_created_at` as the next `created_at_from` would repeat the
    /// current one
    pub fn repeats_created_at(&self, max_created_at: Option<DateTime<Utc>>) -> bool {
        let (Some(previous), Some(next)) = (self.created_at_from(), max_created_at) else {
            return false;
        };
        match parse_timestamp(previous) {
            Some(previous) => previous == next,
            None => previous == crate::types::format_timestamp(next),
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Why a drain stopped before the collection was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// The next `created_at_from` would equal the previous one
    CreatedAtCycle,
    /// The server returned no documents although more were expected
    EmptyPage,
    /// A page added nothing new to the accumulator
    NoGrowth,
    /// A page held exactly one document
    SingleItemPage,
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Anomaly::CreatedAtCycle => "created_at_from would repeat",
            Anomaly::EmptyPage => "empty page before end of collection",
            Anomaly::NoGrowth => "page added no new documents",
            Anomaly::SingleItemPage => "single-document page",
        };
        f.write_str(text)
    }
}

/// How a drain ended, short of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every document the server reported was received
    Complete,
    /// The cap was reached with documents left on the server
    Capped,
    /// Stopped early on ambiguous pagination state
    Anomaly(Anomaly),
}

/// Result of a drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// How the drain ended
    pub outcome: DrainOutcome,
    /// Requests issued
    pub pages_fetched: u32,
    /// Documents delivered by the server
    pub documents_received: u64,
    /// Documents the accumulator gained
    pub documents_added: u64,
}

impl DrainReport {
    /// True if the whole collection was drained
    pub fn is_complete(&self) -> bool {
        self.outcome == DrainOutcome::Complete
    }

    /// The anomaly that stopped the drain, if any
    pub fn anomaly(&self) -> Option<Anomaly> {
        match self.outcome {
            DrainOutcome::Anomaly(anomaly) => Some(anomaly),
            _ => None,
        }
    }
}

// ============================================================================
// Accumulator
// ============================================================================

/// Append-only sink for drained documents
pub trait Accumulator<T> {
    /// Take ownership of one document
    fn add(&mut self, item: T) -> Result<()>;

    /// Documents held
    fn count(&self) -> usize;

    /// Latest creation time seen
    fn max_created_at(&self) -> Option<DateTime<Utc>>;

    /// Latest update time seen
    fn max_updated_at(&self) -> Option<DateTime<Utc>>;
}

/// Documents that carry creation and update times
pub trait Timestamped {
    /// Creation time, if known
    fn created_at(&self) -> Option<DateTime<Utc>>;

    /// Last update time, if known
    fn updated_at(&self) -> Option<DateTime<Utc>>;
}

impl Timestamped for JsonValue {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.get("created_at")?.as_str().and_then(parse_timestamp)
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.get("updated_at")?.as_str().and_then(parse_timestamp)
    }
}

/// Vec-backed accumulator that tracks timestamp high-water marks
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentCollector<T = JsonValue> {
    documents: Vec<T>,
    max_created_at: Option<DateTime<Utc>>,
    max_updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for DocumentCollector<T> {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            max_created_at: None,
            max_updated_at: None,
        }
    }
}

impl<T> DocumentCollector<T> {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Collected documents in arrival order
    pub fn documents(&self) -> &[T] {
        &self.documents
    }

    /// Take the collected documents
    pub fn into_documents(self) -> Vec<T> {
        self.documents
    }
}

impl<T: Timestamped> Accumulator<T> for DocumentCollector<T> {
    fn add(&mut self, item: T) -> Result<()> {
        if let Some(created) = item.created_at() {
            self.max_created_at = self.max_created_at.max(Some(created));
        }
        if let Some(updated) = item.updated_at() {
            self.max_updated_at = self.max_updated_at.max(Some(updated));
        }
        self.documents.push(item);
        Ok(())
    }

    fn count(&self) -> usize {
        self.documents.len()
    }

    fn max_created_at(&self) -> Option<DateTime<Utc>> {
        self.max_created_at
    }

    fn max_updated_at(&self) -> Option<DateTime<Utc>> {
        self.max_updated_at
    }
}
