//! Drains a paginated collection into an accumulator
//!
//! Pages are requested one at a time with an increasing `start_at_document`
//! offset until the server-reported total is reached, the cap is hit, or the
//! pagination state stops making sense.

use super::types::{Accumulator, Anomaly, DrainOutcome, DrainReport, Page, PaginationCursor};
use crate::error::Result;
use crate::http::Transport;
use crate::types::{JsonValue, Method, StringMap};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of pages for one collection
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    /// Fetch the page selected by `params`
    async fn fetch_page(&self, params: &StringMap) -> Result<Page<T>>;
}

/// Fetches pages with GET requests against a collection URL
pub struct CollectionFetcher<T = JsonValue> {
    transport: Arc<dyn Transport>,
    url: String,
    bearer: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CollectionFetcher<T> {
    /// Create a fetcher for `url`, authenticating with `bearer`
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>, bearer: Option<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            bearer,
            _marker: PhantomData,
        }
    }

    /// Collection URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl<T> std::fmt::Debug for CollectionFetcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionFetcher")
            .field("url", &self.url)
            .field("authenticated", &self.bearer.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T> PageFetcher<T> for CollectionFetcher<T>
where
    T: DeserializeOwned + Send,
{
    async fn fetch_page(&self, params: &StringMap) -> Result<Page<T>> {
        let body = self
            .transport
            .call(Method::GET, &self.url, self.bearer.as_deref(), None, params)
            .await?;
        Ok(serde_json::from_value(body)?)
    }
}

/// Drain every page of a collection into `into`.
///
/// `cap` limits how many documents this drain adds; `Some(0)` means no cap.
/// A transport or decode error ends the drain and is returned as is, leaving
/// whatever was already added in `into`. Documents the accumulator refuses
/// are logged and skipped.
pub async fn drain_all<T, F, A>(
    fetcher: &F,
    into: &mut A,
    base_params: StringMap,
    cap: Option<u64>,
) -> Result<DrainReport>
where
    T: Send,
    F: PageFetcher<T> + ?Sized,
    A: Accumulator<T> + Send + ?Sized,
{
    let start = into.count();
    let mut cursor = PaginationCursor::new(base_params, cap.filter(|&max| max > 0));
    let mut total_found: Option<u64> = None;
    let mut pages_fetched = 0u32;

    let report = |outcome, pages_fetched, cursor: &PaginationCursor, into: &A| DrainReport {
        outcome,
        pages_fetched,
        documents_received: cursor.received(),
        documents_added: into.count().saturating_sub(start) as u64,
    };

    loop {
        if let Some(total) = total_found {
            if cursor.position() >= total {
                debug!(total, "collection drained");
                return Ok(report(DrainOutcome::Complete, pages_fetched, &cursor, &*into));
            }

            if cursor.cap_reached(into.count().saturating_sub(start) as u64) {
                debug!(max = ?cursor.max_allowed(), "document cap reached");
                return Ok(report(DrainOutcome::Capped, pages_fetched, &cursor, &*into));
            }

            if cursor.repeats_created_at(into.max_created_at()) {
                warn!(
                    created_at_from = ?cursor.created_at_from(),
                    "created_at_from would repeat, stopping"
                );
                return Ok(report(
                    DrainOutcome::Anomaly(Anomaly::CreatedAtCycle),
                    pages_fetched,
                    &cursor,
                    into,
                ));
            }

            let received = cursor.received();
            cursor = cursor.advance(received);
        }

        let page = fetcher.fetch_page(cursor.params()).await?;
        page.validate()?;
        pages_fetched += 1;

        let total = *total_found.get_or_insert(page.num_documents_found);
        let returned = page.num_documents_returned;
        debug!(
            page = pages_fetched,
            found = page.num_documents_found,
            returned,
            "page fetched"
        );

        if returned == 0 {
            let outcome = if cursor.position() >= total {
                DrainOutcome::Complete
            } else {
                warn!(received = cursor.received(), total, "empty page before end of collection");
                DrainOutcome::Anomaly(Anomaly::EmptyPage)
            };
            return Ok(report(outcome, pages_fetched, &cursor, &*into));
        }

        let before = into.count();
        let truncated = ingest(into, page.documents, start, cursor.max_allowed());
        let received = cursor.received() + returned;
        cursor = cursor.advance(received);

        if truncated {
            debug!(max = ?cursor.max_allowed(), "document cap reached mid-page");
            return Ok(report(DrainOutcome::Capped, pages_fetched, &cursor, &*into));
        }

        if pages_fetched > 1 && into.count() == before {
            warn!(received, total, "page added no new documents, stopping");
            return Ok(report(
                DrainOutcome::Anomaly(Anomaly::NoGrowth),
                pages_fetched,
                &cursor,
                &*into,
            ));
        }

        if cursor.position() >= total {
            continue;
        }

        if returned == 1 {
            warn!(received, total, "single-document page, stopping");
            return Ok(report(
                DrainOutcome::Anomaly(Anomaly::SingleItemPage),
                pages_fetched,
                &cursor,
                &*into,
            ));
        }
    }
}

/// Feed documents to the accumulator until the cap is filled.
///
/// Returns true if documents were left over because of the cap.
fn ingest<T, A>(into: &mut A, documents: Vec<T>, start: usize, max: Option<u64>) -> bool
where
    A: Accumulator<T> + ?Sized,
{
    for document in documents {
        if max.is_some_and(|max| into.count().saturating_sub(start) as u64 >= max) {
            return true;
        }
        if let Err(e) = into.add(document) {
            warn!(error = %e, "accumulator refused document, skipping");
        }
    }
    false
}
