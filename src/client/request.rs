//! Immutable collection request builder
//!
//! Every builder method returns a new request; the receiver is left as it
//! was, so a base request can be shared and specialized freely.

use crate::error::Result;
use crate::http::Transport;
use crate::pagination::{drain_all, Accumulator, CollectionFetcher, DrainReport, Page};
use crate::types::{
    format_timestamp, JsonValue, Method, StringMap, CREATED_AT_FROM, CREATED_AT_TO,
    DOCUMENT_LIMIT, LIMIT, START_AT_DOCUMENT, UPDATED_AT_FROM, UPDATED_AT_TO,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// A query against one API resource on behalf of one user
#[derive(Clone)]
pub struct CollectionRequest {
    transport: Arc<dyn Transport>,
    bearer: Option<String>,
    url: String,
    params: StringMap,
    max: Option<u64>,
}

impl CollectionRequest {
    /// Request for `url`, authenticated with `bearer`
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>, bearer: Option<String>) -> Self {
        Self {
            transport,
            bearer,
            url: url.into(),
            params: StringMap::new(),
            max: None,
        }
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    /// Narrow to a property or document id below the current URL
    #[must_use]
    pub fn select(&self, prop: &str) -> Self {
        self.with_url(join_path(&self.url, prop))
    }

    /// Descend into a child resource path
    #[must_use]
    pub fn child(&self, path: &str) -> Self {
        self.with_url(join_path(&self.url, path))
    }

    /// Only documents created at or after `value`
    #[must_use]
    pub fn created_at_from(&self, value: DateTime<Utc>) -> Self {
        self.with_param(CREATED_AT_FROM, format_timestamp(value))
    }

    /// Only documents created at or before `value`
    #[must_use]
    pub fn created_at_to(&self, value: DateTime<Utc>) -> Self {
        self.with_param(CREATED_AT_TO, format_timestamp(value))
    }

    /// Only documents updated at or after `value`
    #[must_use]
    pub fn updated_at_from(&self, value: DateTime<Utc>) -> Self {
        self.with_param(UPDATED_AT_FROM, format_timestamp(value))
    }

    /// Only documents updated at or before `value`
    #[must_use]
    pub fn updated_at_to(&self, value: DateTime<Utc>) -> Self {
        self.with_param(UPDATED_AT_TO, format_timestamp(value))
    }

    /// Documents per response
    #[must_use]
    pub fn limit(&self, limit: u32) -> Self {
        self.with_param(DOCUMENT_LIMIT, limit.to_string())
    }

    /// Skip the first `offset` documents; a drain pages on from there
    #[must_use]
    pub fn offset(&self, offset: u64) -> Self {
        self.with_param(START_AT_DOCUMENT, offset.to_string())
    }

    /// Cap on documents a drain adds; 0 removes the cap
    #[must_use]
    pub fn max(&self, max: u64) -> Self {
        let mut next = self.clone();
        next.max = (max > 0).then_some(max);
        next
    }

    /// Set an arbitrary query parameter
    #[must_use]
    pub fn param(&self, key: &str, value: impl Into<String>) -> Self {
        self.with_param(key, value.into())
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Resource URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Query parameters sent with the request
    pub fn params(&self) -> &StringMap {
        &self.params
    }

    /// Drain cap, if any
    pub fn max_documents(&self) -> Option<u64> {
        self.max
    }

    // ------------------------------------------------------------------------
    // Executors
    // ------------------------------------------------------------------------

    /// GET the resource and decode it into `T`
    pub async fn get<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.get_value().await?)?)
    }

    /// GET the resource as raw JSON
    pub async fn get_value(&self) -> Result<JsonValue> {
        debug!(url = %self.url, "GET");
        self.transport
            .call(Method::GET, &self.url, self.bearer.as_deref(), None, &self.params)
            .await
    }

    /// Drain every page of the collection into `into`
    pub async fn get_all_into<A>(&self, into: &mut A) -> Result<DrainReport>
    where
        A: Accumulator<JsonValue> + Send + ?Sized,
    {
        let fetcher: CollectionFetcher =
            CollectionFetcher::new(Arc::clone(&self.transport), &self.url, self.bearer.clone());
        drain_all(&fetcher, into, self.params.clone(), self.max).await
    }

    /// Number of documents matching the query, fetching at most one
    pub async fn found(&self) -> Result<u64> {
        let probe = self.with_param(LIMIT, "1".to_string());
        let page: Page = probe.get().await?;
        Ok(page.num_documents_found)
    }

    fn with_url(&self, url: String) -> Self {
        let mut next = self.clone();
        next.url = url;
        next
    }

    fn with_param(&self, key: &str, value: String) -> Self {
        let mut next = self.clone();
        next.params.insert(key.to_string(), value);
        next
    }
}

impl std::fmt::Debug for CollectionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionRequest")
            .field("url", &self.url)
            .field("params", &self.params)
            .field("max", &self.max)
            .field("authenticated", &self.bearer.is_some())
            .finish()
    }
}

fn join_path(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}
