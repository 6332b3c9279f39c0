//! HTTP transport module
//!
//! One request/response cycle against the itembase API: bearer auth,
//! gzip-compressed responses, JSON bodies and structured API errors.
//!
//! # Features
//!
//! - **Transport trait**: the seam used by pagination and the client, so
//!   tests and callers can substitute their own implementation
//! - **Automatic Retries**: 429, 5xx, timeouts and connect errors with backoff
//! - **Rate Limiting**: optional token bucket limiter using governor

mod rate_limit;
mod transport;

pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use transport::{HttpTransport, Transport};

#[cfg(test)]
mod tests;
