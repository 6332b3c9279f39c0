//! Common types used throughout the itembase SDK
//!
//! This module contains shared type definitions, type aliases,
//! the on-wire query parameter vocabulary and timestamp formatting.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// Query parameters, keyed by wire name
pub type StringMap = HashMap<String, String>;

// ============================================================================
// Query Parameter Vocabulary
// ============================================================================

/// Offset of the first document to return
pub const START_AT_DOCUMENT: &str = "start_at_document";
/// Lower bound on document creation time
pub const CREATED_AT_FROM: &str = "created_at_from";
/// Upper bound on document creation time
pub const CREATED_AT_TO: &str = "created_at_to";
/// Lower bound on document update time
pub const UPDATED_AT_FROM: &str = "updated_at_from";
/// Upper bound on document update time
pub const UPDATED_AT_TO: &str = "updated_at_to";
/// Maximum documents per response
pub const DOCUMENT_LIMIT: &str = "document_limit";
/// Page size used by the document count probe
pub const LIMIT: &str = "limit";

// ============================================================================
// HTTP Types
// ============================================================================

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
            Method::PUT => reqwest::Method::PUT,
            Method::PATCH => reqwest::Method::PATCH,
            Method::DELETE => reqwest::Method::DELETE,
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Which itembase deployment to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Live accounts and API hosts
    Production,
    /// Sandbox hosts
    #[default]
    Sandbox,
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}

// ============================================================================
// Timestamps
// ============================================================================

/// Format a timestamp the way the API expects filter values.
///
/// RFC3339 with up to nine fractional digits, trailing zeros trimmed and the
/// fraction dropped entirely when it is zero (`2015-03-01T10:00:00.5Z`).
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    let full = value.to_rfc3339_opts(SecondsFormat::Nanos, true);
    let Some((head, fraction)) = full.trim_end_matches('Z').split_once('.') else {
        return full;
    };
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{head}Z")
    } else {
        format!("{head}.{fraction}Z")
    }
}

/// Parse an RFC3339 timestamp into UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// Utilities
// ============================================================================

/// Extension trait for Option<String> to handle empty strings
pub trait OptionStringExt {
    /// Returns None if the string is empty
    fn none_if_empty(self) -> Option<String>;
}

impl OptionStringExt for Option<String> {
    fn none_if_empty(self) -> Option<String> {
        self.filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    #[test]
    fn test_method_conversion() {
        let get: reqwest::Method = Method::GET.into();
        assert_eq!(reqwest::Method::GET, get);
        let post: reqwest::Method = Method::POST.into();
        assert_eq!(reqwest::Method::POST, post);
    }

    #[test]
    fn test_environment_serde() {
        let env: Environment = serde_json::from_str("\"production\"").unwrap();
        assert_eq!(env, Environment::Production);
        assert_eq!(Environment::default(), Environment::Sandbox);
    }

    #[test_case(0, "2015-03-01T10:00:00Z" ; "whole seconds")]
    #[test_case(500_000_000, "2015-03-01T10:00:00.5Z" ; "half second")]
    #[test_case(123_456_789, "2015-03-01T10:00:00.123456789Z" ; "full nanos")]
    #[test_case(120_000, "2015-03-01T10:00:00.00012Z" ; "micro with trailing zeros")]
    fn test_format_timestamp(nanos: u32, expected: &str) {
        let ts = Utc.with_ymd_and_hms(2015, 3, 1, 10, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(i64::from(nanos));
        assert_eq!(format_timestamp(ts), expected);
    }

    #[test]
    fn test_parse_timestamp_roundtrip_with_offset() {
        let parsed = parse_timestamp("2015-03-01T12:00:00+02:00").unwrap();
        assert_eq!(format_timestamp(parsed), "2015-03-01T10:00:00Z");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_option_string_none_if_empty() {
        assert_eq!(
            Some("test".to_string()).none_if_empty(),
            Some("test".to_string())
        );
        assert_eq!(Some(String::new()).none_if_empty(), None);
        assert_eq!(None::<String>.none_if_empty(), None);
    }
}
