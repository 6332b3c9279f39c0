// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # itembase SDK
//!
//! Client for the itembase document API: OAuth2-protected, paginated
//! per-user collections (transactions, products, buyers, profiles).
//!
//! ## Features
//!
//! - **Token Lifecycle**: cached, refreshed or interactively authorized tokens per user
//! - **Pluggable Storage**: in-memory and file token stores, or your own [`auth::TokenStore`]
//! - **Safe Pagination**: drains changing result sets without loops or silent truncation
//! - **Retrying Transport**: backoff on 429/5xx, optional client-side rate limit
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use itembase_sdk::auth::{FileTokenStore, ConsolePermissionHandler, TokenHandlers};
//! use itembase_sdk::pagination::DocumentCollector;
//! use itembase_sdk::{Client, ClientConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::from_file("itembase.yaml")?;
//!     let handlers = TokenHandlers::new()
//!         .with_store(FileTokenStore::new(".itembase/tokens"))
//!         .with_permissions(ConsolePermissionHandler);
//!     let client = Client::new(config, handlers)?;
//!
//!     let user = client.user("3f1c0f2e-...").await?;
//!     println!("{} products", user.products().found().await?);
//!
//!     let mut transactions = DocumentCollector::new();
//!     let report = user
//!         .transactions()
//!         .limit(100)
//!         .get_all_into(&mut transactions)
//!         .await?;
//!     println!("{:?}", report.outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Client                             │
//! │   user(id) → UserScope → CollectionRequest → get / found     │
//! │                                            → get_all_into    │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//! ┌───────────────────┬─────────┴─────────┬────────────────────┐
//! │       Auth        │    Pagination     │       HTTP         │
//! ├───────────────────┼───────────────────┼────────────────────┤
//! │ TokenManager      │ drain_all         │ Transport          │
//! │ AuthorizationFlow │ PageFetcher       │ Retry / Backoff    │
//! │ TokenStore        │ Accumulator       │ Rate Limit         │
//! └───────────────────┴───────────────────┴────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)] // TODO: document the User profile fields and CLI arguments

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the SDK
pub mod error;

/// Common types and type aliases
pub mod types;

/// Client configuration and endpoints
pub mod config;

/// HTTP transport with retry and rate limiting
pub mod http;

/// OAuth2 token lifecycle
pub mod auth;

/// Paginated collection draining
pub mod pagination;

/// API client and request builders
pub mod client;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use auth::{Token, TokenHandlers};
pub use client::{Client, CollectionRequest, User, UserScope};
pub use config::{ClientConfig, Endpoints, HttpConfig};
pub use pagination::{drain_all, Accumulator, DocumentCollector, DrainOutcome, DrainReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
