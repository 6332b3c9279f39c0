//! Authentication module
//!
//! OAuth2 token lifecycle for itembase users.
//!
//! The `TokenManager` loads tokens from a pluggable `TokenStore`, refreshes
//! expired ones, and falls back to the interactive `AuthorizationFlow` when
//! no usable token remains.

mod flow;
mod manager;
mod store;
mod types;

pub use flow::AuthorizationFlow;
pub use manager::TokenManager;
pub use store::{
    ConsolePermissionHandler, FileTokenStore, MemoryTokenStore, PermissionHandler,
    TokenHandlers, TokenStore,
};
pub use types::{Token, TokenErrorResponse, TokenResponse};
