//! CLI module
//!
//! Command-line interface for the itembase API.
//!
//! # Commands
//!
//! - `authorize` - Obtain and store a user token
//! - `me` - Show the authorized user's profile
//! - `fetch` - Drain a collection as JSON lines
//! - `found` - Count the documents in a collection

mod commands;
mod runner;

pub use commands::{Cli, Collection, Commands};
pub use runner::{JsonLines, Runner};
