//! CLI commands and argument parsing

use crate::types::parse_timestamp;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line client for the itembase API
#[derive(Parser, Debug)]
#[command(name = "itembase")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Client configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding one token file per user
    #[arg(short, long, global = true, default_value = ".itembase/tokens")]
    pub tokens: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Obtain and store a token, prompting for permission if needed
    Authorize {
        /// User to authorize (resolved from the new token when omitted)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Show the profile of an authorized user
    Me {
        #[arg(short, long)]
        user: String,
    },

    /// Drain a collection, printing one JSON document per line
    Fetch {
        #[arg(short, long)]
        user: String,

        /// Collection to read
        collection: Collection,

        /// Documents per request
        #[arg(long)]
        limit: Option<u32>,

        /// Stop after this many documents
        #[arg(long)]
        max: Option<u64>,

        /// Only documents created at or after this RFC 3339 time
        #[arg(long, value_parser = parse_time)]
        created_from: Option<DateTime<Utc>>,

        /// Only documents updated at or after this RFC 3339 time
        #[arg(long, value_parser = parse_time)]
        updated_from: Option<DateTime<Utc>>,
    },

    /// Count the documents in a collection
    Found {
        #[arg(short, long)]
        user: String,

        /// Collection to count
        collection: Collection,
    },
}

/// Per-user collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Collection {
    Transactions,
    Products,
    Buyers,
    Profiles,
}

impl Collection {
    /// Path segment below the user root
    pub fn path(self) -> &'static str {
        match self {
            Collection::Transactions => "transactions",
            Collection::Products => "products",
            Collection::Buyers => "buyers",
            Collection::Profiles => "profiles",
        }
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(value).ok_or_else(|| format!("'{value}' is not an RFC 3339 timestamp"))
}
