//! CLI runner - executes commands

use crate::auth::{ConsolePermissionHandler, FileTokenStore, TokenHandlers};
use crate::cli::commands::{Cli, Collection, Commands};
use crate::client::{Client, CollectionRequest};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::pagination::{Accumulator, DrainOutcome, Timestamped};
use crate::types::JsonValue;
use chrono::{DateTime, Utc};
use std::io::{BufWriter, Write};
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Authorize { user } => self.authorize(user.as_deref()).await,
            Commands::Me { user } => self.me(user).await,
            Commands::Fetch {
                user,
                collection,
                limit,
                max,
                created_from,
                updated_from,
            } => {
                let client = self.client()?;
                let scope = client.user(user).await?;
                let mut request = scope.child(collection.path());
                if let Some(limit) = limit {
                    request = request.limit(*limit);
                }
                if let Some(max) = max {
                    request = request.max(*max);
                }
                if let Some(from) = created_from {
                    request = request.created_at_from(*from);
                }
                if let Some(from) = updated_from {
                    request = request.updated_at_from(*from);
                }
                self.fetch(&request, *collection).await
            }
            Commands::Found { user, collection } => {
                let client = self.client()?;
                let found = client.user(user).await?.child(collection.path()).found().await?;
                println!("{found}");
                Ok(())
            }
        }
    }

    /// Build a client from the config file and token directory
    fn client(&self) -> Result<Client> {
        let path = self
            .cli
            .config
            .as_ref()
            .ok_or_else(|| Error::config("Client config not specified (use -c flag)"))?;
        let config = ClientConfig::from_file(path)?;

        let handlers = TokenHandlers::new()
            .with_store(FileTokenStore::new(&self.cli.tokens))
            .with_permissions(ConsolePermissionHandler);
        Client::new(config, handlers)
    }

    async fn authorize(&self, user: Option<&str>) -> Result<()> {
        let client = self.client()?;

        let user_id = if let Some(user_id) = user {
            client.user(user_id).await?;
            user_id.to_string()
        } else {
            let token = client
                .tokens()
                .flow()
                .authorize(Some(&ConsolePermissionHandler))
                .await?;
            let user_id = client.user_id_for_token(&token).await?;
            client.store_token(&user_id, &token).await?;
            user_id
        };

        info!(user_id = %user_id, tokens = %self.cli.tokens.display(), "authorized");
        println!("{user_id}");
        Ok(())
    }

    async fn me(&self, user: &str) -> Result<()> {
        let client = self.client()?;
        let me = client.user(user).await?.me().await?;
        println!("{}", serde_json::to_string_pretty(&me)?);
        Ok(())
    }

    async fn fetch(&self, request: &CollectionRequest, collection: Collection) -> Result<()> {
        let mut lines = JsonLines::new(BufWriter::new(std::io::stdout()));
        let report = request.get_all_into(&mut lines).await;
        lines.flush()?;
        let report = report?;

        let outcome = match report.outcome {
            DrainOutcome::Complete => "complete".to_string(),
            DrainOutcome::Capped => "capped".to_string(),
            DrainOutcome::Anomaly(anomaly) => format!("stopped early: {anomaly}"),
        };
        eprintln!(
            "{}: {} documents in {} pages ({outcome})",
            collection.path(),
            report.documents_added,
            report.pages_fetched
        );
        Ok(())
    }
}

/// Accumulator that writes each document as one JSON line
pub struct JsonLines<W: Write> {
    writer: W,
    count: usize,
    max_created_at: Option<DateTime<Utc>>,
    max_updated_at: Option<DateTime<Utc>>,
}

impl<W: Write> JsonLines<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            count: 0,
            max_created_at: None,
            max_updated_at: None,
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Accumulator<JsonValue> for JsonLines<W> {
    fn add(&mut self, item: JsonValue) -> Result<()> {
        let created = item.created_at();
        let updated = item.updated_at();

        serde_json::to_writer(&mut self.writer, &item)?;
        self.writer.write_all(b"\n")?;

        self.count += 1;
        self.max_created_at = self.max_created_at.max(created);
        self.max_updated_at = self.max_updated_at.max(updated);
        Ok(())
    }

    fn count(&self) -> usize {
        self.count
    }

    fn max_created_at(&self) -> Option<DateTime<Utc>> {
        self.max_created_at
    }

    fn max_updated_at(&self) -> Option<DateTime<Utc>> {
        self.max_updated_at
    }
}
