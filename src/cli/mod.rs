//! Command-line interface for mongoconnect
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and merging with arguments
//! - Dispatching one subcommand to a [`ScopedExecutor`]
//!
//! Every subcommand runs a single operation, so the process opens exactly one
//! connection and closes it before printing the result.

use clap::{Parser, Subcommand};
use mongodb::bson::{Bson, Document};
use std::path::PathBuf;

use crate::config::{Config, LogLevel};
use crate::error::{MongoConnectError, OperationError, Result};
use crate::executor::ScopedExecutor;

/// Run single MongoDB operations, each on its own connection
#[derive(Parser, Debug)]
#[command(
    name = "mongoconnect",
    version,
    about = "Run one MongoDB operation on a fresh connection",
    long_about = "Runs a single MongoDB operation against a freshly opened connection and \
closes it before printing the result as relaxed extended JSON."
)]
pub struct CliArgs {
    /// MongoDB connection URI
    ///
    /// Format: mongodb://[username:password@]host[:port][/database][?options]
    #[arg(long, global = true, value_name = "URI")]
    pub uri: Option<String>,

    /// Database to use instead of the default one
    #[arg(long, global = true, value_name = "NAME")]
    pub database: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", global = true, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Connect timeout in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub connect_timeout: Option<u64>,

    /// Operation timeout in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for mongoconnect
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List databases on the server
    Databases,

    /// List collections of the database
    Collections,

    /// Find documents matching a filter
    Find {
        collection: String,

        /// Filter as JSON
        #[arg(default_value = "{}")]
        filter: String,

        /// Maximum number of documents
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Find the first document matching a filter
    FindOne {
        collection: String,

        #[arg(default_value = "{}")]
        filter: String,
    },

    /// Count documents matching a filter
    Count {
        collection: String,

        #[arg(default_value = "{}")]
        filter: String,
    },

    /// Count documents from collection metadata
    EstimatedCount { collection: String },

    /// Distinct values of a field
    Distinct {
        collection: String,
        field: String,

        #[arg(default_value = "{}")]
        filter: String,
    },

    /// Insert one document
    Insert {
        collection: String,

        /// Document as JSON
        document: String,
    },

    /// Delete documents matching a filter
    Delete {
        collection: String,
        filter: String,

        /// Delete every match instead of the first one
        #[arg(long)]
        many: bool,
    },

    /// Run a raw database command
    Command {
        /// Command document as JSON, e.g. '{"ping": 1}'
        command: String,
    },

    /// Show effective configuration
    Config,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Parse process arguments and load configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Build from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let mut config = Config::load(args.config_file.as_deref())?;
        apply_args_to_config(&mut config, &args);
        config.validate()?;
        Ok(Self { args, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Run the selected subcommand and print its result
    pub async fn run(&self) -> Result<()> {
        if self.args.command == Commands::Config {
            return self.show_config();
        }

        let executor = ScopedExecutor::new(self.config.connection.clone());
        let cancel = executor.cancel_token();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });

        let outcome = self.dispatch(&executor).await;
        ctrl_c.abort();

        println!("{}", to_json(outcome?)?);
        Ok(())
    }

    async fn dispatch(&self, executor: &ScopedExecutor) -> Result<Bson> {
        let db = self.args.database.as_deref();

        let value = match &self.args.command {
            Commands::Databases => Bson::Document(executor.list_databases().await?),
            Commands::Collections => documents(executor.list_collections(db).await?),
            Commands::Find {
                collection,
                filter,
                limit,
            } => {
                let options = limit.map(|limit| mongodb::bson::doc! { "limit": limit });
                let docs = executor
                    .find_many(db, collection, parse_document("filter", filter)?, options)
                    .await?;
                documents(docs)
            }
            Commands::FindOne { collection, filter } => executor
                .find_one(db, collection, parse_document("filter", filter)?, None)
                .await?
                .map(Bson::Document)
                .unwrap_or(Bson::Null),
            Commands::Count { collection, filter } => count(
                executor
                    .count_documents(db, collection, parse_document("filter", filter)?, None)
                    .await?,
            ),
            Commands::EstimatedCount { collection } => {
                count(executor.estimated_document_count(db, collection, None).await?)
            }
            Commands::Distinct {
                collection,
                field,
                filter,
            } => Bson::Array(
                executor
                    .distinct(db, collection, field, parse_document("filter", filter)?, None)
                    .await?,
            ),
            Commands::Insert {
                collection,
                document,
            } => {
                let ack = executor
                    .insert_one(db, collection, parse_document("document", document)?, None)
                    .await?;
                Bson::Document(mongodb::bson::doc! { "insertedId": ack.inserted_id })
            }
            Commands::Delete {
                collection,
                filter,
                many,
            } => {
                let filter = parse_document("filter", filter)?;
                let ack = if *many {
                    executor.delete_many(db, collection, filter, None).await?
                } else {
                    executor.delete_one(db, collection, filter, None).await?
                };
                Bson::Document(mongodb::bson::doc! { "deletedCount": count(ack.deleted_count) })
            }
            Commands::Command { command } => Bson::Document(
                executor
                    .run_command(db, parse_document("command", command)?)
                    .await?,
            ),
            Commands::Config => unreachable!("handled before connecting"),
        };

        Ok(value)
    }

    fn show_config(&self) -> Result<()> {
        let mut shown = self.config.clone();
        shown.connection.endpoint = shown.connection.redacted_endpoint();
        let content = toml::to_string_pretty(&shown)
            .map_err(|e| crate::error::ConfigError::InvalidFormat(e.to_string()))?;
        println!("{}", content);
        Ok(())
    }
}

/// Apply CLI arguments on top of file and environment configuration
fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
    if let Some(uri) = &args.uri {
        config.connection.endpoint = uri.clone();
    }
    if let Some(database) = &args.database {
        config.connection.default_database = Some(database.clone());
    }
    if let Some(timeout) = args.connect_timeout {
        config.connection.connect_timeout = timeout;
    }
    if let Some(timeout) = args.timeout {
        config.connection.operation_timeout = timeout;
    }

    config.logging.level = if args.very_verbose {
        LogLevel::Trace
    } else if args.verbose {
        LogLevel::Debug
    } else if args.quiet {
        LogLevel::Error
    } else {
        config.logging.level
    };
}

/// Parse a JSON (extended JSON accepted) argument into a document
pub fn parse_document(name: &str, text: &str) -> Result<Document> {
    let invalid = |reason: String| -> MongoConnectError {
        OperationError::InvalidParameters(format!("{name}: {reason}")).into()
    };

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;
    match Bson::try_from(value).map_err(|e| invalid(e.to_string()))? {
        Bson::Document(doc) => Ok(doc),
        other => Err(invalid(format!("expected a JSON object, got {}", other))),
    }
}

fn documents(docs: Vec<Document>) -> Bson {
    Bson::Array(docs.into_iter().map(Bson::Document).collect())
}

fn count(n: u64) -> Bson {
    i64::try_from(n).map(Bson::Int64).unwrap_or(Bson::Double(n as f64))
}

fn to_json(value: Bson) -> Result<String> {
    serde_json::to_string_pretty(&value.into_relaxed_extjson())
        .map_err(|e| MongoConnectError::Io(std::io::Error::other(e)))
}
