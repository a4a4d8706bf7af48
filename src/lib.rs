//! Connection-scoped MongoDB execution
//!
//! Every operation runs on a connection opened for it alone and closed before
//! the call returns, whatever the outcome. Nothing is pooled or shared between
//! calls, which suits short-lived processes and tools that must not hold
//! connections open while idle.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: Connection traits and the MongoDB driver backend
//! - `error`: Error types and handling
//! - `executor`: Connection-scoped execution engine
//!
//! # Example
//!
//! ```no_run
//! use mongodb::bson::doc;
//! use mongoconnect::{config::ConnectionConfig, ScopedExecutor};
//!
//! #[tokio::main]
//! async fn main() -> mongoconnect::Result<()> {
//!     let config = ConnectionConfig::with_endpoint("mongodb://localhost:27017/main");
//!     let executor = ScopedExecutor::new(config);
//!
//!     let users = executor.find_many(None, "users", doc! {}, None).await?;
//!     println!("{} users", users.len());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;

// Re-export commonly used types
pub use config::{Config, ConnectionConfig};
pub use connection::{Connection, Connector, MongoConnector};
pub use error::{MongoConnectError, Result, ResultExt};
pub use executor::{ExecutionResult, Operation, OperationRequest, ResultData, ScopedExecutor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
