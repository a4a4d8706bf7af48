//! mongoconnect
//!
//! Runs one MongoDB operation on a freshly opened connection and prints the
//! result as relaxed extended JSON.
//!
//! # Usage
//!
//! ```bash
//! mongoconnect --uri mongodb://localhost:27017/shop find orders '{"status": "open"}'
//! mongoconnect --database admin command '{"ping": 1}'
//! ```

use mongoconnect::cli::CliInterface;
use mongoconnect::error::Result;
use tracing_subscriber::EnvFilter;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Parse arguments, load configuration, initialize logging, run the subcommand
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    cli.run().await
}

/// Initialize logging from the merged configuration
///
/// `RUST_LOG`, when set, takes over from the configured level. Logs go to
/// stderr so stdout carries only the JSON result.
fn initialize_logging(cli: &CliInterface) {
    let logging = &cli.config().logging;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(logging.level.to_tracing_level().into())
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
