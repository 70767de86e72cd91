//! CZDS Fetcher CLI application
//!
//! Command-line interface for ICANN's Centralized Zone Data Service: zone
//! file downloads, zone access requests and request status.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use czds_fetcher::cli::{handle_download, handle_request, handle_status, Cli, Commands};
use czds_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    init_logging(&cli);

    info!("CZDS Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Download(args) => {
            info!("Executing download command");
            handle_download(&cli.global, args).await
        }
        Commands::Request(args) => {
            info!("Executing request command");
            handle_request(&cli.global, args).await
        }
        Commands::Status(args) => {
            info!("Executing status command");
            handle_status(&cli.global, args).await
        }
    }
}

/// Initialize logging based on CLI verbosity settings
///
/// `RUST_LOG` is honoured; the verbosity flags set the level for this crate.
fn init_logging(cli: &Cli) {
    let log_level = cli.log_level();

    let mut filter = EnvFilter::from_default_env();
    match format!("czds_fetcher={}", log_level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Invalid log directive: {}", e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
