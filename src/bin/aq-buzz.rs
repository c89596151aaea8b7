use std::path::PathBuf;
use clap::Parser;
use log::info;

use aq_buzz::error::{AppRunError, ConfigError};
use aq_buzz::{init_logging, run};

#[derive(Parser)]
#[command(name = "aq-buzz", version, about = "Drives a Buzz haptic actuator from the nearest FeatherAQ air-quality sensor")]
struct Args {
    /// Path to the JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppRunError> {
    let args = Args::parse();

    init_logging(args.verbose);
    info!(concat!("AQ Buzz ", env!("CARGO_PKG_VERSION")));

    match run(args.config).await {
        Err(AppRunError::Config { source: ConfigError::CanNotLock { .. } }) => {
            eprintln!("This application has already been started");
            Ok(())
        },
        Err(err) => {
            eprintln!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
