//! Courier CLI - operate and exercise the notification queue
//!
//! # Usage
//!
//! ```bash
//! # Show the effective queue configuration (COURIER_* env vars applied)
//! courier config
//!
//! # Push 200 notifications through a transport that fails 20% of the time
//! courier simulate --jobs 200 --failure-rate 0.2 --tick-ms 50
//!
//! # Same, printing stats as JSON
//! courier simulate --jobs 200 --json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;

use commands::{config, simulate};

/// Courier - outbound notification queue
#[derive(Parser)]
#[command(
    name = "courier",
    version,
    about = "Courier CLI - priority notification queue tooling",
    long_about = "Courier dispatches outbound notifications by priority with\n\
                  bounded concurrency and fixed-delay retries.\n\n\
                  This CLI inspects configuration and runs simulations\n\
                  against a flaky in-memory transport."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective queue configuration
    #[command(name = "config")]
    Config(config::ConfigArgs),

    /// Run a queue against a simulated transport
    #[command(name = "simulate")]
    Simulate(simulate::SimulateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match cli.command {
        Commands::Config(args) => config::run(args),
        Commands::Simulate(args) => simulate::run(args, cli.verbose).await,
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = match verbosity {
        0 => "warn",
        1 => "info,courier_queue=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Print a success message with a checkmark
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}
