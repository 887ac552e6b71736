//! Config command - show the effective queue configuration
//!
//! Usage:
//! ```bash
//! COURIER_BATCH_SIZE=25 courier config
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use courier_queue::QueueConfig;

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the config command
pub fn run(args: ConfigArgs) -> Result<()> {
    let config = QueueConfig::from_env();
    let valid = config.validate();

    if args.json {
        let value = serde_json::json!({
            "max_concurrent_jobs": config.max_concurrent_jobs,
            "batch_size": config.batch_size,
            "retry_delay_ms": config.retry_delay.as_millis() as u64,
            "max_retries": config.max_retries,
            "processing_interval_ms": config.processing_interval.as_millis() as u64,
            "attempt_timeout_ms": config.attempt_timeout.map(|t| t.as_millis() as u64),
            "valid": valid.is_ok(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", "Courier queue configuration".bold().cyan());
    println!("{}", "═".repeat(40).cyan());
    println!(
        "  {} {}",
        "max_concurrent_jobs:".dimmed(),
        config.max_concurrent_jobs.to_string().green()
    );
    println!("  {} {}", "batch_size:".dimmed(), config.batch_size.to_string().green());
    println!(
        "  {} {}",
        "retry_delay:".dimmed(),
        format!("{:?}", config.retry_delay).green()
    );
    println!("  {} {}", "max_retries:".dimmed(), config.max_retries.to_string().green());
    println!(
        "  {} {}",
        "processing_interval:".dimmed(),
        format!("{:?}", config.processing_interval).green()
    );
    println!(
        "  {} {}",
        "attempt_timeout:".dimmed(),
        config
            .attempt_timeout
            .map(|t| format!("{t:?}"))
            .unwrap_or_else(|| "none".to_string())
            .green()
    );
    println!();

    match valid {
        Ok(()) => crate::print_success("Configuration is valid"),
        Err(e) => crate::print_warning(&e.to_string()),
    }
    Ok(())
}
