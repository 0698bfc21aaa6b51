//! file-courier - Directory Spool Courier
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use file_courier::config::{CliArgs, CourierConfig};
use file_courier::coordinator::Coordinator;
use file_courier::progress::{print_header, print_summary};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = CourierConfig::from_args(args).context("Invalid configuration")?;

    // Print header
    if config.show_progress {
        print_header(
            &config.source_dir.display().to_string(),
            &config.dest_dir.display().to_string(),
            config.worker_count,
        );
    }

    // Create coordinator
    let coordinator = Coordinator::new(config.clone());

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    // Run the session
    let result = coordinator.run().context("Courier session failed")?;

    // Print summary
    print_summary(
        result.files_delivered,
        result.bytes_delivered,
        result.batches_rolled_back,
        result.errors,
        result.duration,
        &config.journal_path.display().to_string(),
    );

    // Report success/failure
    if !result.completed {
        info!("Session stopped before the backlog drained");
    }

    if result.errors > 0 {
        info!(errors = result.errors, "Session completed with errors");
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("file_courier=debug,warn")
    } else {
        EnvFilter::new("file_courier=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
