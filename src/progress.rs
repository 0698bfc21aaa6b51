//! Progress reporting for the courier session
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::coordinator::CourierProgress;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays courier status
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &CourierProgress) {
        let bytes_str = format_size(progress.bytes, BINARY);
        let rate = progress.files_per_second();

        let msg = format!(
            "Delivered: {} | Size: {} | Rate: {:.0}/s | Pending: {} | In flight: {} | Rollbacks: {} | Workers: {}",
            format_number(progress.delivered),
            bytes_str,
            rate,
            progress.pending,
            progress.in_flight,
            format_number(progress.rollbacks),
            progress.workers,
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the session results
pub fn print_summary(
    delivered: u64,
    bytes: u64,
    rollbacks: u64,
    errors: u64,
    duration: Duration,
    journal_path: &str,
) {
    let bytes_str = format_size(bytes, BINARY);
    let duration_secs = duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        delivered as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Delivery Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Files:").bold(),
        format_number(delivered)
    );
    println!("  {} {}", style("Total Size:").bold(), bytes_str);
    println!(
        "  {} {:.1}s ({:.0} files/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if rollbacks > 0 {
        println!(
            "  {} {}",
            style("Rollbacks:").yellow().bold(),
            format_number(rollbacks)
        );
    }
    if errors > 0 {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(errors)
        );
    }
    println!("  {} {}", style("Journal:").bold(), journal_path);
    println!();
}

/// Print a header at the start of the session
pub fn print_header(source: &str, dest: &str, workers: usize) {
    println!();
    println!(
        "{} {}",
        style("file-courier").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), source);
    println!("  {} {}", style("Dest:").bold(), dest);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!();
}
