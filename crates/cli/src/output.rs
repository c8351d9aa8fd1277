//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use rightsize_lib::{ResizeOutcome, ThresholdFlag};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Log record format on stderr
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Print rows as a rounded table, or a notice when there are none
pub fn print_table<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        print_warning(empty_message);
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a percentage with one decimal
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Format a size's memory in MiB (`memoryInMB` is binary) as a human-readable string
pub fn format_memory_mb(mb: u64) -> String {
    if mb >= 1024 {
        format!("{:.1} GiB", mb as f64 / 1024.0)
    } else {
        format!("{} MiB", mb)
    }
}

/// Last path segment of an ARM resource id
pub fn short_name(resource_id: &str) -> &str {
    resource_id
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(resource_id)
}

/// Color the below-threshold flag
pub fn color_flag(flag: ThresholdFlag) -> String {
    let text = flag.to_string();
    match flag {
        ThresholdFlag::True => text.green().to_string(),
        ThresholdFlag::False => text,
        ThresholdFlag::Spot => text.yellow().to_string(),
    }
}

/// Color a resize outcome
pub fn color_outcome(outcome: ResizeOutcome) -> String {
    let text = outcome.to_string();
    match outcome {
        ResizeOutcome::Resized => text.green().to_string(),
        ResizeOutcome::Planned => text.blue().to_string(),
        ResizeOutcome::NoCandidate => text.yellow().to_string(),
        ResizeOutcome::Failed => text.red().to_string(),
        ResizeOutcome::Unverified => text.magenta().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        assert_eq!(
            short_name("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/web"),
            "web"
        );
        assert_eq!(short_name("web"), "web");
    }

    #[test]
    fn test_format_memory() {
        assert_eq!(format_memory_mb(512), "512 MiB");
        assert_eq!(format_memory_mb(1023), "1023 MiB");
        assert_eq!(format_memory_mb(1024), "1.0 GiB");
        assert_eq!(format_memory_mb(16384), "16.0 GiB");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(36.62), "36.6%");
    }
}
