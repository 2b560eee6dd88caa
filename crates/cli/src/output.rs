//! Output formatting utilities

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
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

/// Print a report as pretty JSON on stdout
pub fn print_json<T: Serialize>(report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    println!("{}", json);
    Ok(())
}

/// Print rows as a rounded table, or a notice when there are none
pub fn print_rows<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        print_info(empty_message);
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
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

/// Format minutes as a compact age
pub fn format_age(minutes: i64) -> String {
    if minutes >= 24 * 60 {
        format!("{}d{}h", minutes / (24 * 60), (minutes % (24 * 60)) / 60)
    } else if minutes >= 60 {
        format!("{}h{}m", minutes / 60, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}

/// Color a status, severity or verdict label
pub fn color_status(status: &str) -> String {
    let upper = status.to_uppercase();
    match upper.as_str() {
        "HEALTHY" | "FIXED" | "OK" | "INFO" => status.green().to_string(),
        "DEPLOYING" | "WARNING" | "SKIPPED" | "DRY RUN" => status.yellow().to_string(),
        "FAILED" | "ROLLBACK_NEEDED" | "CRITICAL" | "UNFIXABLE" | "STUCK" => {
            status.red().to_string()
        }
        s if s.ends_with("_FAILED") => status.red().to_string(),
        s if s.ends_with("_IN_PROGRESS") => status.yellow().to_string(),
        s if s.ends_with("_COMPLETE") => status.green().to_string(),
        _ => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(5), "5m");
        assert_eq!(format_age(95), "1h35m");
        assert_eq!(format_age(1500), "1d1h");
    }

    #[test]
    fn test_color_status_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(color_status("UPDATE_ROLLBACK_FAILED"), "UPDATE_ROLLBACK_FAILED");
        assert_eq!(color_status("healthy"), "healthy");
    }
}
