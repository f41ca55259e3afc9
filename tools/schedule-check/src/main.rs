//! schedule-check - offline checker for schedule manifests
//!
//! Loads Schedules from a manifest file or directory and shows, for every
//! item, its weekly window and whether it is active at a given instant.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use tabled::Table;

mod report;

/// Check schedule manifests and preview their windows.
#[derive(Debug, Parser)]
#[command(name = "schedule-check")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Manifest file or directory.
    #[arg(value_name = "PATH", env = "KSS_SCHEDULES_PATH")]
    path: PathBuf,

    /// Instant to evaluate windows at (RFC 3339). Defaults to now.
    #[arg(long, value_name = "TIME")]
    at: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn parse_at(at: Option<&str>) -> Result<DateTime<Utc>> {
    match at {
        Some(at) => Ok(DateTime::parse_from_rfc3339(at)
            .with_context(|| format!("invalid --at time {:?}", at))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

fn run(cli: Cli) -> Result<bool> {
    let at = parse_at(cli.at.as_deref())?;
    let manifest = kss_controller::load_manifests(&cli.path)?;
    let report = report::check(&manifest, at);

    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            if report.rows.is_empty() {
                println!("{}", "No schedule items found.".dimmed());
            } else {
                println!("{}", Table::new(&report.rows));
            }
            for row in report.invalid() {
                eprintln!(
                    "{} {} item {} ({}): {}",
                    "Invalid:".yellow().bold(),
                    row.schedule,
                    row.item,
                    row.target,
                    row.error.as_deref().unwrap_or_default()
                );
            }
            for object in &report.skipped {
                eprintln!("{} {}", "Skipped:".yellow().bold(), object);
            }
            if report.is_valid() {
                println!(
                    "{} {} schedule(s) checked at {}",
                    "Success:".green().bold(),
                    manifest.schedules.len(),
                    at.to_rfc3339()
                );
            }
        }
    }

    Ok(report.is_valid())
}

fn main() {
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(2);
        }
    }
}
