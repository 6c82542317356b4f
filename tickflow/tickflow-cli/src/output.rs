//! Terminal output for the tickflow CLI.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use console::style;
use serde::Serialize;
use std::fmt::Display;
use tickflow_core::StockAnalysis;
use tickflow_pipeline::RunReport;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Human,
    /// JSON output for scripting
    Json,
}

/// Print a success message
pub fn success(msg: impl Display) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an error message
pub fn error(msg: impl Display) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: impl Display) {
    println!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print an info message
pub fn info(msg: impl Display) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Print a section header
pub fn header(msg: impl Display) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Print a key-value pair
pub fn kv(key: impl Display, value: impl Display) {
    println!("  {}: {}", style(key).cyan(), value);
}

/// Print any serializable value as pretty JSON
pub fn json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", rendered);
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct FailureView {
    pub identifier: String,
    pub error: String,
}

/// Serializable projection of a [`RunReport`].
#[derive(Debug, Serialize)]
pub struct ReportView {
    pub total: usize,
    pub loaded: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub batch_sizes: Vec<usize>,
    pub elapsed_ms: u128,
    pub failures: Vec<FailureView>,
}

impl From<&RunReport> for ReportView {
    fn from(report: &RunReport) -> Self {
        Self {
            total: report.total,
            loaded: report.loaded,
            processed: report.processed,
            failed: report.failed(),
            skipped: report.skipped,
            cancelled: report.cancelled,
            batch_sizes: report.batch_sizes.clone(),
            elapsed_ms: report.elapsed.as_millis(),
            failures: report
                .failures()
                .map(|f| FailureView {
                    identifier: f.identifier.clone(),
                    error: f.error.to_string(),
                })
                .collect(),
        }
    }
}

/// Print the final report of a run.
pub fn report(title: &str, report: &RunReport, format: OutputFormat) -> Result<()> {
    let view = ReportView::from(report);
    if format == OutputFormat::Json {
        return json(&view);
    }

    header(title);
    kv("Total", view.total);
    kv("Loaded", view.loaded);
    kv("Processed", view.processed);
    if !view.batch_sizes.is_empty() {
        kv("Batches", format!("{:?}", view.batch_sizes));
    }
    kv("Elapsed", format!("{} ms", view.elapsed_ms));

    if view.skipped > 0 {
        warning(format!("{} identifiers skipped", view.skipped));
    }
    if !view.failures.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![Cell::new("Identifier"), Cell::new("Error").fg(Color::Red)]);
        for failure in &view.failures {
            table.add_row(vec![failure.identifier.as_str(), failure.error.as_str()]);
        }
        println!("{table}");
    }

    if view.cancelled {
        warning("Run cancelled");
    } else if view.failed == 0 {
        success(format!("{} of {} records processed", view.processed, view.total));
    } else {
        warning(format!("{} failures", view.failed));
    }
    Ok(())
}

/// Print analyses as a table.
pub fn analyses(analyses: &[StockAnalysis], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return json(&analyses);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Symbol", "Last close", "Avg close", "Target high", "Target low"]);
    for a in analyses {
        table.add_row(vec![
            a.symbol.clone(),
            format!("{:.2}", a.last_close),
            format!("{:.2}", a.average_close),
            format!("{:.2}", a.target_high),
            format!("{:.2}", a.target_low),
        ]);
    }
    println!("{table}");
    Ok(())
}
