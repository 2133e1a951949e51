//! Output Formatting and Display Management
//!
//! Renders a [`Report`] in one of three shapes:
//!
//! - **Narrative**: colored text block for the terminal
//! - **Tabular**: descriptive-statistics tables built with `comfy-table`
//! - **Json**: the report serialized with `serde_json`
//!
//! Every renderer is a pure function of the report and returns a `String`;
//! [`DisplayManager`] picks the renderer and prints to stdout. The per-user
//! ranking can also be written to a CSV file with [`write_user_csv`].

use crate::aggregate::{HistogramSummary, MetricSummary};
use crate::report::{Report, SummaryBlock, UserRow};
use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportShape {
    #[default]
    Narrative,
    Tabular,
    Json,
}

pub struct DisplayManager {
    shape: ReportShape,
    json_pretty: bool,
}

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new(ReportShape::Narrative)
    }
}

impl DisplayManager {
    pub fn new(shape: ReportShape) -> Self {
        Self {
            shape,
            json_pretty: true,
        }
    }

    pub fn with_json_pretty(mut self, pretty: bool) -> Self {
        self.json_pretty = pretty;
        self
    }

    pub fn render(&self, report: &Report) -> Result<String> {
        match self.shape {
            ReportShape::Narrative => Ok(render_narrative(report)),
            ReportShape::Tabular => Ok(render_table(report)),
            ReportShape::Json => render_json(report, self.json_pretty),
        }
    }

    pub fn display(&self, report: &Report) -> Result<()> {
        let output = self.render(report)?;
        println!("{}", output);
        Ok(())
    }
}

fn value(v: Option<f64>, unit: &str) -> String {
    match v {
        Some(v) if unit == "%" => format!("{:.2}%", v),
        Some(v) => format!("{:.2} {}", v, unit),
        None => "-".to_string(),
    }
}

fn plain(v: Option<f64>) -> String {
    v.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

fn heading(block: &SummaryBlock) -> String {
    format!(
        "Memory usage report for {} ({} to {}, jobs: {})",
        block.context.scope,
        block.context.range.start(),
        block.context.range.end(),
        block.context.job_name
    )
}

fn no_jobs_line(block: &SummaryBlock) -> String {
    format!(
        "No jobs found for {} between {} and {}.",
        block.context.scope,
        block.context.range.start(),
        block.context.range.end()
    )
}

fn narrative_histogram(out: &mut String, title: &str, histogram: &HistogramSummary) {
    if histogram.total == 0 {
        return;
    }
    let _ = writeln!(out, "\n{}", title.bright_white().bold());
    for row in &histogram.rows {
        let _ = writeln!(
            out,
            "  {:<8} {:>7}  ({} jobs)",
            row.bucket.label().bright_cyan(),
            format!("{:.2}%", row.percent).bright_yellow(),
            row.count
        );
    }
}

fn narrative_metric(out: &mut String, name: &str, unit: &str, summary: &MetricSummary) {
    if summary.count == 0 {
        return;
    }
    let _ = writeln!(
        out,
        "{:<18} mean {}, median {} (min {}, max {})",
        format!("{} ({}):", name, unit).bright_cyan(),
        value(summary.mean, unit).bright_white().bold(),
        value(summary.median, unit),
        value(summary.min, unit),
        value(summary.max, unit)
    );
}

fn narrative_block(out: &mut String, block: &SummaryBlock) {
    let rule = "=".repeat(72);
    let _ = writeln!(out, "{}", rule.bright_cyan());
    let _ = writeln!(out, "{}", heading(block).bright_white().bold());
    let _ = writeln!(out, "{}", rule.bright_cyan());

    if block.no_data {
        let _ = writeln!(out, "\n{}", no_jobs_line(block).yellow());
        return;
    }

    let _ = writeln!(
        out,
        "\n{} {}\n",
        "Jobs analysed:".bright_white(),
        block.job_count.to_string().bright_white().bold()
    );
    for metric in &block.metrics {
        narrative_metric(out, metric.name, metric.unit, &metric.summary);
    }

    narrative_histogram(out, "Unused memory distribution", &block.unused_histogram);
    narrative_histogram(out, "CPU usage distribution", &block.cpu_histogram);

    let _ = writeln!(
        out,
        "\n{} {}",
        "Unused core-hours:".bright_white(),
        format!("{:.2} GB·h", block.unused_core_hours).bright_green().bold()
    );
    if let Some(job) = &block.most_unused {
        let _ = writeln!(out, "Most unused:  {} ({:.2}%)", job.label, job.unused_memory_pct);
    }
    if let Some(job) = &block.least_unused {
        let _ = writeln!(out, "Least unused: {} ({:.2}%)", job.label, job.unused_memory_pct);
    }
}

pub fn render_narrative(report: &Report) -> String {
    let mut out = String::new();
    narrative_block(&mut out, report.summary());

    let users = report.users();
    if !users.is_empty() {
        let _ = writeln!(out, "\n{}", "Users by unused core-hours".bright_white().bold());
        for (rank, user) in users.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:>3}. {:<12} {:>5} jobs  {} unused  (mean {} of {} requested)",
                rank + 1,
                user.user.bright_cyan(),
                user.job_count,
                format!("{:.2} GB·h", user.unused_core_hours).bright_green(),
                value(user.mean_unused_pct, "%"),
                value(user.mean_requested_gb, "GB")
            );
        }
    }

    out
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

fn histogram_table(title: &str, histogram: &HistogramSummary) -> Table {
    let mut table = new_table(vec![title, "Jobs", "Share (%)"]);
    for row in &histogram.rows {
        table.add_row(vec![
            row.bucket.label().to_string(),
            row.count.to_string(),
            format!("{:.2}", row.percent),
        ]);
    }
    table
}

fn users_table(users: &[UserRow]) -> Table {
    let mut table = new_table(vec![
        "User",
        "Jobs",
        "Mean requested (GB)",
        "Mean unused (GB)",
        "Mean unused (%)",
        "Mean elapsed (h)",
        "Unused core-hours",
    ]);
    for user in users {
        table.add_row(vec![
            user.user.clone(),
            user.job_count.to_string(),
            plain(user.mean_requested_gb),
            plain(user.mean_unused_gb),
            plain(user.mean_unused_pct),
            plain(user.mean_elapsed_hours),
            format!("{:.2}", user.unused_core_hours),
        ]);
    }
    table
}

pub fn render_table(report: &Report) -> String {
    let block = report.summary();
    let mut out = String::new();
    let _ = writeln!(out, "{}", heading(block));

    if block.no_data {
        let _ = writeln!(out, "{}", no_jobs_line(block));
        return out;
    }

    let mut stats = new_table(vec!["Metric", "Count", "Mean", "Median", "Min", "Max"]);
    for metric in &block.metrics {
        let s = &metric.summary;
        stats.add_row(vec![
            format!("{} ({})", metric.name, metric.unit),
            s.count.to_string(),
            plain(s.mean),
            plain(s.median),
            plain(s.min),
            plain(s.max),
        ]);
    }
    let _ = writeln!(out, "{}", stats);
    let _ = writeln!(out, "{}", histogram_table("Unused memory", &block.unused_histogram));
    if block.cpu_histogram.total > 0 {
        let _ = writeln!(out, "{}", histogram_table("CPU usage", &block.cpu_histogram));
    }
    let _ = writeln!(out, "Jobs: {}  Unused core-hours: {:.2}", block.job_count, block.unused_core_hours);

    let users = report.users();
    if !users.is_empty() {
        let _ = writeln!(out, "{}", users_table(users));
    }

    out
}

pub fn render_json(report: &Report, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    };
    json.context("Failed to serialize report to JSON")
}

/// Write the per-user ranking as CSV, one row per user in ranking order.
pub fn write_user_csv(path: &Path, users: &[UserRow]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create report file {}", path.display()))?;
    wtr.write_record([
        "user",
        "jobs",
        "mean_requested_gb",
        "mean_unused_gb",
        "mean_unused_pct",
        "mean_elapsed_hours",
        "unused_core_hours",
    ])?;
    let cell = |v: Option<f64>| v.map(|v| format!("{:.2}", v)).unwrap_or_default();
    for user in users {
        wtr.write_record([
            user.user.clone(),
            user.job_count.to_string(),
            cell(user.mean_requested_gb),
            cell(user.mean_unused_gb),
            cell(user.mean_unused_pct),
            cell(user.mean_elapsed_hours),
            format!("{:.2}", user.unused_core_hours),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
