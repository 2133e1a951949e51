//! Command-line interface
//!
//! Flags are parsed by clap; combinations clap cannot judge on its own (the
//! date-range flags) are validated by [`DateRange::resolve`] so the rules live
//! in one place.

use crate::analyzer::JobAnalyzer;
use crate::config::Config;
use crate::display::{write_user_csv, DisplayManager, ReportShape};
use crate::error::ConfigError;
use crate::filter::{DateRange, JobFilter, JobNamePattern, RangeRequest};
use crate::models::UserScope;
use crate::report::{Report, ReportContext};
use crate::schema::SchemaPreset;
use crate::source::QhistCommand;
use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "job-memory-report")]
#[command(about = "Report memory and CPU utilization of completed scheduler jobs")]
#[command(version)]
pub struct Cli {
    /// First day of the range (YYYYMMDD)
    #[arg(short = 's', long = "start_date", value_name = "YYYYMMDD")]
    pub start_date: Option<String>,

    /// Last day of the range (YYYYMMDD), defaults to today
    #[arg(short = 'e', long = "end_date", value_name = "YYYYMMDD")]
    pub end_date: Option<String>,

    /// Look back this many days from today
    #[arg(short = 'd', long)]
    pub days: Option<u32>,

    /// User to report on, or `all`
    #[arg(short = 'u', long)]
    pub user: Option<String>,

    /// Job-history log to analyze
    #[arg(long)]
    pub filename: Option<PathBuf>,

    /// Print descriptive-statistics tables
    #[arg(short = 't', long)]
    pub table: bool,

    /// Print the report as JSON
    #[arg(long, conflicts_with = "table")]
    pub json: bool,

    /// Debug diagnostics on stderr
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Job-name pattern (glob or substring), `all` for every job
    #[arg(long = "job", visible_alias = "worker", value_name = "PATTERN")]
    pub job: Option<String>,

    /// Log layout
    #[arg(long, value_enum)]
    pub schema: Option<SchemaPreset>,

    /// Write the per-user ranking to a CSV file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Run qhist for the range and user before analyzing
    #[arg(long)]
    pub fetch: bool,

    /// Configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn range_request(&self) -> RangeRequest {
        RangeRequest {
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            days: self.days,
        }
    }

    pub fn shape(&self) -> ReportShape {
        if self.json {
            ReportShape::Json
        } else if self.table {
            ReportShape::Tabular
        } else {
            ReportShape::Narrative
        }
    }
}

/// Run one report: resolve the selection, optionally fetch the log, analyze
/// it, and print the result.
pub fn run(cli: &Cli, config: &Config, today: NaiveDate) -> Result<Report> {
    let range = DateRange::resolve(&cli.range_request(), today)?;

    let user = cli
        .user
        .clone()
        .or_else(|| config.default_user())
        .ok_or_else(|| ConfigError::Invalid("no user given and $USER is not set".to_string()))?;
    let scope = UserScope::parse(&user);

    let job_name = cli
        .job
        .clone()
        .unwrap_or_else(|| config.filters.job_name.clone());
    let filter = JobFilter::new(range, scope.clone())
        .with_job_name(JobNamePattern::parse(&job_name)?)
        .with_excluded_queues(config.filters.excluded_queues.clone());

    let schema = match cli.schema {
        Some(preset) => preset.schema(),
        None => config.schema.resolve(),
    };
    let log_file = cli
        .filename
        .clone()
        .unwrap_or_else(|| config.paths.log_file.clone());

    info!(range = %range, scope = %scope, job = %job_name, log = %log_file.display(), "Starting report");

    if cli.fetch {
        QhistCommand::new(config.fetch.program.as_str(), range, scope.clone()).fetch_to(&log_file)?;
    }

    let analyzer = JobAnalyzer::new(schema)?;
    let context = ReportContext {
        range,
        scope: scope.clone(),
        job_name,
    };
    let analysis = analyzer.analyze_file(&log_file, &filter, context)?;

    DisplayManager::new(cli.shape())
        .with_json_pretty(config.output.json_pretty)
        .display(&analysis.report)?;

    if let Some(path) = &cli.report {
        if scope.is_all() {
            write_user_csv(path, analysis.report.users())?;
            info!(path = %path.display(), "Per-user report written");
        } else {
            warn!("--report only applies with --user all; nothing written");
        }
    }

    Ok(analysis.report)
}
