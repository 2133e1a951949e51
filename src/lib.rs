//! Job Memory Report Library
//!
//! Analyzes job-history logs from an HPC scheduler and reports how much of the
//! requested memory completed jobs actually used.
//!
//! ## Core Features
//!
//! - **Schema-driven parsing**: log layouts are described by a [`schema::LogSchema`];
//!   `qhist` CSV and a whitespace layout ship as presets
//! - **Unit normalization**: memory in any suffix becomes GB, durations become hours
//! - **Selection**: date range, user or all users, job-name pattern, excluded queues
//! - **Statistics**: mean/median/min/max per metric, unused-memory and CPU
//!   histograms, per-user unused core-hours
//! - **Output**: narrative text, tables, JSON, and a per-user CSV ranking
//!
//! ## Architecture Overview
//!
//! - [`units`] - Memory, duration and timestamp normalization
//! - [`schema`] - Log layout descriptors and presets
//! - [`parser`] - Line parsing and streaming over a reader
//! - [`filter`] - Date ranges and job selection
//! - [`aggregate`] - Single-pass statistics with mergeable partial results
//! - [`report`] - Report assembly
//! - [`display`] - Narrative, tabular and JSON rendering
//! - [`analyzer`] - The end-to-end pipeline
//! - [`source`] - Fetching the log with `qhist`
//! - [`config`] - Configuration with environment variable support
//! - [`logging`] - Structured logging with JSON and pretty-print formats
//! - [`cli`] - Command-line flags and the top-level run
//!
//! ## Example
//!
//! ```rust
//! use job_memory_report::{JobAnalyzer, JobFilter, DateRange, ReportContext, UserScope};
//! use job_memory_report::schema::LogSchema;
//! use chrono::NaiveDate;
//!
//! # fn example() -> anyhow::Result<()> {
//! let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
//! let range = DateRange::new(day(1), day(31))?;
//! let scope = UserScope::parse("alice");
//!
//! let log = "1 alice casper 25gb 5gb 50 02:00:00 04:00:00 2024-03-02T10:00:00 train\n";
//! let analyzer = JobAnalyzer::new(LogSchema::plain())?;
//! let context = ReportContext { range, scope: scope.clone(), job_name: "all".into() };
//! let analysis = analyzer.analyze_reader(log.as_bytes(), &JobFilter::new(range, scope), context)?;
//!
//! assert_eq!(analysis.report.summary().job_count, 1);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod filter;
pub mod logging;
pub mod models;
pub mod parser;
pub mod report;
pub mod schema;
pub mod source;
pub mod units;

pub use aggregate::{AggregateOutput, AggregateStats, Aggregator};
pub use analyzer::{Analysis, JobAnalyzer};
pub use error::{ConfigError, ParseSkip, UnitParseError};
pub use filter::{DateRange, JobFilter, RangeRequest};
pub use models::{JobRecord, UserScope};
pub use report::{Report, ReportContext};
