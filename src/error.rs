//! Error types
//!
//! Three families of failure exist in a run:
//!
//! - [`ConfigError`] aborts the run before any log line is read.
//! - [`ParseSkip`] drops a single log line; processing continues.
//! - [`UnitParseError`] is raised by the unit normalizer and surfaces to callers
//!   as [`ParseSkip::Unit`].
//!
//! An empty result is not an error at all: it is reported through the
//! `no_data` flag of the assembled report.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems, raised before parsing starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("please use either --start_date or --days, not both")]
    ConflictingRange,

    #[error("either --start_date or --days must be provided")]
    MissingRange,

    #[error("--end_date requires --start_date")]
    EndWithoutStart,

    #[error("--days must be greater than 0")]
    NonPositiveDays,

    #[error("invalid date '{0}', expected YYYYMMDD")]
    InvalidDate(String),

    #[error("end date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },

    #[error("cannot open log file {}: {source}", path.display())]
    LogUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid log schema: {0}")]
    InvalidSchema(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to fetch job history: {0}")]
    Fetch(String),
}

/// Failure to normalize a textual quantity.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitParseError {
    #[error("unknown memory unit '{0}'")]
    UnknownMemoryUnit(String),

    #[error("invalid memory quantity '{0}'")]
    InvalidMemory(String),

    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// Reason a single log line was dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseSkip {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("missing value for required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid number '{value}' in field '{field}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("empty user field")]
    EmptyUser,

    #[error(transparent)]
    Unit(#[from] UnitParseError),
}

impl ParseSkip {
    /// Short stable label used to bucket skip counts in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ParseSkip::FieldCount { .. } => "field_count",
            ParseSkip::MissingField(_) => "missing_field",
            ParseSkip::InvalidNumber { .. } => "invalid_number",
            ParseSkip::EmptyUser => "empty_user",
            ParseSkip::Unit(UnitParseError::InvalidTimestamp(_)) => "invalid_timestamp",
            ParseSkip::Unit(_) => "invalid_unit",
        }
    }
}
