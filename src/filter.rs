//! Date-range and job selection
//!
//! A [`DateRange`] is resolved once, up front, from the command-line request
//! and the current date. Records are then selected with [`JobFilter`], which
//! combines the date window with the user scope, the job-name pattern and the
//! excluded queues.

use crate::error::ConfigError;
use crate::models::{JobRecord, UserScope};
use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Inclusive range of calendar days, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

/// Raw range options as given on the command line (`YYYYMMDD` strings).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub days: Option<u32>,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigError> {
        if end < start {
            return Err(ConfigError::EndBeforeStart { start, end });
        }
        Ok(Self { start, end })
    }

    /// The last `days` days up to and including `today`.
    pub fn from_days(days: u32, today: NaiveDate) -> Result<Self, ConfigError> {
        if days == 0 {
            return Err(ConfigError::NonPositiveDays);
        }
        let start = today
            .checked_sub_days(Days::new(u64::from(days)))
            .ok_or_else(|| ConfigError::Invalid(format!("--days {days} reaches before the calendar start")))?;
        Self::new(start, today)
    }

    /// Resolve a request against `today`. `--start_date` and `--days` are
    /// mutually exclusive; a missing end date means today.
    pub fn resolve(request: &RangeRequest, today: NaiveDate) -> Result<Self, ConfigError> {
        match (&request.start_date, request.days) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingRange),
            (None, Some(days)) => {
                if let Some(end) = &request.end_date {
                    warn!(end_date = %end, "--end_date is ignored when --days is given");
                }
                Self::from_days(days, today)
            }
            (Some(start), None) => {
                let start = parse_date_arg(start)?;
                let end = match &request.end_date {
                    Some(end) => parse_date_arg(end)?,
                    None => today,
                };
                Self::new(start, end)
            }
            (None, None) if request.end_date.is_some() => Err(ConfigError::EndWithoutStart),
            (None, None) => Err(ConfigError::MissingRange),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Parse a command-line date in `YYYYMMDD` form.
pub fn parse_date_arg(text: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(text.trim(), "%Y%m%d")
        .map_err(|_| ConfigError::InvalidDate(text.to_string()))
}

/// Whether a job end timestamp falls inside the range, at day granularity.
pub fn in_range(end_timestamp: NaiveDateTime, range: &DateRange) -> bool {
    range.contains(end_timestamp.date())
}

/// Job-name selection. `all` disables filtering, a pattern with glob
/// metacharacters must match the whole name, anything else is a substring.
#[derive(Debug, Clone)]
pub enum JobNamePattern {
    Any,
    Glob(glob::Pattern),
    Substring(String),
}

impl JobNamePattern {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("all") {
            return Ok(JobNamePattern::Any);
        }
        if text.contains(['*', '?', '[']) {
            let pattern = glob::Pattern::new(text)
                .map_err(|e| ConfigError::Invalid(format!("job name pattern '{text}': {e}")))?;
            return Ok(JobNamePattern::Glob(pattern));
        }
        Ok(JobNamePattern::Substring(text.to_string()))
    }

    /// Jobs without a name only pass when no pattern is set.
    pub fn matches(&self, name: Option<&str>) -> bool {
        match (self, name) {
            (JobNamePattern::Any, _) => true,
            (_, None) => false,
            (JobNamePattern::Glob(pattern), Some(name)) => pattern.matches(name),
            (JobNamePattern::Substring(needle), Some(name)) => name.contains(needle.as_str()),
        }
    }
}

/// Every selection criterion applied before aggregation.
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub range: DateRange,
    pub scope: UserScope,
    pub job_name: JobNamePattern,
    pub excluded_queues: Vec<String>,
}

impl JobFilter {
    pub fn new(range: DateRange, scope: UserScope) -> Self {
        Self {
            range,
            scope,
            job_name: JobNamePattern::Any,
            excluded_queues: Vec::new(),
        }
    }

    pub fn with_job_name(mut self, pattern: JobNamePattern) -> Self {
        self.job_name = pattern;
        self
    }

    pub fn with_excluded_queues(mut self, queues: Vec<String>) -> Self {
        self.excluded_queues = queues;
        self
    }

    pub fn accepts(&self, record: &JobRecord) -> bool {
        in_range(record.end_timestamp, &self.range)
            && self.scope.matches(&record.user)
            && self.job_name.matches(record.job_name.as_deref())
            && !record
                .queue
                .as_deref()
                .is_some_and(|q| self.excluded_queues.iter().any(|x| x == q))
    }
}
