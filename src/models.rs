//! Core Data Models
//!
//! This module defines the job record that flows through the analysis
//! pipeline and the user scope that selects which records are reported.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: one log line per completed job
//! 2. **Parsing**: [`JobRecord`] - typed, normalized form of a line
//! 3. **Aggregation**: [`crate::aggregate::AggregateStats`] and
//!    [`crate::aggregate::UserAggregate`]
//! 4. **Output**: [`crate::report::Report`]
//!
//! Derived quantities (unused memory in GB and as a percentage) are computed
//! on demand and never stored on the record.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One completed job, parsed and normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Option<String>,
    pub user: String,
    pub queue: Option<String>,
    pub job_name: Option<String>,
    pub requested_memory_gb: f64,
    /// May exceed the request; logs are taken as they are.
    pub used_memory_gb: f64,
    pub cpu_percent: Option<f64>,
    pub elapsed_hours: f64,
    pub walltime_hours: Option<f64>,
    pub start_timestamp: Option<NaiveDateTime>,
    pub end_timestamp: NaiveDateTime,
}

impl JobRecord {
    /// Requested minus used memory. Negative when the job used more than it
    /// asked for.
    pub fn unused_memory_gb(&self) -> f64 {
        self.requested_memory_gb - self.used_memory_gb
    }

    /// Unused memory as a percentage of the request; `None` when nothing was
    /// requested.
    pub fn unused_memory_pct(&self) -> Option<f64> {
        if self.requested_memory_gb > 0.0 {
            Some(100.0 * self.unused_memory_gb() / self.requested_memory_gb)
        } else {
            None
        }
    }

    /// Unused memory integrated over the run time, in GB·h.
    pub fn unused_core_hours(&self) -> f64 {
        self.unused_memory_gb() * self.elapsed_hours
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_timestamp.date()
    }

    /// Label used in diagnostics: the job id, or the user and end time.
    pub fn label(&self) -> String {
        match &self.job_id {
            Some(id) => id.clone(),
            None => format!("{}@{}", self.user, self.end_timestamp),
        }
    }
}

/// Which users a report covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "user", rename_all = "snake_case")]
pub enum UserScope {
    Single(String),
    All,
}

impl UserScope {
    /// The literal `all` selects every user; anything else names one user.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("all") {
            UserScope::All
        } else {
            UserScope::Single(value.to_string())
        }
    }

    pub fn matches(&self, user: &str) -> bool {
        match self {
            UserScope::All => true,
            UserScope::Single(name) => name == user,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, UserScope::All)
    }
}

impl fmt::Display for UserScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserScope::All => write!(f, "all users"),
            UserScope::Single(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_record(user: &str, requested: f64, used: f64, elapsed: f64) -> JobRecord {
    JobRecord {
        job_id: None,
        user: user.to_string(),
        queue: None,
        job_name: None,
        requested_memory_gb: requested,
        used_memory_gb: used,
        cpu_percent: None,
        elapsed_hours: elapsed,
        walltime_hours: None,
        start_timestamp: None,
        end_timestamp: NaiveDate::from_ymd_opt(2024, 3, 4)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("valid test timestamp"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unused_memory_pct() {
        let record = test_record("alice", 25.0, 5.0, 2.0);
        assert_eq!(record.unused_memory_gb(), 20.0);
        assert_eq!(record.unused_memory_pct(), Some(80.0));
        assert_eq!(record.unused_core_hours(), 40.0);
    }

    #[test]
    fn test_zero_request_has_no_percentage() {
        let record = test_record("alice", 0.0, 1.0, 2.0);
        assert_eq!(record.unused_memory_pct(), None);
        assert_eq!(record.unused_memory_gb(), -1.0);
    }

    #[test]
    fn test_overuse_is_negative() {
        let record = test_record("bob", 10.0, 15.0, 1.0);
        assert_eq!(record.unused_memory_pct(), Some(-50.0));
    }

    #[test]
    fn test_user_scope() {
        assert_eq!(UserScope::parse("ALL"), UserScope::All);
        let scope = UserScope::parse("alice");
        assert!(scope.matches("alice"));
        assert!(!scope.matches("bob"));
        assert!(UserScope::All.matches("bob"));
        assert_eq!(scope.to_string(), "alice");
    }
}
