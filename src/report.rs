//! Report assembly
//!
//! Turns aggregated statistics into a [`Report`], the single value every
//! output shape renders from. No formatting happens here: numbers stay
//! numbers and the renderers in [`crate::display`] decide how to print them.

use crate::aggregate::{AggregateOutput, AggregateStats, ExtremeJob, HistogramSummary, MetricSummary};
use crate::filter::DateRange;
use crate::models::UserScope;
use serde::Serialize;

/// What a report was computed over.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportContext {
    pub range: DateRange,
    pub scope: UserScope,
    /// Job-name pattern as given, `all` when unfiltered.
    pub job_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub name: &'static str,
    pub unit: &'static str,
    #[serde(flatten)]
    pub summary: MetricSummary,
}

/// Descriptive statistics for one group of jobs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryBlock {
    pub context: ReportContext,
    pub job_count: usize,
    pub no_data: bool,
    pub metrics: Vec<MetricRow>,
    pub unused_histogram: HistogramSummary,
    pub cpu_histogram: HistogramSummary,
    pub unused_core_hours: f64,
    pub most_unused: Option<ExtremeJob>,
    pub least_unused: Option<ExtremeJob>,
}

impl SummaryBlock {
    fn from_stats(stats: AggregateStats, context: ReportContext) -> Self {
        let metrics = vec![
            MetricRow {
                name: "Unused memory",
                unit: "%",
                summary: stats.unused_memory_pct,
            },
            MetricRow {
                name: "Requested memory",
                unit: "GB",
                summary: stats.requested_memory_gb,
            },
            MetricRow {
                name: "Used memory",
                unit: "GB",
                summary: stats.used_memory_gb,
            },
            MetricRow {
                name: "Unused memory",
                unit: "GB",
                summary: stats.unused_memory_gb,
            },
            MetricRow {
                name: "CPU usage",
                unit: "%",
                summary: stats.cpu_percent,
            },
            MetricRow {
                name: "Elapsed time",
                unit: "h",
                summary: stats.elapsed_hours,
            },
            MetricRow {
                name: "Walltime",
                unit: "h",
                summary: stats.walltime_hours,
            },
        ];

        Self {
            context,
            job_count: stats.job_count,
            no_data: stats.job_count == 0,
            metrics,
            unused_histogram: stats.unused_histogram,
            cpu_histogram: stats.cpu_histogram,
            unused_core_hours: stats.unused_core_hours,
            most_unused: stats.most_unused,
            least_unused: stats.least_unused,
        }
    }

    pub fn metric(&self, name: &str, unit: &str) -> Option<&MetricRow> {
        self.metrics
            .iter()
            .find(|row| row.name == name && row.unit == unit)
    }
}

/// One line of the all-users ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRow {
    pub user: String,
    pub job_count: usize,
    pub mean_requested_gb: Option<f64>,
    pub mean_unused_gb: Option<f64>,
    pub mean_unused_pct: Option<f64>,
    pub mean_elapsed_hours: Option<f64>,
    pub unused_core_hours: f64,
}

impl UserRow {
    fn from_stats(user: String, stats: &AggregateStats) -> Self {
        Self {
            user,
            job_count: stats.job_count,
            mean_requested_gb: stats.requested_memory_gb.mean,
            mean_unused_gb: stats.unused_memory_gb.mean,
            mean_unused_pct: stats.unused_memory_pct.mean,
            mean_elapsed_hours: stats.elapsed_hours.mean,
            unused_core_hours: stats.unused_core_hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Report {
    SingleUser(SummaryBlock),
    AllUsers {
        global: SummaryBlock,
        /// Descending unused core-hours, ties by user name.
        users: Vec<UserRow>,
    },
}

impl Report {
    pub fn assemble(output: AggregateOutput, context: ReportContext) -> Report {
        if !context.scope.is_all() {
            return Report::SingleUser(SummaryBlock::from_stats(output.global, context));
        }

        let mut users: Vec<UserRow> = output
            .per_user
            .iter()
            .map(|group| UserRow::from_stats(group.user.clone(), &group.stats))
            .collect();
        users.sort_by(|a, b| {
            b.unused_core_hours
                .total_cmp(&a.unused_core_hours)
                .then_with(|| a.user.cmp(&b.user))
        });

        Report::AllUsers {
            global: SummaryBlock::from_stats(output.global, context),
            users,
        }
    }

    pub fn summary(&self) -> &SummaryBlock {
        match self {
            Report::SingleUser(block) => block,
            Report::AllUsers { global, .. } => global,
        }
    }

    /// Per-user ranking; empty for a single-user report.
    pub fn users(&self) -> &[UserRow] {
        match self {
            Report::SingleUser(_) => &[],
            Report::AllUsers { users, .. } => users,
        }
    }

    pub fn no_data(&self) -> bool {
        self.summary().no_data
    }
}

#[cfg(test)]
pub(crate) fn test_context(scope: UserScope) -> ReportContext {
    use chrono::NaiveDate;

    let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).expect("valid test date");
    ReportContext {
        range: DateRange::new(day(1), day(5)).expect("valid test range"),
        scope,
        job_name: "all".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::models::test_record;

    #[test]
    fn test_single_user_report() {
        let jobs = vec![
            test_record("alice", 25.0, 5.0, 2.0),
            test_record("alice", 25.0, 0.0, 1.0),
            test_record("alice", 10.0, 10.0, 0.5),
        ];
        let scope = UserScope::parse("alice");
        let report = Report::assemble(aggregate(&jobs, &scope), test_context(scope));

        let Report::SingleUser(block) = &report else {
            panic!("expected a single-user report");
        };
        assert_eq!(block.job_count, 3);
        assert!(!block.no_data);
        assert_eq!(block.metric("Unused memory", "%").and_then(|m| m.summary.mean), Some(60.0));
        assert_eq!(block.unused_core_hours, 65.0);
        assert!(report.users().is_empty());
    }

    #[test]
    fn test_users_ranked_by_core_hours() {
        let jobs = vec![
            test_record("carol", 4.0, 2.0, 1.0),
            test_record("alice", 10.0, 0.0, 3.0),
            test_record("bob", 4.0, 2.0, 1.0),
        ];
        let report = Report::assemble(
            aggregate(&jobs, &UserScope::All),
            test_context(UserScope::All),
        );

        let order: Vec<_> = report.users().iter().map(|u| u.user.as_str()).collect();
        assert_eq!(order, vec!["alice", "bob", "carol"]);
        assert_eq!(report.users()[0].unused_core_hours, 30.0);
        assert_eq!(report.users()[0].mean_unused_pct, Some(100.0));
        assert_eq!(report.summary().job_count, 3);
    }

    #[test]
    fn test_empty_report_flags_no_data() {
        let report = Report::assemble(
            aggregate(&[], &UserScope::All),
            test_context(UserScope::All),
        );
        assert!(report.no_data());
        assert!(report.users().is_empty());
        assert!(report.summary().metrics.iter().all(|m| m.summary.mean.is_none()));
    }
}
