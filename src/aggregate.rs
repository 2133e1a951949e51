//! Statistics over accepted job records
//!
//! The [`Aggregator`] consumes records one at a time and keeps, per metric,
//! the raw values it has seen so medians stay exact. Two aggregators over
//! disjoint record sets can be merged, which is how the optional parallel
//! path combines per-thread partial results.
//!
//! Values are sorted before they are summed, so every summary is independent
//! of the order in which records arrived.

use crate::models::{JobRecord, UserScope};
use serde::Serialize;
use std::collections::BTreeMap;

/// Count, mean, min, max and median of one metric. Every field except the
/// count is `None` when the metric had no defined value.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct MetricSummary {
    pub count: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub median: Option<f64>,
}

#[derive(Debug, Clone, Default)]
struct MetricAccumulator {
    values: Vec<f64>,
}

impl MetricAccumulator {
    fn push(&mut self, value: f64) {
        if value.is_finite() {
            self.values.push(value);
        }
    }

    fn push_opt(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.push(value);
        }
    }

    fn merge(&mut self, other: MetricAccumulator) {
        self.values.extend(other.values);
    }

    fn sorted(&self) -> Vec<f64> {
        let mut values = self.values.clone();
        values.sort_by(f64::total_cmp);
        values
    }

    fn sum(&self) -> f64 {
        self.sorted().iter().sum()
    }

    fn summary(&self) -> MetricSummary {
        let values = self.sorted();
        let count = values.len();
        if count == 0 {
            return MetricSummary::default();
        }

        let sum: f64 = values.iter().sum();
        let mid = count / 2;
        let median = if count % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        };

        MetricSummary {
            count,
            mean: Some(sum / count as f64),
            min: values.first().copied(),
            max: values.last().copied(),
            median: Some(median),
        }
    }
}

/// Percentage bands used for both the unused-memory and CPU histograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    AtLeast75,
    From50To75,
    From25To50,
    Below25,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::AtLeast75,
        Bucket::From50To75,
        Bucket::From25To50,
        Bucket::Below25,
    ];

    /// Bucket for a percentage. Values above 100 land in the top band and
    /// negative values in the bottom one.
    pub fn of(pct: f64) -> Bucket {
        if pct >= 75.0 {
            Bucket::AtLeast75
        } else if pct >= 50.0 {
            Bucket::From50To75
        } else if pct >= 25.0 {
            Bucket::From25To50
        } else {
            Bucket::Below25
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Bucket::AtLeast75 => ">=75%",
            Bucket::From50To75 => "50-75%",
            Bucket::From25To50 => "25-50%",
            Bucket::Below25 => "<25%",
        }
    }

    fn index(self) -> usize {
        match self {
            Bucket::AtLeast75 => 0,
            Bucket::From50To75 => 1,
            Bucket::From25To50 => 2,
            Bucket::Below25 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Histogram {
    counts: [usize; 4],
}

impl Histogram {
    fn push(&mut self, pct: f64) {
        if pct.is_finite() {
            self.counts[Bucket::of(pct).index()] += 1;
        }
    }

    fn merge(&mut self, other: Histogram) {
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts) {
            *mine += theirs;
        }
    }

    fn summary(&self) -> HistogramSummary {
        let total: usize = self.counts.iter().sum();
        let rows = Bucket::ALL
            .iter()
            .map(|&bucket| {
                let count = self.counts[bucket.index()];
                let percent = if total == 0 {
                    0.0
                } else {
                    round2(100.0 * count as f64 / total as f64)
                };
                HistogramRow {
                    bucket,
                    count,
                    percent,
                }
            })
            .collect();
        HistogramSummary { total, rows }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramRow {
    pub bucket: Bucket,
    pub count: usize,
    /// Share of the histogram total, rounded to two decimals.
    pub percent: f64,
}

/// Four rows, highest band first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSummary {
    pub total: usize,
    pub rows: Vec<HistogramRow>,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A job singled out for its unused-memory percentage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtremeJob {
    pub label: String,
    pub unused_memory_pct: f64,
}

#[derive(Debug, Clone, Copy)]
enum Extreme {
    Highest,
    Lowest,
}

impl Extreme {
    // Ties go to the smaller label so the pick does not depend on order.
    fn prefer(self, candidate: &ExtremeJob, current: &ExtremeJob) -> bool {
        let ordering = candidate
            .unused_memory_pct
            .total_cmp(&current.unused_memory_pct);
        match ordering {
            std::cmp::Ordering::Equal => candidate.label < current.label,
            std::cmp::Ordering::Greater => matches!(self, Extreme::Highest),
            std::cmp::Ordering::Less => matches!(self, Extreme::Lowest),
        }
    }

    fn offer(self, slot: &mut Option<ExtremeJob>, candidate: ExtremeJob) {
        let replace = match slot {
            Some(current) => self.prefer(&candidate, current),
            None => true,
        };
        if replace {
            *slot = Some(candidate);
        }
    }
}

/// Running state for one group of records (everyone, or one user).
#[derive(Debug, Clone, Default)]
struct StatsAccumulator {
    job_count: usize,
    unused_pct: MetricAccumulator,
    requested: MetricAccumulator,
    used: MetricAccumulator,
    unused_gb: MetricAccumulator,
    cpu: MetricAccumulator,
    elapsed: MetricAccumulator,
    walltime: MetricAccumulator,
    core_hours: MetricAccumulator,
    unused_histogram: Histogram,
    cpu_histogram: Histogram,
    most_unused: Option<ExtremeJob>,
    least_unused: Option<ExtremeJob>,
}

impl StatsAccumulator {
    fn push(&mut self, record: &JobRecord) {
        self.job_count += 1;
        self.requested.push(record.requested_memory_gb);
        self.used.push(record.used_memory_gb);
        self.unused_gb.push(record.unused_memory_gb());
        self.elapsed.push(record.elapsed_hours);
        self.walltime.push_opt(record.walltime_hours);
        self.core_hours.push(record.unused_core_hours());

        if let Some(cpu) = record.cpu_percent {
            self.cpu.push(cpu);
            self.cpu_histogram.push(cpu);
        }

        if let Some(pct) = record.unused_memory_pct() {
            self.unused_pct.push(pct);
            self.unused_histogram.push(pct);
            let job = ExtremeJob {
                label: record.label(),
                unused_memory_pct: pct,
            };
            Extreme::Lowest.offer(&mut self.least_unused, job.clone());
            Extreme::Highest.offer(&mut self.most_unused, job);
        }
    }

    fn merge(&mut self, other: StatsAccumulator) {
        self.job_count += other.job_count;
        self.unused_pct.merge(other.unused_pct);
        self.requested.merge(other.requested);
        self.used.merge(other.used);
        self.unused_gb.merge(other.unused_gb);
        self.cpu.merge(other.cpu);
        self.elapsed.merge(other.elapsed);
        self.walltime.merge(other.walltime);
        self.core_hours.merge(other.core_hours);
        self.unused_histogram.merge(other.unused_histogram);
        self.cpu_histogram.merge(other.cpu_histogram);
        if let Some(job) = other.most_unused {
            Extreme::Highest.offer(&mut self.most_unused, job);
        }
        if let Some(job) = other.least_unused {
            Extreme::Lowest.offer(&mut self.least_unused, job);
        }
    }

    fn finish(self) -> AggregateStats {
        AggregateStats {
            job_count: self.job_count,
            unused_memory_pct: self.unused_pct.summary(),
            requested_memory_gb: self.requested.summary(),
            used_memory_gb: self.used.summary(),
            unused_memory_gb: self.unused_gb.summary(),
            cpu_percent: self.cpu.summary(),
            elapsed_hours: self.elapsed.summary(),
            walltime_hours: self.walltime.summary(),
            unused_core_hours: self.core_hours.sum(),
            unused_histogram: self.unused_histogram.summary(),
            cpu_histogram: self.cpu_histogram.summary(),
            most_unused: self.most_unused,
            least_unused: self.least_unused,
        }
    }
}

/// Finished statistics for a group of jobs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStats {
    pub job_count: usize,
    /// Only jobs with a non-zero memory request contribute.
    pub unused_memory_pct: MetricSummary,
    pub requested_memory_gb: MetricSummary,
    pub used_memory_gb: MetricSummary,
    pub unused_memory_gb: MetricSummary,
    pub cpu_percent: MetricSummary,
    pub elapsed_hours: MetricSummary,
    pub walltime_hours: MetricSummary,
    /// Σ unused GB × elapsed hours.
    pub unused_core_hours: f64,
    pub unused_histogram: HistogramSummary,
    pub cpu_histogram: HistogramSummary,
    pub most_unused: Option<ExtremeJob>,
    pub least_unused: Option<ExtremeJob>,
}

impl AggregateStats {
    pub fn is_empty(&self) -> bool {
        self.job_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAggregate {
    pub user: String,
    pub stats: AggregateStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateOutput {
    pub global: AggregateStats,
    /// Filled only for the all-users scope, ordered by user name.
    pub per_user: Vec<UserAggregate>,
}

/// Single-pass aggregation. Records are expected to have passed the
/// [`crate::filter::JobFilter`] already; the scope only decides whether
/// per-user groups are kept.
#[derive(Debug, Clone)]
pub struct Aggregator {
    scope: UserScope,
    global: StatsAccumulator,
    per_user: BTreeMap<String, StatsAccumulator>,
}

impl Aggregator {
    pub fn new(scope: UserScope) -> Self {
        Self {
            scope,
            global: StatsAccumulator::default(),
            per_user: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, record: &JobRecord) {
        self.global.push(record);
        if self.scope.is_all() {
            self.per_user
                .entry(record.user.clone())
                .or_default()
                .push(record);
        }
    }

    pub fn merge(&mut self, other: Aggregator) {
        self.global.merge(other.global);
        for (user, stats) in other.per_user {
            self.per_user.entry(user).or_default().merge(stats);
        }
    }

    pub fn job_count(&self) -> usize {
        self.global.job_count
    }

    pub fn finish(self) -> AggregateOutput {
        AggregateOutput {
            global: self.global.finish(),
            per_user: self
                .per_user
                .into_iter()
                .map(|(user, stats)| UserAggregate {
                    user,
                    stats: stats.finish(),
                })
                .collect(),
        }
    }
}

/// Aggregate a slice of records sequentially.
pub fn aggregate(records: &[JobRecord], scope: &UserScope) -> AggregateOutput {
    let mut aggregator = Aggregator::new(scope.clone());
    for record in records {
        aggregator.push(record);
    }
    aggregator.finish()
}

/// Aggregate a slice of records across the rayon thread pool.
#[cfg(feature = "parallel")]
pub fn aggregate_parallel(records: &[JobRecord], scope: &UserScope) -> AggregateOutput {
    use rayon::prelude::*;

    records
        .par_iter()
        .fold(
            || Aggregator::new(scope.clone()),
            |mut aggregator, record| {
                aggregator.push(record);
                aggregator
            },
        )
        .reduce(
            || Aggregator::new(scope.clone()),
            |mut left, right| {
                left.merge(right);
                left
            },
        )
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_record;

    fn alice_jobs() -> Vec<JobRecord> {
        vec![
            test_record("alice", 25.0, 5.0, 2.0),
            test_record("alice", 25.0, 0.0, 1.0),
            test_record("alice", 10.0, 10.0, 0.5),
        ]
    }

    fn percents(summary: &HistogramSummary) -> Vec<f64> {
        summary.rows.iter().map(|row| row.percent).collect()
    }

    #[test]
    fn test_alice_scenario() {
        let output = aggregate(&alice_jobs(), &UserScope::parse("alice"));
        let stats = &output.global;

        assert_eq!(stats.job_count, 3);
        assert_eq!(stats.unused_memory_pct.mean, Some(60.0));
        assert_eq!(stats.unused_memory_pct.median, Some(80.0));
        assert_eq!(stats.unused_memory_pct.min, Some(0.0));
        assert_eq!(stats.unused_memory_pct.max, Some(100.0));
        assert_eq!(percents(&stats.unused_histogram), vec![66.67, 0.0, 0.0, 33.33]);
        assert_eq!(stats.unused_core_hours, 65.0);
        assert!(output.per_user.is_empty());
    }

    #[test]
    fn test_empty_input_has_no_values() {
        let output = aggregate(&[], &UserScope::All);
        assert!(output.global.is_empty());
        assert_eq!(output.global.unused_memory_pct, MetricSummary::default());
        assert_eq!(output.global.unused_histogram.total, 0);
        assert!(output.global.unused_histogram.rows.iter().all(|r| r.percent == 0.0));
        assert!(output.global.most_unused.is_none());
        assert!(output.per_user.is_empty());
    }

    #[test]
    fn test_zero_request_only_skips_percentages() {
        let jobs = vec![
            test_record("bob", 0.0, 0.0, 4.0),
            test_record("bob", 8.0, 2.0, 1.0),
        ];
        let stats = aggregate(&jobs, &UserScope::All).global;

        assert_eq!(stats.job_count, 2);
        assert_eq!(stats.unused_memory_pct.count, 1);
        assert_eq!(stats.unused_histogram.total, 1);
        assert_eq!(stats.elapsed_hours.count, 2);
        assert_eq!(stats.requested_memory_gb.mean, Some(4.0));
    }

    #[test]
    fn test_order_independent() {
        let mut jobs = alice_jobs();
        jobs.push(test_record("bob", 3.0, 1.0, 7.0));
        jobs.push(test_record("carol", 12.0, 11.5, 0.25));
        let forward = aggregate(&jobs, &UserScope::All);
        jobs.reverse();
        let backward = aggregate(&jobs, &UserScope::All);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let jobs = alice_jobs();
        let mut left = Aggregator::new(UserScope::All);
        left.push(&jobs[0]);
        let mut right = Aggregator::new(UserScope::All);
        right.push(&jobs[1]);
        right.push(&jobs[2]);
        left.merge(right);

        assert_eq!(left.finish(), aggregate(&jobs, &UserScope::All));
    }

    #[test]
    fn test_histogram_sums_to_hundred() {
        let jobs: Vec<_> = (1..=7)
            .map(|i| test_record("dave", 10.0, i as f64, 1.0))
            .collect();
        let stats = aggregate(&jobs, &UserScope::All).global;
        let total: f64 = percents(&stats.unused_histogram).iter().sum();
        assert!((total - 100.0).abs() < 0.05, "total was {total}");
    }

    #[test]
    fn test_out_of_range_percentages_clamp() {
        assert_eq!(Bucket::of(-50.0), Bucket::Below25);
        assert_eq!(Bucket::of(150.0), Bucket::AtLeast75);
        assert_eq!(Bucket::of(75.0), Bucket::AtLeast75);
        assert_eq!(Bucket::of(74.99), Bucket::From50To75);
        assert_eq!(Bucket::of(25.0), Bucket::From25To50);
    }

    #[test]
    fn test_per_user_groups() {
        let mut jobs = alice_jobs();
        jobs.push(test_record("bob", 4.0, 1.0, 10.0));
        let output = aggregate(&jobs, &UserScope::All);

        assert_eq!(output.global.job_count, 4);
        let users: Vec<_> = output.per_user.iter().map(|u| u.user.as_str()).collect();
        assert_eq!(users, vec!["alice", "bob"]);
        assert_eq!(output.per_user[0].stats.unused_core_hours, 65.0);
        assert_eq!(output.per_user[1].stats.unused_core_hours, 30.0);
    }

    #[test]
    fn test_extremes_and_even_median() {
        let mut jobs = vec![
            test_record("erin", 10.0, 1.0, 1.0),
            test_record("erin", 10.0, 9.0, 1.0),
        ];
        jobs[0].job_id = Some("101".to_string());
        jobs[1].job_id = Some("102".to_string());
        let stats = aggregate(&jobs, &UserScope::All).global;

        assert_eq!(stats.most_unused.as_ref().map(|j| j.label.as_str()), Some("101"));
        assert_eq!(stats.least_unused.as_ref().map(|j| j.label.as_str()), Some("102"));
        assert_eq!(stats.used_memory_gb.median, Some(5.0));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let jobs: Vec<_> = (0..500)
            .map(|i| {
                let user = ["alice", "bob", "carol"][i % 3];
                test_record(user, 16.0, (i % 17) as f64, (i % 5) as f64 + 0.5)
            })
            .collect();
        assert_eq!(
            aggregate_parallel(&jobs, &UserScope::All),
            aggregate(&jobs, &UserScope::All)
        );
    }
}
