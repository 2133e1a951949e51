//! Job Memory Analysis Engine
//!
//! [`JobAnalyzer`] runs the whole pipeline over one log in a single pass:
//!
//! 1. **Parsing**: each line goes through the [`RecordParser`]
//! 2. **Filtering**: records outside the [`JobFilter`] are dropped
//! 3. **Aggregation**: accepted records feed the [`Aggregator`]
//! 4. **Assembly**: statistics become a [`Report`]
//!
//! Malformed lines never abort a run. They are counted per reason in
//! [`ParseStats`] and summarized in the logs once the pass is over. With the
//! `parallel` feature the accepted records are collected first and aggregated
//! across the rayon pool; the result is identical.

use crate::aggregate::Aggregator;
use crate::error::ConfigError;
use crate::filter::JobFilter;
use crate::models::JobRecord;
use crate::parser::{ParseStats, RecordParser, RecordProcessor};
use crate::report::{Report, ReportContext};
use crate::schema::LogSchema;
use anyhow::Result;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// Result of one analysis run.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub report: Report,
    pub stats: ParseStats,
    /// Parsed records rejected by the filter.
    pub filtered_out: usize,
}

/// Filters records and aggregates the survivors as they stream by.
struct AggregatingProcessor<'a> {
    filter: &'a JobFilter,
    aggregator: Aggregator,
    filtered_out: usize,
}

impl RecordProcessor for AggregatingProcessor<'_> {
    type Output = (Aggregator, usize);

    fn process_record(&mut self, record: JobRecord, line_number: usize) -> Result<()> {
        if self.filter.accepts(&record) {
            self.aggregator.push(&record);
        } else {
            self.filtered_out += 1;
            tracing::trace!(line_number, job = %record.label(), "Record filtered out");
        }
        Ok(())
    }

    fn finalize(self) -> Result<Self::Output> {
        Ok((self.aggregator, self.filtered_out))
    }
}

/// Keeps accepted records for a later parallel aggregation.
#[cfg(feature = "parallel")]
struct FilteringCollector<'a> {
    filter: &'a JobFilter,
    records: Vec<JobRecord>,
    filtered_out: usize,
}

#[cfg(feature = "parallel")]
impl RecordProcessor for FilteringCollector<'_> {
    type Output = (Vec<JobRecord>, usize);

    fn process_record(&mut self, record: JobRecord, _line_number: usize) -> Result<()> {
        if self.filter.accepts(&record) {
            self.records.push(record);
        } else {
            self.filtered_out += 1;
        }
        Ok(())
    }

    fn finalize(self) -> Result<Self::Output> {
        Ok((self.records, self.filtered_out))
    }
}

pub struct JobAnalyzer {
    parser: RecordParser,
}

impl JobAnalyzer {
    pub fn new(schema: LogSchema) -> Result<Self, ConfigError> {
        Ok(Self {
            parser: RecordParser::new(schema)?,
        })
    }

    /// Analyze a log file. A file that cannot be opened is a
    /// [`ConfigError::LogUnreadable`].
    pub fn analyze_file(
        &self,
        path: &Path,
        filter: &JobFilter,
        context: ReportContext,
    ) -> Result<Analysis> {
        let file = File::open(path).map_err(|source| ConfigError::LogUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Analyzing job log");
        self.analyze_reader(BufReader::new(file), filter, context)
    }

    pub fn analyze_reader<R: BufRead>(
        &self,
        reader: R,
        filter: &JobFilter,
        context: ReportContext,
    ) -> Result<Analysis> {
        #[cfg(feature = "parallel")]
        return self.analyze_parallel(reader, filter, context);

        #[cfg(not(feature = "parallel"))]
        self.analyze_streaming(reader, filter, context)
    }

    /// Single-threaded pass, aggregating while reading.
    pub fn analyze_streaming<R: BufRead>(
        &self,
        reader: R,
        filter: &JobFilter,
        context: ReportContext,
    ) -> Result<Analysis> {
        let processor = AggregatingProcessor {
            filter,
            aggregator: Aggregator::new(filter.scope.clone()),
            filtered_out: 0,
        };
        let ((aggregator, filtered_out), stats) = self.parser.process_reader(reader, processor)?;
        Ok(finish(aggregator.finish(), stats, filtered_out, context))
    }

    #[cfg(feature = "parallel")]
    pub fn analyze_parallel<R: BufRead>(
        &self,
        reader: R,
        filter: &JobFilter,
        context: ReportContext,
    ) -> Result<Analysis> {
        let collector = FilteringCollector {
            filter,
            records: Vec::new(),
            filtered_out: 0,
        };
        let ((records, filtered_out), stats) = self.parser.process_reader(reader, collector)?;
        let output = crate::aggregate::aggregate_parallel(&records, &filter.scope);
        Ok(finish(output, stats, filtered_out, context))
    }
}

fn finish(
    output: crate::aggregate::AggregateOutput,
    stats: ParseStats,
    filtered_out: usize,
    context: ReportContext,
) -> Analysis {
    info!(
        lines = stats.lines,
        records = stats.records,
        skipped = stats.skipped,
        filtered_out,
        accepted = output.global.job_count,
        "Log pass complete"
    );
    for (reason, count) in &stats.skip_reasons {
        debug!(reason, count, "Skipped lines");
    }

    if output.global.job_count == 0 {
        warn!(
            scope = %context.scope,
            range = %context.range,
            "No jobs matched the selection"
        );
    } else {
        if let Some(job) = &output.global.most_unused {
            debug!(job = %job.label, unused_pct = job.unused_memory_pct, "Highest unused memory");
        }
        if let Some(job) = &output.global.least_unused {
            debug!(job = %job.label, unused_pct = job.unused_memory_pct, "Lowest unused memory");
        }
    }

    Analysis {
        report: Report::assemble(output, context),
        stats,
        filtered_out,
    }
}
