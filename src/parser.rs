//! Record parsing
//!
//! [`RecordParser`] turns one raw log line into a [`JobRecord`] according to a
//! [`LogSchema`]. Parsing is tolerant: a malformed line yields a [`ParseSkip`]
//! that the caller counts and moves past, while headers, comments and banner
//! lines are [`ParsedLine::Ignored`] and not counted at all.
//!
//! [`RecordParser::process_reader`] streams a whole log through a
//! [`RecordProcessor`], so callers decide what happens to each record without
//! the log ever being held in memory.

use crate::error::{ConfigError, ParseSkip};
use crate::models::JobRecord;
use crate::schema::{FieldKind, LogSchema};
use crate::units::{parse_duration_hours, parse_memory_gb, parse_timestamp};
use anyhow::{Context, Result};
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::BufRead;
use tracing::{debug, trace};

/// Most physical lines one record may span through an open quoted field.
pub const MAX_RECORD_LINES: usize = 16;

/// Outcome of parsing one line that is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Record(JobRecord),
    /// Blank line, header, comment or banner.
    Ignored,
}

/// Counters for one pass over a log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseStats {
    pub lines: usize,
    pub records: usize,
    pub ignored: usize,
    pub skipped: usize,
    pub skip_reasons: BTreeMap<&'static str, usize>,
}

impl ParseStats {
    pub fn record_skip(&mut self, skip: &ParseSkip) {
        self.skipped += 1;
        *self.skip_reasons.entry(skip.kind()).or_insert(0) += 1;
    }
}

/// Receives each parsed record of a log.
pub trait RecordProcessor {
    type Output;

    fn process_record(&mut self, record: JobRecord, line_number: usize) -> Result<()>;
    fn finalize(self) -> Result<Self::Output>;
}

/// Collects every record into a `Vec`.
#[derive(Default)]
pub struct CollectorProcessor {
    records: Vec<JobRecord>,
}

impl CollectorProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordProcessor for CollectorProcessor {
    type Output = Vec<JobRecord>;

    fn process_record(&mut self, record: JobRecord, _line_number: usize) -> Result<()> {
        self.records.push(record);
        Ok(())
    }

    fn finalize(self) -> Result<Self::Output> {
        Ok(self.records)
    }
}

/// Column positions resolved once from the schema.
#[derive(Debug, Clone)]
struct ColumnMap {
    user: usize,
    requested: usize,
    used: usize,
    end: usize,
    elapsed: Option<usize>,
    start: Option<usize>,
    cpu: Option<usize>,
    walltime: Option<usize>,
    job_id: Option<usize>,
    job_name: Option<usize>,
    queue: Option<usize>,
}

impl ColumnMap {
    fn resolve(schema: &LogSchema) -> Result<Self, ConfigError> {
        let required = |kind: FieldKind| {
            schema.position(kind).ok_or_else(|| {
                ConfigError::InvalidSchema(format!("required field '{}' is missing", kind.label()))
            })
        };

        Ok(Self {
            user: required(FieldKind::User)?,
            requested: required(FieldKind::RequestedMemory)?,
            used: required(FieldKind::UsedMemory)?,
            end: required(FieldKind::EndTime)?,
            elapsed: schema.position(FieldKind::Elapsed),
            start: schema.position(FieldKind::StartTime),
            cpu: schema.position(FieldKind::CpuPercent),
            walltime: schema.position(FieldKind::Walltime),
            job_id: schema.position(FieldKind::JobId),
            job_name: schema.position(FieldKind::JobName),
            queue: schema.position(FieldKind::Queue),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RecordParser {
    schema: LogSchema,
    columns: ColumnMap,
}

impl RecordParser {
    pub fn new(schema: LogSchema) -> Result<Self, ConfigError> {
        schema.validate()?;
        let columns = ColumnMap::resolve(&schema)?;
        Ok(Self { schema, columns })
    }

    pub fn schema(&self) -> &LogSchema {
        &self.schema
    }

    pub fn parse_line(&self, line: &str) -> Result<ParsedLine, ParseSkip> {
        if self.schema.is_ignorable(line) {
            return Ok(ParsedLine::Ignored);
        }

        let values = self.schema.split(line);
        if self.schema.is_header(&values) {
            return Ok(ParsedLine::Ignored);
        }
        if values.len() != self.schema.fields.len() {
            return Err(ParseSkip::FieldCount {
                expected: self.schema.fields.len(),
                found: values.len(),
            });
        }

        let row = Row {
            values: &values,
            missing: &self.schema.missing_marker,
        };
        let cols = &self.columns;

        let user = row.get(cols.user).ok_or(ParseSkip::EmptyUser)?.to_string();

        let unit = self.schema.memory_unit;
        let requested_memory_gb =
            parse_memory_gb(row.require(cols.requested, "requested_memory")?, unit)?;
        let used_memory_gb = parse_memory_gb(row.require(cols.used, "used_memory")?, unit)?;

        let end_timestamp = parse_timestamp(row.require(cols.end, "end_time")?)?;
        let start_timestamp = row
            .optional(cols.start)
            .map(parse_timestamp)
            .transpose()?;

        let elapsed_hours = match row.optional(cols.elapsed) {
            Some(text) => parse_duration_hours(text)?,
            None => match start_timestamp {
                Some(start) if start <= end_timestamp => {
                    (end_timestamp - start).num_seconds() as f64 / 3600.0
                }
                _ => return Err(ParseSkip::MissingField("elapsed")),
            },
        };

        let walltime_hours = row
            .optional(cols.walltime)
            .map(parse_duration_hours)
            .transpose()?;

        let cpu_percent = match row.optional(cols.cpu) {
            Some(text) => parse_cpu_percent(text)?,
            None => None,
        };

        Ok(ParsedLine::Record(JobRecord {
            job_id: row.optional(cols.job_id).map(str::to_string),
            user,
            queue: row.optional(cols.queue).map(str::to_string),
            job_name: row.optional(cols.job_name).map(str::to_string),
            requested_memory_gb,
            used_memory_gb,
            cpu_percent,
            elapsed_hours,
            walltime_hours,
            start_timestamp,
            end_timestamp,
        }))
    }

    /// Stream a log through `processor`. Malformed lines are counted in the
    /// returned [`ParseStats`]; only I/O failures and processor errors abort.
    ///
    /// A quoted field left open at the end of a line continues on the next
    /// one, up to [`MAX_RECORD_LINES`] physical lines per record. A wrapped
    /// preamble at the top of the log is ignored up to the header row.
    pub fn process_reader<R: BufRead, P: RecordProcessor>(
        &self,
        mut reader: R,
        mut processor: P,
    ) -> Result<(P::Output, ParseStats)> {
        let mut stats = ParseStats::default();
        let mut buf = Vec::new();
        let mut line_number = 0;
        let mut in_preamble = false;
        let mut pending = String::new();
        let mut pending_start = 0;
        let mut pending_lines = 0;

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .with_context(|| format!("Failed to read log line {}", line_number + 1))?;
            if read == 0 {
                break;
            }
            line_number += 1;
            stats.lines += 1;

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);

            if line_number == 1 && self.schema.starts_preamble(line) {
                debug!("Log opens with a wrapped warning; ignoring it up to the header row");
                in_preamble = true;
                stats.ignored += 1;
                continue;
            }
            if in_preamble {
                if self.is_preamble_fragment(line) {
                    trace!(line_number, "Ignoring preamble fragment");
                    stats.ignored += 1;
                    continue;
                }
                in_preamble = false;
            }

            if pending.is_empty() {
                if self.schema.is_ignorable(line) || !self.schema.has_open_quote(line) {
                    self.dispatch(line, line_number, &mut stats, &mut processor)?;
                    continue;
                }
                pending_start = line_number;
                pending_lines = 0;
            } else {
                pending.push('\n');
            }
            pending.push_str(line);
            pending_lines += 1;

            if !self.schema.has_open_quote(&pending) || pending_lines >= MAX_RECORD_LINES {
                self.dispatch(&pending, pending_start, &mut stats, &mut processor)?;
                pending.clear();
            }
        }

        if !pending.is_empty() {
            self.dispatch(&pending, pending_start, &mut stats, &mut processor)?;
        }

        Ok((processor.finalize()?, stats))
    }

    /// Inside a preamble everything but the header row and parseable job
    /// lines is a fragment of the wrapped warning.
    fn is_preamble_fragment(&self, line: &str) -> bool {
        match self.parse_line(line) {
            Ok(ParsedLine::Record(_)) => false,
            Ok(ParsedLine::Ignored) => !self.schema.is_header(&self.schema.split(line)),
            Err(_) => true,
        }
    }

    fn dispatch<P: RecordProcessor>(
        &self,
        text: &str,
        line_number: usize,
        stats: &mut ParseStats,
        processor: &mut P,
    ) -> Result<()> {
        match self.parse_line(text) {
            Ok(ParsedLine::Record(record)) => {
                stats.records += 1;
                processor.process_record(record, line_number)?;
            }
            Ok(ParsedLine::Ignored) => stats.ignored += 1,
            Err(skip) => {
                debug!(line_number, reason = %skip, "Skipping malformed log line");
                stats.record_skip(&skip);
            }
        }
        Ok(())
    }
}

/// Column values of one line with missing-marker handling.
struct Row<'a, 'b> {
    values: &'b [Cow<'a, str>],
    missing: &'b str,
}

impl<'a, 'b> Row<'a, 'b> {
    fn get(&self, index: usize) -> Option<&str> {
        let value = self.values.get(index)?.as_ref();
        if value.is_empty() || value == self.missing {
            None
        } else {
            Some(value)
        }
    }

    fn optional(&self, index: Option<usize>) -> Option<&str> {
        index.and_then(|i| self.get(i))
    }

    fn require(&self, index: usize, field: &'static str) -> Result<&str, ParseSkip> {
        self.get(index).ok_or(ParseSkip::MissingField(field))
    }
}

/// CPU utilization in percent. Values outside 0..=100 are treated as
/// not reported.
fn parse_cpu_percent(text: &str) -> Result<Option<f64>, ParseSkip> {
    let number = text.trim().trim_end_matches('%').trim();
    let value: f64 = number.parse().map_err(|_| ParseSkip::InvalidNumber {
        field: "cpu_percent",
        value: text.to_string(),
    })?;

    if (0.0..=100.0).contains(&value) {
        Ok(Some(value))
    } else {
        trace!(value, "Discarding out-of-range CPU percentage");
        Ok(None)
    }
}
