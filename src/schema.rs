//! Log schema descriptors
//!
//! A [`LogSchema`] describes the layout of one job-history log format: the
//! ordered list of named, typed columns, how columns are separated, and which
//! lines carry no job at all (headers, comments, banners). The record parser
//! interprets any schema uniformly, so supporting a new log layout means
//! writing a schema, not a parser.
//!
//! Two presets ship with the crate:
//!
//! - [`SchemaPreset::Qhist`]: the CSV output of `qhist -c` with the column
//!   list requested by [`crate::source::QhistCommand`].
//! - [`SchemaPreset::Plain`]: a whitespace-separated layout.

use crate::error::ConfigError;
use crate::units::MemoryUnit;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;

/// Meaning of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    JobId,
    User,
    Queue,
    JobName,
    RequestedMemory,
    UsedMemory,
    CpuPercent,
    Elapsed,
    Walltime,
    StartTime,
    EndTime,
    /// Present in the log but not used.
    Ignore,
}

impl FieldKind {
    pub fn label(self) -> &'static str {
        match self {
            FieldKind::JobId => "job_id",
            FieldKind::User => "user",
            FieldKind::Queue => "queue",
            FieldKind::JobName => "job_name",
            FieldKind::RequestedMemory => "requested_memory",
            FieldKind::UsedMemory => "used_memory",
            FieldKind::CpuPercent => "cpu_percent",
            FieldKind::Elapsed => "elapsed",
            FieldKind::Walltime => "walltime",
            FieldKind::StartTime => "start_time",
            FieldKind::EndTime => "end_time",
            FieldKind::Ignore => "ignore",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Column separator. Serialized as `"whitespace"`, `"tab"` or a single
/// character such as `","` or `"|"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Delimiter {
    Whitespace,
    Char(char),
}

impl TryFrom<String> for Delimiter {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "whitespace" => Ok(Delimiter::Whitespace),
            "tab" | "\\t" => Ok(Delimiter::Char('\t')),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii() => Ok(Delimiter::Char(c)),
                    _ => Err(ConfigError::InvalidSchema(format!(
                        "delimiter must be 'whitespace', 'tab' or a single ASCII character, got '{other}'"
                    ))),
                }
            }
        }
    }
}

impl From<Delimiter> for String {
    fn from(value: Delimiter) -> Self {
        match value {
            Delimiter::Whitespace => "whitespace".to_string(),
            Delimiter::Char('\t') => "tab".to_string(),
            Delimiter::Char(c) => c.to_string(),
        }
    }
}

/// Built-in log layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchemaPreset {
    #[default]
    Qhist,
    Plain,
}

impl SchemaPreset {
    pub fn schema(self) -> LogSchema {
        match self {
            SchemaPreset::Qhist => LogSchema::qhist(),
            SchemaPreset::Plain => LogSchema::plain(),
        }
    }
}

impl std::str::FromStr for SchemaPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "qhist" => Ok(SchemaPreset::Qhist),
            "plain" => Ok(SchemaPreset::Plain),
            other => Err(ConfigError::InvalidSchema(format!("unknown schema preset '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSchema {
    pub delimiter: Delimiter,
    pub fields: Vec<FieldSpec>,
    /// Lines starting with any of these prefixes are skipped silently.
    #[serde(default)]
    pub comment_prefixes: Vec<String>,
    /// Lines containing any of these markers are skipped silently.
    #[serde(default)]
    pub ignore_markers: Vec<String>,
    /// A log whose first line starts with one of these prefixes opens with a
    /// wrapped warning; it and every line up to the header row are skipped
    /// silently.
    #[serde(default)]
    pub preamble_prefixes: Vec<String>,
    /// Value standing for "not available" in any column.
    #[serde(default = "default_missing_marker")]
    pub missing_marker: String,
    /// Unit applied to memory values that carry no suffix.
    #[serde(default)]
    pub memory_unit: MemoryUnit,
}

fn default_missing_marker() -> String {
    "-".to_string()
}

impl LogSchema {
    /// CSV written by `qhist -c` for the column list
    /// `id,user,queue,numnodes,numcpus,reqmem,memory,start,end,elapsed,walltime,waittime,name,avgcpu,resources,status`.
    pub fn qhist() -> Self {
        use FieldKind::*;
        Self {
            delimiter: Delimiter::Char(','),
            fields: vec![
                FieldSpec::new("Job ID", JobId),
                FieldSpec::new("User", User),
                FieldSpec::new("Queue", Queue),
                FieldSpec::new("Nodes", Ignore),
                FieldSpec::new("NCPUs", Ignore),
                FieldSpec::new("Req Mem", RequestedMemory),
                FieldSpec::new("Used Mem", UsedMemory),
                FieldSpec::new("Job Start", StartTime),
                FieldSpec::new("Job End", EndTime),
                FieldSpec::new("Elapsed", Elapsed),
                FieldSpec::new("Walltime", Walltime),
                FieldSpec::new("Wait Time", Ignore),
                FieldSpec::new("Job Name", JobName),
                FieldSpec::new("Avg CPU", CpuPercent),
                FieldSpec::new("Resources", Ignore),
                FieldSpec::new("Exit Status", Ignore),
            ],
            comment_prefixes: vec!["#".to_string()],
            ignore_markers: vec!["No jobs found matching search criteria".to_string()],
            preamble_prefixes: vec!["/glade/u/apps/opt/".to_string()],
            missing_marker: default_missing_marker(),
            memory_unit: MemoryUnit::Gb,
        }
    }

    /// Whitespace-separated layout:
    /// `JobID User Queue ReqMem UsedMem AvgCPU Elapsed Walltime End JobName`.
    pub fn plain() -> Self {
        use FieldKind::*;
        Self {
            delimiter: Delimiter::Whitespace,
            fields: vec![
                FieldSpec::new("JobID", JobId),
                FieldSpec::new("User", User),
                FieldSpec::new("Queue", Queue),
                FieldSpec::new("ReqMem", RequestedMemory),
                FieldSpec::new("UsedMem", UsedMemory),
                FieldSpec::new("AvgCPU", CpuPercent),
                FieldSpec::new("Elapsed", Elapsed),
                FieldSpec::new("Walltime", Walltime),
                FieldSpec::new("End", EndTime),
                FieldSpec::new("JobName", JobName),
            ],
            comment_prefixes: vec!["#".to_string()],
            ignore_markers: Vec::new(),
            preamble_prefixes: Vec::new(),
            missing_marker: default_missing_marker(),
            memory_unit: MemoryUnit::Gb,
        }
    }

    /// Column index of a field kind, if the schema has it.
    pub fn position(&self, kind: FieldKind) -> Option<usize> {
        self.fields.iter().position(|f| f.kind == kind)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fields.is_empty() {
            return Err(ConfigError::InvalidSchema("schema has no fields".to_string()));
        }
        if let Delimiter::Char(c) = self.delimiter {
            if !c.is_ascii() {
                return Err(ConfigError::InvalidSchema(format!(
                    "delimiter '{c}' is not an ASCII character"
                )));
            }
        }
        if self.missing_marker.is_empty() {
            return Err(ConfigError::InvalidSchema("missing_marker must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.kind != FieldKind::Ignore && !seen.insert(field.kind) {
                return Err(ConfigError::InvalidSchema(format!(
                    "field kind '{}' appears more than once",
                    field.kind.label()
                )));
            }
        }

        for required in [
            FieldKind::User,
            FieldKind::RequestedMemory,
            FieldKind::UsedMemory,
            FieldKind::EndTime,
        ] {
            if !seen.contains(&required) {
                return Err(ConfigError::InvalidSchema(format!(
                    "required field '{}' is missing",
                    required.label()
                )));
            }
        }

        if !seen.contains(&FieldKind::Elapsed) && !seen.contains(&FieldKind::StartTime) {
            return Err(ConfigError::InvalidSchema(
                "either an elapsed or a start_time field is required".to_string(),
            ));
        }

        Ok(())
    }

    /// Split a record into its columns. Delimited layouts are read as CSV,
    /// so quoted fields may hold the delimiter, doubled quotes or newlines.
    pub fn split<'a>(&self, record: &'a str) -> Vec<Cow<'a, str>> {
        match self.delimiter {
            Delimiter::Whitespace => record.split_whitespace().map(Cow::Borrowed).collect(),
            Delimiter::Char(delim) => read_delimited(record, delim),
        }
    }

    /// True while `text` ends inside a quoted field, so the record continues
    /// on the next physical line.
    pub fn has_open_quote(&self, text: &str) -> bool {
        matches!(self.delimiter, Delimiter::Char(_)) && text.matches('"').count() % 2 == 1
    }

    /// True for lines that carry no job and are not worth counting as errors.
    pub fn is_ignorable(&self, line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.is_empty()
            || self.starts_preamble(trimmed)
            || self.comment_prefixes.iter().any(|p| trimmed.starts_with(p.as_str()))
            || self.ignore_markers.iter().any(|m| trimmed.contains(m.as_str()))
    }

    /// True for the warning line that opens a wrapped preamble.
    pub fn starts_preamble(&self, line: &str) -> bool {
        let trimmed = line.trim_start();
        self.preamble_prefixes.iter().any(|p| trimmed.starts_with(p.as_str()))
    }

    /// A header row repeats the schema's column names; the first column is
    /// enough to recognise it.
    pub fn is_header(&self, columns: &[Cow<'_, str>]) -> bool {
        match (columns.first(), self.fields.first()) {
            (Some(first), Some(spec)) => first.eq_ignore_ascii_case(&spec.name),
            _ => false,
        }
    }
}

fn read_delimited<'a>(record: &str, delim: char) -> Vec<Cow<'a, str>> {
    let Ok(delim) = u8::try_from(delim) else {
        return Vec::new();
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delim)
        .from_reader(record.as_bytes());

    let mut fields = csv::StringRecord::new();
    match reader.read_record(&mut fields) {
        Ok(true) => fields.iter().map(|f| Cow::Owned(f.to_string())).collect(),
        Ok(false) | Err(_) => Vec::new(),
    }
}
