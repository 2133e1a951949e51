//! Job-history log source
//!
//! Builds the `qhist` invocation that produces a log for a date range and
//! user scope, and optionally runs it, saving stdout to the log file the
//! analyzer reads next.

use crate::error::ConfigError;
use crate::filter::DateRange;
use crate::models::UserScope;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Column selection matching [`crate::schema::LogSchema::qhist`].
pub const QHIST_FORMAT: &str = "id,user,queue,numnodes,numcpus,reqmem,memory,start,end,elapsed,walltime,waittime,name,avgcpu,resources,status";

#[derive(Debug, Clone)]
pub struct QhistCommand {
    program: String,
    range: DateRange,
    scope: UserScope,
}

impl QhistCommand {
    pub fn new(program: impl Into<String>, range: DateRange, scope: UserScope) -> Self {
        Self {
            program: program.into(),
            range,
            scope,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--format={}", QHIST_FORMAT),
            "-p".to_string(),
            format!(
                "{}-{}",
                self.range.start().format("%Y%m%d"),
                self.range.end().format("%Y%m%d")
            ),
        ];
        if let UserScope::Single(user) = &self.scope {
            args.push("-u".to_string());
            args.push(user.clone());
        }
        args.push("-c".to_string());
        args
    }

    /// Run the command and write its stdout to `path`.
    pub fn fetch_to(&self, path: &Path) -> Result<(), ConfigError> {
        let args = self.args();
        info!(program = %self.program, args = ?args, output = %path.display(), "Fetching job history");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| ConfigError::Fetch(format!("cannot run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConfigError::Fetch(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        debug!(bytes = output.stdout.len(), "Job history fetched");
        fs::write(path, &output.stdout).map_err(|e| {
            ConfigError::Fetch(format!("cannot write {}: {}", path.display(), e))
        })
    }
}
