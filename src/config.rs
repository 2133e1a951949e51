//! Configuration system
//!
//! Provides layered configuration with:
//! - Runtime defaults
//! - Config file loading (optional)
//! - Environment variable overrides
//! - Validation before use
//!
//! The loaded [`Config`] is passed explicitly to whoever needs it.

use crate::error::ConfigError;
use crate::filter::JobNamePattern;
use crate::schema::{LogSchema, SchemaPreset};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Log file locations
    pub paths: PathsConfig,

    /// Record selection defaults
    pub filters: FiltersConfig,

    /// Log layout
    pub schema: SchemaConfig,

    /// Output configuration
    pub output: OutputConfig,

    /// Job-history fetch
    pub fetch: FetchConfig,

    /// File the configuration was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "WARN".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Job log read when `--filename` is not given.
    pub log_file: PathBuf,
    /// Directory for rolling diagnostic logs.
    pub log_directory: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("log.txt"),
            log_directory: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    /// User reported when `--user` is not given. Falls back to `$USER`.
    pub default_user: Option<String>,
    pub job_name: String,
    pub excluded_queues: Vec<String>,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            default_user: None,
            job_name: "all".to_string(),
            excluded_queues: vec!["economy".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub preset: SchemaPreset,
    /// Full layout description; takes precedence over `preset`.
    pub custom: Option<LogSchema>,
}

impl SchemaConfig {
    pub fn resolve(&self) -> LogSchema {
        match &self.custom {
            Some(schema) => schema.clone(),
            None => self.preset.schema(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub json_pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { json_pretty: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub program: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            program: "qhist".to_string(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from defaults, the first config file found, and the
    /// environment. An explicit path must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let source = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::search_paths().into_iter().find(|p| p.is_file()),
        };

        let mut config = match &source {
            Some(path) => Self::load_from_file(path)?,
            None => Config::default(),
        };
        config.source = source;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("job-memory-report.toml"),
            PathBuf::from(".job-memory-report.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("job-memory-report").join("config.toml"));
        }
        paths
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup; `apply_env_overrides` uses the
    /// process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Logging overrides
        if let Some(val) = lookup("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Some(val) = lookup("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // Path overrides
        if let Some(val) = lookup("JOB_MEMORY_REPORT_LOG_FILE") {
            self.paths.log_file = PathBuf::from(val);
        }
        if let Some(val) = lookup("JOB_MEMORY_REPORT_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        // Filter overrides
        if let Some(val) = lookup("JOB_MEMORY_REPORT_USER") {
            self.filters.default_user = Some(val);
        }
        if let Some(val) = lookup("JOB_MEMORY_REPORT_JOB") {
            self.filters.job_name = val;
        }

        if let Some(val) = lookup("JOB_MEMORY_REPORT_SCHEMA") {
            self.schema.preset = val
                .parse()
                .context("Invalid JOB_MEMORY_REPORT_SCHEMA")?;
            self.schema.custom = None;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.logging.level
            )));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            )));
        }

        if !matches!(self.logging.output.as_str(), "console" | "file" | "both") {
            return Err(ConfigError::Invalid(format!(
                "logging.output must be 'console', 'file' or 'both', got '{}'",
                self.logging.output
            )));
        }

        if self.paths.log_file.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("paths.log_file must not be empty".to_string()));
        }

        if self.fetch.program.trim().is_empty() {
            return Err(ConfigError::Invalid("fetch.program must not be empty".to_string()));
        }

        JobNamePattern::parse(&self.filters.job_name)?;
        self.schema.resolve().validate()?;

        Ok(())
    }

    /// User reported when none is given on the command line.
    pub fn default_user(&self) -> Option<String> {
        self.filters
            .default_user
            .clone()
            .or_else(|| env::var("USER").ok())
            .or_else(|| env::var("LOGNAME").ok())
            .filter(|u| !u.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Delimiter;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "WARN");
        assert_eq!(config.paths.log_file, PathBuf::from("log.txt"));
        assert_eq!(config.filters.job_name, "all");
        assert_eq!(config.filters.excluded_queues, vec!["economy"]);
        assert_eq!(config.schema.preset, SchemaPreset::Qhist);
        assert_eq!(config.fetch.program, "qhist");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[
                ("LOG_LEVEL", "debug"),
                ("JOB_MEMORY_REPORT_USER", "alice"),
                ("JOB_MEMORY_REPORT_JOB", "dask*"),
                ("JOB_MEMORY_REPORT_SCHEMA", "plain"),
                ("JOB_MEMORY_REPORT_LOG_FILE", "/tmp/jobs.txt"),
            ]))
            .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.filters.default_user.as_deref(), Some("alice"));
        assert_eq!(config.filters.job_name, "dask*");
        assert_eq!(config.schema.preset, SchemaPreset::Plain);
        assert_eq!(config.paths.log_file, PathBuf::from("/tmp/jobs.txt"));
        assert_eq!(config.default_user().as_deref(), Some("alice"));
    }

    #[test]
    fn test_bad_schema_override() {
        let mut config = Config::default();
        let result = config.apply_overrides(lookup(&[("JOB_MEMORY_REPORT_SCHEMA", "xml")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.output = "syslog".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.filters.job_name = "[unclosed".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fetch.program = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[filters]
default_user = "bob"

[schema]
preset = "plain"
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.filters.default_user.as_deref(), Some("bob"));
        assert_eq!(config.filters.excluded_queues, vec!["economy"]);
        assert_eq!(config.schema.resolve(), LogSchema::plain());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_custom_schema_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[schema.custom]
delimiter = "|"
memory_unit = "mb"
fields = [
    { name = "user", kind = "user" },
    { name = "req", kind = "requested_memory" },
    { name = "used", kind = "used_memory" },
    { name = "elapsed", kind = "elapsed" },
    { name = "end", kind = "end_time" },
]
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        let schema = config.schema.resolve();
        assert_eq!(schema.delimiter, Delimiter::Char('|'));
        assert_eq!(schema.fields.len(), 5);
        assert_eq!(schema.missing_marker, "-");
        assert!(config.validate().is_ok());
    }
}
