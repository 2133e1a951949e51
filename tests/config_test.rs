//! Configuration loading through the public API

use job_memory_report::config::Config;
use job_memory_report::schema::{LogSchema, SchemaPreset};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_explicit_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(
        &path,
        r#"
[paths]
log_file = "/data/qhist/jobs.csv"

[filters]
job_name = "dask*"
excluded_queues = []

[output]
json_pretty = false
"#,
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.paths.log_file, PathBuf::from("/data/qhist/jobs.csv"));
    assert_eq!(config.filters.job_name, "dask*");
    assert!(config.filters.excluded_queues.is_empty());
    assert!(!config.output.json_pretty);
    assert_eq!(config.schema.preset, SchemaPreset::Qhist);
    assert_eq!(config.schema.resolve(), LogSchema::qhist());
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_remembers_source_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("source.toml");
    fs::write(&path, "[filters]\ndefault_user = \"dave\"\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.source.as_deref(), Some(path.as_path()));
    assert_eq!(config.filters.default_user.as_deref(), Some("dave"));
    assert_eq!(Config::default().source, None);
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
}

#[test]
fn test_malformed_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[filters\njob_name = ").unwrap();
    assert!(Config::load_from_file(&path).is_err());
}

#[test]
fn test_invalid_custom_schema_fails_validation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("schema.toml");
    fs::write(
        &path,
        r#"
[schema.custom]
delimiter = ","
fields = [
    { name = "user", kind = "user" },
    { name = "end", kind = "end_time" },
]
"#,
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert!(config.validate().is_err());
}
