//! Configuration loading from disk.

use std::fs;
use tempfile::TempDir;
use tickflow_core::prelude::*;

#[test]
fn test_load_config_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tickflow.toml");
    fs::write(
        &path,
        r#"
        concurrency = 8
        queue_capacity = 16
        batch_size = 25
        flush_policy = "exceed_size"
        consumers = 2
        data_dir = "/srv/prices"
        "#,
    )
    .unwrap();

    let config = PipelineConfig::load(&path).unwrap();
    assert_eq!(config.concurrency, 8);
    assert_eq!(config.queue_capacity, 16);
    assert_eq!(config.batch_size, 25);
    assert_eq!(config.flush_policy, FlushPolicy::ExceedSize);
    assert_eq!(config.consumers, 2);
    assert_eq!(config.data_dir, std::path::PathBuf::from("/srv/prices"));
}

#[test]
fn test_missing_config_file() {
    let temp = TempDir::new().unwrap();
    let err = PipelineConfig::load(&temp.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn test_invalid_config_values_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tickflow.toml");
    fs::write(&path, "batch_size = 0\n").unwrap();

    let err = PipelineConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("batch_size"));
}

#[test]
fn test_malformed_toml_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tickflow.toml");
    fs::write(&path, "concurrency = [").unwrap();

    assert!(PipelineConfig::load(&path).is_err());
}
