//! Tests for RealRunStore

use assert_matches::assert_matches;
use std::path::Path;
use tempfile::TempDir;

use crate::core::{compute_seed_duration, HostFacts, Milestone, RunMetadata};
use crate::error::BenchError;
use crate::services::run_store::{count_lines, RealRunStore, CONFIG_COPY_FILE, METADATA_FILE};
use crate::traits::RunStore;
use shared::config::REDACTED;
use shared::BenchConfig;

#[tokio::test]
async fn test_create_makes_nested_run_directory() {
    let root = TempDir::new().unwrap();
    let results = root.path().join("results");

    let store = RealRunStore::create(&results, "2026-10-17T09-30-00").await.unwrap();
    assert_eq!(store.run_dir(), results.join("2026-10-17T09-30-00"));
    assert!(store.run_dir().is_dir());
}

#[tokio::test]
async fn test_sinks_are_created_once_per_backend() {
    let root = TempDir::new().unwrap();
    let store = RealRunStore::create(root.path(), "run").await.unwrap();

    let sink = store.create_sink("qdrant").await.unwrap();
    assert_eq!(sink.path(), store.run_dir().join("qdrant.jsonl"));
    assert_matches!(
        store.create_sink("qdrant").await,
        Err(BenchError::FileSystemError { .. })
    );
}

#[tokio::test]
async fn test_count_records() {
    let root = TempDir::new().unwrap();
    let store = RealRunStore::create(root.path(), "run").await.unwrap();

    assert_eq!(store.count_records("qdrant").await.unwrap(), 0);

    std::fs::write(store.run_dir().join("qdrant.jsonl"), "{}\n{}\n{}\n").unwrap();
    assert_eq!(store.count_records("qdrant").await.unwrap(), 3);
}

#[test]
fn test_count_lines() {
    assert_eq!(count_lines(b""), 0);
    assert_eq!(count_lines(b"{}\n"), 1);
    assert_eq!(count_lines(b"{}\n{}"), 2);
    assert_eq!(count_lines(b"\n\n"), 2);
}

#[tokio::test]
async fn test_persist_metadata_and_config() {
    let root = TempDir::new().unwrap();
    let store = RealRunStore::create(root.path(), "run").await.unwrap();
    let config = BenchConfig::default();

    let mut metadata = RunMetadata::new(
        "run",
        &config,
        HostFacts::default(),
        compute_seed_duration(config.pre_seed_logs, 2_000.0),
        false,
    );
    metadata.stamp_now(Milestone::Start).unwrap();

    let metadata_path = store.persist_metadata(&metadata).await.unwrap();
    assert_eq!(metadata_path.file_name().unwrap(), METADATA_FILE);
    let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&metadata_path).unwrap()).unwrap();
    assert_eq!(value["run_name"], "run");
    assert_eq!(value["seed_duration_secs"], 55);
    assert_eq!(value["t_end"], "");
    assert_ne!(value["t_start"], "");
    assert_eq!(
        value["config"]["backends"]["elasticsearch"]["auth"]["password"],
        REDACTED
    );

    let config_path = store.persist_config_copy(&config).await.unwrap();
    assert_eq!(config_path.file_name().unwrap(), CONFIG_COPY_FILE);
    let copy = std::fs::read_to_string(&config_path).unwrap();
    assert!(!copy.contains("changeme"));

    let mut reloaded = BenchConfig::load(Path::new(&config_path)).unwrap();
    assert_eq!(reloaded.backend_names(), config.backend_names());
    reloaded.backends[1].auth = config.backends[1].auth.clone();
    assert_eq!(reloaded, config);
}
