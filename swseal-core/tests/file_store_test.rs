//! Loaders backed by the file store across restarts

mod common;

use common::{signed, Harness, Reply, ScriptedSource, SCRIPT_NAME};
use std::fs;
use std::sync::Arc;
use swseal_core::delivery::DeliveryState;
use swseal_core::store::{FileStore, RecordStore};
use swseal_core::LoaderConfig;
use tempfile::TempDir;

fn config_with_store(dir: &TempDir) -> LoaderConfig {
    LoaderConfig {
        store_path: Some(dir.path().join("state").join("records.json")),
        ..Default::default()
    }
}

fn file_store(config: &LoaderConfig) -> Arc<dyn RecordStore> {
    Arc::new(FileStore::new(config.store_path.clone().unwrap()))
}

#[tokio::test]
async fn test_restart_runs_persisted_script_offline() {
    let dir = TempDir::new().unwrap();
    let config = config_with_store(&dir);

    let first = Harness::with_store(
        config.clone(),
        ScriptedSource::new(vec![Reply::Payload(signed(1000, "text:v1"))]),
        file_store(&config),
    );
    first.loader.install().await;
    assert_eq!(first.loader.state(), DeliveryState::Ready);

    let restarted = Harness::with_store(
        config.clone(),
        ScriptedSource::new(vec![Reply::Offline]),
        file_store(&config),
    );
    restarted.loader.install().await;

    assert_eq!(restarted.loader.state(), DeliveryState::Ready);
    assert_eq!(restarted.runtime.runs(), vec!["text:v1".to_string()]);
    assert_eq!(restarted.source.calls(), 0);
}

#[tokio::test]
async fn test_corrupt_store_falls_through_to_network_and_is_replaced() {
    let dir = TempDir::new().unwrap();
    let config = config_with_store(&dir);
    let path = config.store_path.clone().unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "{ not json").unwrap();

    let harness = Harness::with_store(
        config.clone(),
        ScriptedSource::new(vec![Reply::Payload(signed(1000, "text:fresh"))]),
        file_store(&config),
    );
    harness.loader.install().await;

    assert_eq!(harness.loader.state(), DeliveryState::Ready);
    let record = harness.store.load(SCRIPT_NAME).await.unwrap().unwrap();
    assert_eq!(record.updated_time, 1000);
}

#[tokio::test]
async fn test_version_mismatch_is_a_cache_miss() {
    let dir = TempDir::new().unwrap();
    let config = config_with_store(&dir);
    let path = config.store_path.clone().unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, r#"{"version": 99, "records": {}}"#).unwrap();

    let harness = Harness::with_store(
        config.clone(),
        ScriptedSource::new(vec![Reply::NotFound]),
        file_store(&config),
    );
    harness.loader.install().await;

    assert_eq!(harness.loader.state(), DeliveryState::HardFail);
    assert_eq!(harness.source.calls(), 1);
}
