//! Delivery state machine: startup, failures, resets and background refresh

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{request, signed, Harness, Reply, ScriptedSource, SCRIPT_NAME};
use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use swseal_core::delivery::DeliveryState;
use swseal_core::store::{MemoryStore, RecordStore, VerifiedRecord};
use swseal_core::LoaderConfig;

fn stored(modified_time: i64, body: &str, age: ChronoDuration) -> Arc<dyn RecordStore> {
    let mut record = VerifiedRecord::new(SCRIPT_NAME, signed(modified_time, body), modified_time);
    record.downloaded_time = Utc::now() - age;
    Arc::new(MemoryStore::with_record(record))
}

/// Let spawned background work run to completion
async fn settle_background(harness: &Harness, expected_calls: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while harness.source.calls() < expected_calls {
            tokio::task::yield_now().await;
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("background fetch never ran");
}

#[tokio::test]
async fn test_fresh_install_runs_fetched_script() {
    let harness = Harness::new(
        LoaderConfig::default(),
        ScriptedSource::new(vec![Reply::Payload(signed(1000, "text:hello"))]),
    );

    harness.loader.install().await;

    assert_eq!(harness.loader.state(), DeliveryState::Ready);
    assert_eq!(harness.runtime.runs(), vec!["text:hello".to_string()]);
    assert_eq!(harness.loader.current_payload().unwrap().modified_time, 1000);

    let record = harness.store.load(SCRIPT_NAME).await.unwrap().unwrap();
    assert_eq!(record.updated_time, 1000);
    assert_eq!(record.contents, signed(1000, "text:hello"));
}

#[tokio::test]
async fn test_week_old_record_runs_and_refreshes_in_background() {
    let harness = Harness::with_store(
        LoaderConfig::default(),
        ScriptedSource::new(vec![Reply::Payload(signed(2000, "text:new"))]),
        stored(1000, "text:old", ChronoDuration::days(8)),
    );

    harness.loader.install().await;

    // the stored script is running before the network answers
    assert_eq!(harness.loader.state(), DeliveryState::Ready);
    assert_eq!(harness.runtime.runs()[0], "text:old");

    settle_background(&harness, 1).await;
    assert_eq!(harness.source.calls(), 1);
    assert_eq!(harness.loader.state(), DeliveryState::Ready);
    assert_eq!(
        harness.runtime.runs(),
        vec!["text:old".to_string(), "text:new".to_string()]
    );

    let record = harness.store.load(SCRIPT_NAME).await.unwrap().unwrap();
    assert_eq!(record.updated_time, 2000);
    assert!(record.downloaded_time > Utc::now() - ChronoDuration::minutes(1));
}

#[tokio::test]
async fn test_recent_record_is_not_refreshed() {
    let harness = Harness::with_store(
        LoaderConfig::default(),
        ScriptedSource::new(vec![Reply::Payload(signed(2000, "text:new"))]),
        stored(1000, "text:old", ChronoDuration::days(1)),
    );

    harness.loader.install().await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(harness.loader.state(), DeliveryState::Ready);
    assert_eq!(harness.source.calls(), 0);
}

#[tokio::test]
async fn test_huge_refresh_interval_never_refreshes() {
    let config = LoaderConfig {
        refresh_after_days: 1_000_000_000,
        ..Default::default()
    };
    let harness = Harness::with_store(
        config,
        ScriptedSource::new(vec![Reply::Payload(signed(2000, "text:new"))]),
        stored(1000, "text:old", ChronoDuration::days(400)),
    );

    harness.loader.install().await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(harness.loader.state(), DeliveryState::Ready);
    assert_eq!(harness.runtime.runs(), vec!["text:old".to_string()]);
    assert_eq!(harness.source.calls(), 0);

    let response = harness.loader.fetch(request("/")).await;
    assert_eq!(response.text(), "old");
}

#[tokio::test]
async fn test_record_downloaded_in_the_future_is_refreshed() {
    let harness = Harness::with_store(
        LoaderConfig::default(),
        ScriptedSource::new(vec![Reply::Payload(signed(2000, "text:new"))]),
        stored(1000, "text:old", ChronoDuration::days(-3)),
    );

    harness.loader.install().await;
    settle_background(&harness, 1).await;

    assert_eq!(harness.source.calls(), 1);
}

#[tokio::test]
async fn test_invalid_record_falls_through_to_network() {
    let mut record = VerifiedRecord::new(SCRIPT_NAME, signed(1000, "text:old"), 1000);
    record.contents = record.contents.replace("text:old", "text:evil");
    let harness = Harness::with_store(
        LoaderConfig::default(),
        ScriptedSource::new(vec![Reply::Payload(signed(1500, "text:fetched"))]),
        Arc::new(MemoryStore::with_record(record)),
    );

    harness.loader.install().await;

    assert_eq!(harness.loader.state(), DeliveryState::Ready);
    assert_eq!(harness.runtime.runs(), vec!["text:fetched".to_string()]);
}

#[tokio::test]
async fn test_not_found_is_hard_fail() {
    let harness = Harness::new(
        LoaderConfig::default(),
        ScriptedSource::new(vec![Reply::NotFound]),
    );

    harness.loader.install().await;
    assert_eq!(harness.loader.state(), DeliveryState::HardFail);

    let response = harness.loader.fetch(request("/")).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.status_text, "Service Unavailable");
    assert!(response.text().contains("Security error"));
    assert!(harness.runtime.runs().is_empty());
}

#[tokio::test]
async fn test_rejected_payload_is_hard_fail() {
    let tampered = signed(1000, "text:ok").replace("text:ok", "text:evil");
    let harness = Harness::new(
        LoaderConfig::default(),
        ScriptedSource::new(vec![Reply::Payload(tampered)]),
    );

    harness.loader.install().await;

    assert_eq!(harness.loader.state(), DeliveryState::HardFail);
    assert!(harness.runtime.runs().is_empty());
    assert!(harness.store.load(SCRIPT_NAME).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_network_error_soft_fails_then_resets() {
    let harness = Harness::new(
        LoaderConfig::default(),
        ScriptedSource::new(vec![Reply::Offline]),
    );

    harness.loader.install().await;
    assert_eq!(harness.loader.state(), DeliveryState::SoftFail);

    let response = harness.loader.fetch(request("/")).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.text().contains("Error loading the page"));

    tokio::time::sleep(Duration::from_millis(4900)).await;
    assert_eq!(harness.loader.state(), DeliveryState::SoftFail);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.loader.state(), DeliveryState::Loading);
    assert_eq!(harness.source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_after_reset_retries_the_load() {
    let harness = Harness::new(
        LoaderConfig::default(),
        ScriptedSource::new(vec![
            Reply::Offline,
            Reply::Payload(signed(1000, "text:back online")),
        ]),
    );

    harness.loader.install().await;
    assert_eq!(harness.loader.state(), DeliveryState::SoftFail);

    tokio::time::sleep(Duration::from_millis(5001)).await;
    assert_eq!(harness.loader.state(), DeliveryState::Loading);

    let response = harness.loader.fetch(request("/")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "back online");
    assert_eq!(harness.loader.state(), DeliveryState::Ready);
    assert_eq!(harness.source.calls(), 2);
}

#[tokio::test]
async fn test_script_fault_is_run_fail() {
    for body in ["throw:boom", "panic"] {
        let harness = Harness::new(
            LoaderConfig::default(),
            ScriptedSource::new(vec![Reply::Payload(signed(1000, body))]),
        );

        harness.loader.install().await;
        assert_eq!(harness.loader.state(), DeliveryState::RunFail, "{body}");

        let response = harness.loader.fetch(request("/")).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.status_text, "Internal Server Error");
        assert!(response.text().contains("Script error"));
    }
}

#[tokio::test]
async fn test_failed_background_refresh_keeps_ready() {
    for reply in [
        Reply::NotFound,
        Reply::Offline,
        Reply::Payload("garbage".to_string()),
    ] {
        let harness = Harness::with_store(
            LoaderConfig::default(),
            ScriptedSource::new(vec![reply.clone()]),
            stored(1000, "text:old", ChronoDuration::days(30)),
        );

        harness.loader.install().await;
        settle_background(&harness, 1).await;

        assert_eq!(harness.loader.state(), DeliveryState::Ready, "{reply:?}");
        assert_eq!(harness.runtime.runs(), vec!["text:old".to_string()]);
        let record = harness.store.load(SCRIPT_NAME).await.unwrap().unwrap();
        assert_eq!(record.updated_time, 1000);
    }
}

/// By default the stored modification time is not enforced on background
/// refresh, so an older signed payload replaces the stored one.
#[tokio::test]
async fn test_background_refresh_accepts_older_payload_by_default() {
    let harness = Harness::with_store(
        LoaderConfig::default(),
        ScriptedSource::new(vec![Reply::Payload(signed(500, "text:older"))]),
        stored(1000, "text:current", ChronoDuration::days(8)),
    );

    harness.loader.install().await;
    settle_background(&harness, 1).await;

    let record = harness.store.load(SCRIPT_NAME).await.unwrap().unwrap();
    assert_eq!(record.updated_time, 500);
    assert_eq!(
        harness.runtime.runs(),
        vec!["text:current".to_string(), "text:older".to_string()]
    );
}

#[tokio::test]
async fn test_background_refresh_can_enforce_newer_payload() {
    let config = LoaderConfig {
        enforce_refresh_min_mod_time: true,
        ..Default::default()
    };
    let harness = Harness::with_store(
        config,
        ScriptedSource::new(vec![Reply::Payload(signed(1000, "text:same age"))]),
        stored(1000, "text:current", ChronoDuration::days(8)),
    );

    harness.loader.install().await;
    settle_background(&harness, 1).await;

    let record = harness.store.load(SCRIPT_NAME).await.unwrap().unwrap();
    assert_eq!(record.contents, signed(1000, "text:current"));
    assert_eq!(harness.runtime.runs(), vec!["text:current".to_string()]);
    assert_eq!(harness.loader.state(), DeliveryState::Ready);
}

#[tokio::test]
async fn test_activate_after_install_keeps_ready() {
    let harness = Harness::new(
        LoaderConfig::default(),
        ScriptedSource::new(vec![Reply::Payload(signed(1000, "text:hi"))]),
    );

    harness.loader.install().await;
    harness.loader.activate();
    assert_eq!(harness.loader.state(), DeliveryState::Ready);
    assert_eq!(harness.source.calls(), 1);
}
