//! Hardware integration tests for roroshetta-core
//!
//! These tests require a Bluetooth adapter and a Roroshetta Sense in range:
//! ```text
//! ROROSHETTA_DEVICE="C8:2B:96:10:20:30" cargo test --package roroshetta-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::timeout;

use roroshetta_core::{BleTransport, Coordinator, CoordinatorConfig, DeviceIdentity, RefreshOutcome, scan};

/// How long to listen for the device's advertisement.
const SCAN_TIMEOUT: Duration = Duration::from_secs(30);

fn get_device() -> Option<DeviceIdentity> {
    env::var("ROROSHETTA_DEVICE")
        .ok()
        .filter(|s| !s.is_empty())
        .map(DeviceIdentity::new)
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_discover_and_read() {
    let Some(target) = get_device() else {
        eprintln!("ROROSHETTA_DEVICE not set, skipping");
        return;
    };

    let adapter = scan::get_adapter(0).await.expect("no Bluetooth adapter");
    let mut adverts = scan::advertisements(&adapter).await.expect("scan failed");
    let coordinator = Coordinator::new(
        Arc::new(BleTransport::new(adapter.clone())),
        CoordinatorConfig::default(),
    );

    let found = timeout(SCAN_TIMEOUT, async {
        while let Some(adv) = adverts.next().await {
            if coordinator.on_advertisement(&adv).await.as_ref() == Some(&target) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    assert!(found, "{} was not advertised within {:?}", target, SCAN_TIMEOUT);

    let outcome = coordinator.request_refresh(&target).await.unwrap();
    scan::stop_scan(&adapter).await.ok();

    match outcome {
        RefreshOutcome::Published(reading) => {
            println!("{}: {}", target, reading);
            assert!((0.0..=100.0).contains(&reading.humidity));
        }
        other => panic!("expected a reading, got {:?}", other),
    }
}
