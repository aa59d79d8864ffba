//! End-to-end scenarios for the coordinator, driven through the mock transport.
//!
//! All tests run on a paused tokio clock, so backoff and timeouts are exact.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use roroshetta_core::mock::{MockTransport, Notification};
use roroshetta_core::uuid::{MANUFACTURER_ID, SENSE_SERVICE};
use roroshetta_core::{
    Advertisement, ConnectionFailureReason, Coordinator, CoordinatorConfig, DeviceEvent,
    DeviceIdentity, Error, PairingState, Publisher, Reading, RefreshOutcome, Result,
    SessionState,
};

#[derive(Default)]
struct Recorder {
    readings: Mutex<Vec<(DeviceIdentity, Reading)>>,
}

impl Recorder {
    fn count(&self) -> usize {
        self.readings.lock().unwrap().len()
    }
}

#[async_trait]
impl Publisher for Recorder {
    async fn publish(&self, identity: &DeviceIdentity, reading: &Reading) -> Result<()> {
        self.readings
            .lock()
            .unwrap()
            .push((identity.clone(), *reading));
        Ok(())
    }
}

fn kitchen() -> DeviceIdentity {
    DeviceIdentity::new("C8:2B:96:10:20:30")
}

fn reading_21_5() -> Reading {
    Reading {
        temperature: 21.5,
        humidity: 45.0,
        co2: 540,
        light_level: 12,
        fan_speed: 6,
        ..Default::default()
    }
}

async fn setup(mock: MockTransport) -> (Arc<MockTransport>, Coordinator, Arc<Recorder>) {
    let mock = Arc::new(mock);
    let coordinator = Coordinator::new(mock.clone(), CoordinatorConfig::default());
    let recorder = Arc::new(Recorder::default());
    coordinator.add_publisher(recorder.clone()).await;
    coordinator.register(kitchen(), None).await;
    (mock, coordinator, recorder)
}

#[tokio::test(start_paused = true)]
async fn always_failing_connect_is_bounded() {
    let (mock, coordinator, recorder) = setup(
        MockTransport::builder()
            .always_fail_connect(ConnectionFailureReason::GattEstablish)
            .build(),
    )
    .await;

    let outcomes = coordinator.on_tick().await;

    assert_eq!(outcomes.len(), 1);
    match &outcomes[0].1 {
        RefreshOutcome::Failed(Error::SessionFailed { attempts, .. }) => assert_eq!(*attempts, 3),
        other => panic!("expected failed session, got {:?}", other),
    }
    assert_eq!(mock.connect_count(), 3);

    let times = mock.connect_times();
    let first_gap = times[1] - times[0];
    let second_gap = times[2] - times[1];
    assert_eq!(first_gap, Duration::from_secs(1));
    assert_eq!(second_gap, first_gap * 2);

    assert_eq!(recorder.count(), 0);
    let record = coordinator.registry().get(&kitchen()).await.unwrap();
    assert_eq!(record.consecutive_failures, 1);
    assert_eq!(record.connection_state, SessionState::Failed);
    assert!(record.last_reading.is_none());
    assert!(record.last_error.unwrap().contains("GATT"));
}

#[tokio::test(start_paused = true)]
async fn success_on_second_attempt_resets_failures() {
    let (mock, coordinator, recorder) = setup(
        MockTransport::builder()
            .fail_connect_times(4, ConnectionFailureReason::GattEstablish)
            .reading(&reading_21_5())
            .build(),
    )
    .await;

    // Three failures use up the first tick
    coordinator.on_tick().await;
    assert_eq!(
        coordinator
            .registry()
            .get(&kitchen())
            .await
            .unwrap()
            .consecutive_failures,
        1
    );

    let started = Instant::now();
    let outcome = coordinator.request_refresh(&kitchen()).await.unwrap();

    let reading = outcome.reading().copied().unwrap();
    assert!((reading.temperature - 21.5).abs() < 0.01);
    assert!((reading.humidity - 45.0).abs() < 0.01);
    assert_eq!(started.elapsed(), Duration::from_secs(1));

    assert_eq!(recorder.count(), 1);
    let record = coordinator.registry().get(&kitchen()).await.unwrap();
    assert_eq!(record.consecutive_failures, 0);
    assert_eq!(record.last_reading, Some(reading));
    assert_eq!(record.connection_state, SessionState::Success);
    assert!(record.last_error.is_none());
    assert_eq!(mock.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_notifications_keep_last_reading() {
    let (mock, coordinator, recorder) = setup(MockTransport::builder().reading(&reading_21_5()).build()).await;

    let first = coordinator.request_refresh(&kitchen()).await.unwrap();
    let stored = first.reading().copied().unwrap();

    for _ in 0..3 {
        mock.push_notification(Notification::Silent);
    }
    let outcome = coordinator.request_refresh(&kitchen()).await.unwrap();

    match outcome {
        RefreshOutcome::Failed(e) => {
            assert!(matches!(e.root_cause(), Error::NotificationTimeout(_)))
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(recorder.count(), 1);

    let record = coordinator.registry().get(&kitchen()).await.unwrap();
    assert_eq!(record.consecutive_failures, 1);
    assert_eq!(record.last_reading, Some(stored));
    assert_eq!(mock.disconnect_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn overlapping_triggers_run_one_session() {
    let (mock, coordinator, recorder) = setup(
        MockTransport::builder()
            .connect_latency(Duration::from_secs(5))
            .build(),
    )
    .await;

    let id = kitchen();
    let (first, (second, tick)) = tokio::join!(coordinator.request_refresh(&id), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let second = coordinator.request_refresh(&id).await.unwrap();
        let tick = coordinator.on_tick().await;
        (second, tick)
    });

    assert!(first.unwrap().is_published());
    assert!(matches!(second, RefreshOutcome::Skipped));
    assert!(matches!(tick[0].1, RefreshOutcome::Skipped));
    assert_eq!(mock.connect_count(), 1);
    assert!(!mock.overlapping_connects());
    assert_eq!(recorder.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn removal_cancels_in_flight_session() {
    let (mock, coordinator, recorder) = setup(MockTransport::builder().silent().build()).await;
    let mut events = coordinator.subscribe();

    let id = kitchen();
    let (outcome, removed) = tokio::join!(coordinator.request_refresh(&id), async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        coordinator.remove(&id).await
    });

    assert!(removed);
    assert!(matches!(outcome.unwrap(), RefreshOutcome::Cancelled));
    assert_eq!(recorder.count(), 0);
    assert_eq!(mock.disconnect_count(), 1);
    assert_eq!(mock.open_connections(), 0);
    assert!(coordinator.registry().is_empty().await);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.iter().any(|e| matches!(e, DeviceEvent::Removed { .. })));
    assert!(seen.iter().any(|e| matches!(e, DeviceEvent::SessionCancelled { .. })));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_every_session() {
    let (mock, coordinator, recorder) = setup(MockTransport::builder().silent().build()).await;
    coordinator
        .register(DeviceIdentity::new("C8:2B:96:10:20:31"), None)
        .await;

    let (outcomes, _) = tokio::join!(coordinator.on_tick(), async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        coordinator.shutdown();
    });

    assert_eq!(outcomes.len(), 2);
    assert!(
        outcomes
            .iter()
            .all(|(_, o)| matches!(o, RefreshOutcome::Cancelled))
    );
    assert_eq!(recorder.count(), 0);
    assert_eq!(mock.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn pairing_is_recorded() {
    let (mock, coordinator, _recorder) = setup(MockTransport::builder().require_pairing().build()).await;
    let mut events = coordinator.subscribe();

    let outcome = coordinator.request_refresh(&kitchen()).await.unwrap();

    assert!(outcome.is_published());
    assert_eq!(mock.pair_count(), 1);
    let record = coordinator.registry().get(&kitchen()).await.unwrap();
    assert_eq!(record.pairing_state, PairingState::Paired);

    assert!(matches!(events.recv().await.unwrap(), DeviceEvent::SessionStarted { .. }));
    assert!(matches!(events.recv().await.unwrap(), DeviceEvent::Paired { .. }));
    assert!(matches!(events.recv().await.unwrap(), DeviceEvent::Reading { .. }));
}

#[tokio::test(start_paused = true)]
async fn advertised_devices_are_polled() {
    let mock = Arc::new(MockTransport::new());
    let coordinator = Coordinator::new(mock.clone(), CoordinatorConfig::default());
    let recorder = Arc::new(Recorder::default());
    coordinator.add_publisher(recorder.clone()).await;
    let mut events = coordinator.subscribe();

    let mut adv = Advertisement::new("c8:2b:96:aa:bb:cc");
    adv.manufacturer_data.insert(MANUFACTURER_ID, vec![0x01]);
    adv.service_data.insert(SENSE_SERVICE, vec![]);
    adv.rssi = Some(-64);

    let identity = coordinator.on_advertisement(&adv).await.unwrap();
    assert_eq!(coordinator.on_advertisement(&adv).await, Some(identity.clone()));

    // Manufacturer ID alone is not enough
    let mut stranger = Advertisement::new("11:22:33:44:55:66");
    stranger.manufacturer_data.insert(MANUFACTURER_ID, vec![0x01]);
    assert_eq!(coordinator.on_advertisement(&stranger).await, None);

    assert_eq!(coordinator.registry().len().await, 1);
    assert!(matches!(events.recv().await.unwrap(), DeviceEvent::Discovered { rssi: Some(-64), .. }));

    let outcomes = coordinator.on_tick().await;
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].1.is_published());
    assert_eq!(recorder.readings.lock().unwrap()[0].0, identity);
}

#[tokio::test(start_paused = true)]
async fn readvertised_device_waits_for_removed_session() {
    let (mock, coordinator, recorder) = setup(
        MockTransport::builder()
            .silent()
            .disconnect_latency(Duration::from_secs(5))
            .build(),
    )
    .await;

    let mut adv = Advertisement::new("C8:2B:96:10:20:30");
    adv.manufacturer_data.insert(MANUFACTURER_ID, vec![0x01]);
    adv.services.push(SENSE_SERVICE);

    let id = kitchen();
    let (first, (second, busy)) = tokio::join!(coordinator.request_refresh(&id), async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        coordinator.remove(&id).await;
        coordinator.on_advertisement(&adv).await;
        let busy = coordinator.registry().is_busy(&id).await;
        (coordinator.request_refresh(&id).await.unwrap(), busy)
    });

    assert!(matches!(first.unwrap(), RefreshOutcome::Cancelled));
    assert!(busy);
    assert!(matches!(second, RefreshOutcome::Skipped));
    assert_eq!(mock.connect_count(), 1);
    assert!(!mock.overlapping_connects());
    assert_eq!(mock.open_connections(), 0);

    // Once the old session has disconnected the device is free again
    mock.set_reading(&reading_21_5());
    let third = coordinator.request_refresh(&id).await.unwrap();
    assert!(third.is_published());
    assert_eq!(recorder.count(), 1);
    assert!(!mock.overlapping_connects());
}
