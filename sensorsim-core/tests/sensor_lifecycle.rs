use sensorsim_core::config::{FleetConfig, SleepDefaults, SleepSpec};
use sensorsim_core::{ControlCommand, FleetBuilder, SensorError, SensorKind, SensorState, SleepBounds};
use sensorsim_devkit::{MockBus, TestHarness};
use std::time::{Duration, Instant};

fn fast() -> SleepBounds {
    SleepBounds::new(0.01, 0.02).unwrap()
}

#[tokio::test]
async fn ids_are_sequential_from_one() {
    let bus = MockBus::new();
    let mut builder = FleetBuilder::new(&bus, "ids");
    let ids: Vec<u32> = SensorKind::ALL.iter().map(|k| builder.add(*k, fast())).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);

    let fleet = builder.build();
    let listed: Vec<u32> = fleet.sensors().map(|s| s.id()).collect();
    assert_eq!(listed, ids);
    assert_eq!(fleet.get(0).unwrap().id(), 1);
    assert_eq!(fleet.find(4).unwrap().kind(), SensorKind::DissolvedOxygen);
    assert!(fleet.find(5).is_none());
}

#[tokio::test]
async fn from_config_builds_kinds_in_order() {
    let mut cfg = FleetConfig::default();
    cfg.sleep = SleepDefaults::uniform(SleepSpec { lower: 0.5, upper: 1.0 });
    let harness = TestHarness::from_config(&cfg).unwrap().attached().await;

    assert_eq!(harness.fleet.len(), 16);
    for (i, sensor) in harness.fleet.sensors().enumerate() {
        assert_eq!(sensor.id() as usize, i + 1);
        assert_eq!(sensor.kind(), SensorKind::ALL[i / 4]);
        assert_eq!(sensor.state(), SensorState::Idle);
    }
    assert!(harness.bus.is_connected("sensorsim-1"));
    assert!(harness.bus.is_connected("sensorsim-16"));
    assert_eq!(harness.bus.get_subscriptions().len(), 16);
    assert_eq!(harness.fleet.find(9).unwrap().name(), "CO2 no.: 9");

    harness.shutdown().await;
}

#[tokio::test]
async fn running_sensor_publishes_on_kind_topic() {
    let harness = TestHarness::new(&[SensorKind::Pressure], fast()).attached().await;
    let sensor = harness.sensor(1).unwrap().clone();
    sensor.start().await.unwrap();
    assert!(sensor.is_running());

    let messages = harness.wait_for_telemetry(1, 3, 2000).await.unwrap();
    for msg in &messages {
        assert_eq!(msg["sensorType"], "PRESSURE");
        assert_eq!(msg["unit"], "hPa");
        assert!(msg["value"].is_f64());
        assert!(msg["timestamp"].as_str().unwrap().ends_with('Z'));
    }
    assert_eq!(harness.bus.find_messages_by_topic("sensors/pressure").len(), messages.len());

    harness.shutdown().await;
}

#[tokio::test]
async fn no_telemetry_after_stop_returns() {
    let harness = TestHarness::new(&[SensorKind::Temperature], fast()).attached().await;
    let sensor = harness.sensor(1).unwrap().clone();
    sensor.start().await.unwrap();
    harness.wait_for_telemetry(1, 2, 2000).await.unwrap();

    sensor.stop().await;
    assert_eq!(sensor.state(), SensorState::Idle);
    let published = harness.telemetry_for(1).len();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.telemetry_for(1).len(), published);

    harness.shutdown().await;
}

#[tokio::test]
async fn stop_interrupts_a_long_sleep() {
    let slow = SleepBounds::new(5.0, 5.0).unwrap();
    let harness = TestHarness::new(&[SensorKind::Pressure], slow).attached().await;
    let sensor = harness.sensor(1).unwrap().clone();
    sensor.start().await.unwrap();
    harness.wait_for_telemetry(1, 1, 2000).await.unwrap();

    // la boucle dort maintenant 5s
    let begin = Instant::now();
    sensor.stop().await;
    let elapsed = begin.elapsed();
    assert!(elapsed < Duration::from_millis(200), "stop took {elapsed:?}");
    assert_eq!(sensor.state(), SensorState::Idle);

    let published = harness.telemetry_for(1).len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.telemetry_for(1).len(), published);

    harness.shutdown().await;
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let harness = TestHarness::new(&[SensorKind::Co2], fast()).attached().await;
    let sensor = harness.sensor(1).unwrap().clone();

    sensor.stop().await;
    assert_eq!(sensor.state(), SensorState::Idle);

    sensor.start().await.unwrap();
    sensor.start().await.unwrap();
    assert_eq!(harness.fleet.running_count(), 1);

    sensor.stop().await;
    sensor.stop().await;
    assert_eq!(harness.fleet.running_count(), 0);

    // un restart relance la production
    harness.bus.clear();
    sensor.start().await.unwrap();
    harness.wait_for_telemetry(1, 1, 2000).await.unwrap();

    harness.shutdown().await;
}

#[tokio::test]
async fn unreachable_bus_leaves_sensor_idle() {
    let harness = TestHarness::new(&[SensorKind::Temperature], fast());
    harness.bus.set_reachable(false);
    assert_eq!(harness.fleet.attach_all().await, 0);

    let sensor = harness.sensor(1).unwrap().clone();
    let err = sensor.start().await.unwrap_err();
    assert!(matches!(err, SensorError::Bus { id: 1, .. }));
    assert_eq!(sensor.state(), SensorState::Idle);
    assert!(!sensor.is_attached());

    // nouvel essai au prochain start
    harness.bus.set_reachable(true);
    sensor.start().await.unwrap();
    assert!(sensor.is_running());
    assert!(harness.bus.connect_attempts() >= 3);

    harness.shutdown().await;
}

#[tokio::test]
async fn generate_value_without_window_is_verbatim() {
    let harness = TestHarness::new(&[SensorKind::Temperature], fast()).attached().await;
    let sensor = harness.sensor(1).unwrap().clone();

    let msg = sensor.generate_value(100.0).await.unwrap();
    assert_eq!(msg.value, 100.0);
    assert_eq!(sensor.state(), SensorState::Idle);

    let published = harness.telemetry_for(1);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0]["value"], 100.0);
    assert_eq!(published[0]["sensorType"], "TEMPERATURE");
    assert_eq!(published[0]["unit"], "°C");

    harness.shutdown().await;
}

#[tokio::test]
async fn generate_value_is_clamped_to_window() {
    let harness = TestHarness::new(&[SensorKind::Co2], fast()).attached().await;
    let sensor = harness.sensor(1).unwrap().clone();
    sensor.set_range(0.0, 50.0).unwrap();

    assert_eq!(sensor.generate_value(100.0).await.unwrap().value, 50.0);
    assert_eq!(sensor.generate_value(-3.0).await.unwrap().value, 0.0);
    assert_eq!(sensor.generate_value(12.5).await.unwrap().value, 12.5);

    harness.shutdown().await;
}

#[tokio::test]
async fn generate_value_attaches_a_detached_sensor() {
    let harness = TestHarness::new(&[SensorKind::Pressure], fast());
    let sensor = harness.sensor(1).unwrap().clone();
    assert!(!sensor.is_attached());

    sensor.generate_value(990.0).await.unwrap();
    assert!(sensor.is_attached());
    assert_eq!(harness.bus.get_subscriptions().len(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn running_values_stay_inside_window() {
    let harness = TestHarness::new(&[SensorKind::DissolvedOxygen], fast()).attached().await;
    let sensor = harness.sensor(1).unwrap().clone();
    sensor.set_range(5.0, 6.0).unwrap();
    sensor.start().await.unwrap();

    let messages = harness.wait_for_telemetry(1, 5, 2000).await.unwrap();
    for msg in messages {
        let value = msg["value"].as_f64().unwrap();
        assert!((5.0..=6.0).contains(&value), "{value} outside window");
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn invalid_tunables_keep_previous_configuration() {
    let harness = TestHarness::new(&[SensorKind::Temperature], fast());
    let sensor = harness.sensor(1).unwrap().clone();

    sensor.set_range(0.0, 10.0).unwrap();
    assert!(matches!(sensor.set_range(5.0, 5.0), Err(SensorError::InvalidRange { .. })));
    assert!(sensor.set_range(9.0, 1.0).is_err());
    let window = sensor.range_window().unwrap();
    assert_eq!((window.min(), window.max()), (0.0, 10.0));

    assert!(matches!(sensor.set_rate(-5.0), Err(SensorError::InvalidRate(_))));
    assert!(sensor.set_rate(0.0).is_err());
    assert_eq!(sensor.sleep_bounds(), fast());

    let bounds = sensor.set_rate(60.0).unwrap();
    assert!((bounds.lower() - 0.9).abs() < 1e-9);
    assert!((bounds.upper() - 1.1).abs() < 1e-9);
    assert_eq!(sensor.sleep_bounds(), bounds);
}

#[tokio::test]
async fn shutdown_stops_and_detaches_everything() {
    let harness = TestHarness::new(&[SensorKind::Temperature, SensorKind::Co2], fast()).attached().await;
    harness.fleet.start_all().await;
    assert_eq!(harness.fleet.running_count(), 2);

    harness.shutdown().await;
    assert_eq!(harness.fleet.running_count(), 0);
    assert!(harness.fleet.sensors().all(|s| !s.is_attached()));
    assert!(harness.bus.get_subscriptions().is_empty());

    let published = harness.bus.get_published_messages().len();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(harness.bus.get_published_messages().len(), published);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_wins_against_late_start_commands() {
    let harness = TestHarness::new(&[SensorKind::Temperature, SensorKind::Co2, SensorKind::Pressure], fast())
        .attached()
        .await;

    // un client externe qui continue à envoyer des start pendant l'arrêt
    let bus = harness.bus.clone();
    let spammer = tokio::spawn(async move {
        loop {
            bus.simulate_incoming("sensors/control", ControlCommand::StartAll.to_payload());
            bus.simulate_incoming("sensors/control", ControlCommand::Start(1).to_payload());
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });
    let fleet = &harness.fleet;
    harness.wait_until(2000, || fleet.running_count() == 3).await.unwrap();

    harness.shutdown().await;
    assert_eq!(fleet.running_count(), 0);
    assert!(fleet.sensors().all(|s| !s.is_attached()));

    let published = harness.bus.get_published_messages().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fleet.running_count(), 0);
    assert_eq!(harness.bus.get_published_messages().len(), published);
    assert!(!fleet.submit(ControlCommand::StartAll));

    spammer.abort();
}
