//! End-to-end listener session scenarios against a fake sensor platform

use std::sync::mpsc;
use std::time::Duration;

use device_orientation::{
    BridgeMessage, ManualTimer, OrientationEstimator, PlatformError, RawSample, SamplingRate, SensorInfo,
    SensorKind, SensorPlatform, Session, SessionEvent, SessionSettings, SessionStatus, ThreadTimer,
};
use nalgebra::Vector3;

const MS: u64 = 1_000_000;

/// Platform double recording every subscription change
#[derive(Debug, Default, Clone)]
struct FakePlatform {
    sensors: Vec<SensorInfo>,
    active: Vec<SensorKind>,
    subscribe_calls: Vec<(SensorKind, SamplingRate)>,
    unsubscribe_calls: usize,
}

impl FakePlatform {
    fn with(kinds: &[SensorKind]) -> Self {
        let mut sensors: Vec<SensorInfo> = kinds
            .iter()
            .map(|kind| SensorInfo::new(format!("{kind} sensor"), Some(*kind)))
            .collect();
        sensors.push(SensorInfo::new("Ambient light", None));
        Self {
            sensors,
            ..Default::default()
        }
    }

    fn complete() -> Self {
        Self::with(&SensorKind::REQUIRED)
    }
}

impl SensorPlatform for FakePlatform {
    fn sensors(&self) -> Vec<SensorInfo> {
        self.sensors.clone()
    }

    fn subscribe(&mut self, kind: SensorKind, rate: SamplingRate) -> Result<(), PlatformError> {
        if !self.sensors.iter().any(|s| s.kind == Some(kind)) {
            return Err(PlatformError::NotPresent(kind));
        }
        self.subscribe_calls.push((kind, rate));
        self.active.push(kind);
        Ok(())
    }

    fn unsubscribe(&mut self, kind: SensorKind) {
        self.unsubscribe_calls += 1;
        self.active.retain(|k| *k != kind);
    }
}

type TestSession = Session<FakePlatform, ManualTimer, Vec<BridgeMessage>>;

fn new_session(platform: FakePlatform) -> TestSession {
    Session::new(platform, ManualTimer::new(), Vec::new())
}

fn orientations(session: &TestSession) -> Vec<device_orientation::Orientation> {
    session
        .bridge()
        .iter()
        .filter_map(|m| match m {
            BridgeMessage::Orientation(o) => Some(*o),
            _ => None,
        })
        .collect()
}

fn failures(session: &TestSession) -> Vec<device_orientation::Failure> {
    session
        .bridge()
        .iter()
        .filter_map(|m| match m {
            BridgeMessage::Failure(f) => Some(f.clone()),
            _ => None,
        })
        .collect()
}

/// Advance the session's clock and deliver expired timers, like a host loop
fn advance(session: &mut TestSession, elapsed: Duration) {
    let expired = session.timer_mut().advance(elapsed);
    for handle in expired {
        session.on_watchdog(handle);
    }
}

#[test]
fn test_level_device_without_magnetometer() {
    let mut session = new_session(FakePlatform::complete());
    session.start();
    session.on_sample(RawSample::accelerometer(Vector3::new(0.0, 0.0, 9.8), 0));

    assert_eq!(session.status(), SessionStatus::Running);
    let emitted = orientations(&session);
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].azimuth, 0.0);
    assert!(emitted[0].pitch.abs() < 1e-3);
    assert!(emitted[0].roll.abs() < 1e-3);
    assert_eq!(emitted[0].timestamp, 0);
}

#[test]
fn test_missing_gyroscope_fails_immediately() {
    let mut session = new_session(FakePlatform::with(&[SensorKind::Accelerometer, SensorKind::Magnetometer]));
    session.start();

    assert_eq!(session.status(), SessionStatus::FailedToStart);
    assert!(session.platform().subscribe_calls.is_empty());
    assert!(session.timer().pending().is_empty());

    let failed = failures(&session);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].code, 3);
    assert!(failed[0].message.contains("accelerometer sensor"));
    assert!(failed[0].message.contains("Ambient light"));
}

#[test]
fn test_start_is_idempotent() {
    let mut session = new_session(FakePlatform::complete());
    session.start();
    session.start();
    assert_eq!(session.status(), SessionStatus::Starting);
    assert_eq!(session.platform().subscribe_calls.len(), 3);
    assert_eq!(session.timer().pending().len(), 1);

    session.on_sample(RawSample::magnetometer(Vector3::new(-22.0, 0.0, -40.0), 0));
    session.on_sample(RawSample::accelerometer(Vector3::new(0.0, 0.0, 9.8), MS));
    let state_before = *session.estimator().state();

    session.start();
    assert_eq!(session.status(), SessionStatus::Running);
    assert_eq!(session.platform().subscribe_calls.len(), 3);
    assert_eq!(*session.estimator().state(), state_before);
}

#[test]
fn test_subscribes_at_configured_rate() {
    let settings = SessionSettings {
        rate: SamplingRate::Game,
        ..Default::default()
    };
    let mut session = Session::with_settings(settings, FakePlatform::complete(), ManualTimer::new(), Vec::new());
    session.start();
    assert!(
        session
            .platform()
            .subscribe_calls
            .iter()
            .all(|(_, rate)| *rate == SamplingRate::Game)
    );
}

#[test]
fn test_restart_resets_fused_state() {
    let mut session = new_session(FakePlatform::complete());
    session.start();

    // Build up history: east-facing field, tilt, gyro rotation
    session.on_sample(RawSample::magnetometer(Vector3::new(-22.0, 0.0, -40.0), 0));
    session.on_sample(RawSample::accelerometer(Vector3::new(1.0, 2.0, 9.5), 0));
    session.on_sample(RawSample::gyroscope(Vector3::zeros(), 0));
    session.on_sample(RawSample::gyroscope(Vector3::new(0.5, 0.0, 1.0), 20 * MS));

    session.stop();
    assert_eq!(session.status(), SessionStatus::Stopped);
    assert!(session.platform().active.is_empty());

    session.start();
    let accel = Vector3::new(-0.5, 1.5, 9.6);
    session.on_sample(RawSample::accelerometer(accel, 100 * MS));

    let mut fresh = OrientationEstimator::new();
    fresh.reset();
    let expected = fresh.on_accelerometer(accel, 100 * MS);
    assert_eq!(orientations(&session).last(), Some(&expected));
}

#[test]
fn test_watchdog_fires_without_samples() {
    let mut session = new_session(FakePlatform::complete());
    session.start();

    advance(&mut session, Duration::from_millis(1999));
    assert_eq!(session.status(), SessionStatus::Starting);

    advance(&mut session, Duration::from_millis(1));
    assert_eq!(session.status(), SessionStatus::FailedToStart);
    assert!(session.platform().active.is_empty());

    let failed = failures(&session);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].code, 3);
    assert_eq!(failed[0].message, "Sensor listening could not be started");

    // Later samples and timer ticks change nothing
    session.on_sample(RawSample::accelerometer(Vector3::new(0.0, 0.0, 9.8), 0));
    advance(&mut session, Duration::from_secs(10));
    assert_eq!(session.status(), SessionStatus::FailedToStart);
    assert_eq!(failures(&session).len(), 1);
    assert!(orientations(&session).is_empty());
}

#[test]
fn test_sample_just_before_watchdog() {
    let mut session = new_session(FakePlatform::complete());
    session.start();

    advance(&mut session, Duration::from_millis(1999));
    session.on_sample(RawSample::accelerometer(Vector3::new(0.0, 0.0, 9.8), 1999 * MS));
    advance(&mut session, Duration::from_secs(5));

    assert_eq!(session.status(), SessionStatus::Running);
    assert!(failures(&session).is_empty());
    assert_eq!(orientations(&session).len(), 1);
}

#[test]
fn test_watchdog_from_previous_attempt_is_ignored() {
    let mut session = new_session(FakePlatform::complete());
    session.start();
    let old_handle = session.timer().pending()[0];
    session.stop();
    session.start();

    session.on_watchdog(old_handle);
    assert_eq!(session.status(), SessionStatus::Starting);
    assert!(failures(&session).is_empty());
}

#[test]
fn test_retry_after_failure() {
    let mut session = new_session(FakePlatform::complete());
    session.start();
    advance(&mut session, Duration::from_millis(2000));
    assert_eq!(session.status(), SessionStatus::FailedToStart);

    session.start();
    assert_eq!(session.status(), SessionStatus::Starting);
    session.on_sample(RawSample::accelerometer(Vector3::new(0.0, 0.0, 9.8), 0));
    assert_eq!(session.status(), SessionStatus::Running);
    assert_eq!(failures(&session).len(), 1);
}

#[test]
fn test_only_accelerometer_emits() {
    let mut session = new_session(FakePlatform::complete());
    session.start();
    session.on_sample(RawSample::accelerometer(Vector3::new(0.0, 0.0, 9.8), 0));

    for i in 1..10 {
        session.on_sample(RawSample::gyroscope(Vector3::new(0.0, 0.0, 0.2), i * 5 * MS));
        session.on_sample(RawSample::magnetometer(Vector3::new(0.0, 22.0, -40.0), i * 5 * MS));
    }
    assert_eq!(orientations(&session).len(), 1);

    session.on_sample(RawSample::accelerometer(Vector3::new(0.0, 0.0, 9.8), 50 * MS));
    let emitted = orientations(&session);
    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[1].timestamp, 50);
}

#[test]
fn test_stop_is_idempotent() {
    let mut session = new_session(FakePlatform::complete());
    session.stop();
    assert_eq!(session.platform().unsubscribe_calls, 0);

    session.start();
    session.stop();
    session.stop();
    session.on_destroy();
    assert_eq!(session.platform().unsubscribe_calls, 3);
    assert_eq!(session.status(), SessionStatus::Stopped);
}

#[test]
fn test_pause_keeps_fused_state() {
    let mut session = new_session(FakePlatform::complete());
    session.start();
    session.on_sample(RawSample::magnetometer(Vector3::new(-22.0, 0.0, -40.0), 0));
    session.on_sample(RawSample::accelerometer(Vector3::new(0.0, 0.0, 9.8), 0));

    session.on_pause();
    assert!(session.platform().active.is_empty());
    assert_eq!(session.status(), SessionStatus::Running);
    session.on_resume();
    assert_eq!(session.platform().active.len(), 3);

    // Magnetometer reading survived the pause
    session.on_sample(RawSample::accelerometer(Vector3::new(0.0, 0.0, 9.8), 10 * MS));
    let last = orientations(&session).pop().unwrap();
    assert!((last.azimuth - 90.0).abs() < 1e-3);
}

#[test]
fn test_threaded_control_loop() {
    let (event_tx, event_rx) = mpsc::channel();
    let (bridge_tx, bridge_rx) = mpsc::channel();
    let settings = SessionSettings {
        watchdog: Duration::from_millis(100),
        ..Default::default()
    };

    let timer = ThreadTimer::new(event_tx.clone());
    let worker = std::thread::spawn(move || {
        let mut session = Session::with_settings(settings, FakePlatform::complete(), timer, bridge_tx);
        session.run(event_rx);
        (session.status(), session.timer().armed())
    });

    event_tx.send(SessionEvent::Start).unwrap();
    let message = bridge_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    match message {
        BridgeMessage::Failure(failure) => assert_eq!(failure.code, 3),
        other => panic!("expected failure, got {other:?}"),
    }

    event_tx.send(SessionEvent::Start).unwrap();
    event_tx
        .send(SessionEvent::Sample(RawSample::accelerometer(Vector3::new(0.0, 0.0, 9.8), 0)))
        .unwrap();
    let message = bridge_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(message, BridgeMessage::Orientation(_)));
    assert_eq!(message.to_json()["azimuth"], serde_json::json!(0.0));

    event_tx.send(SessionEvent::Destroy).unwrap();
    // Both the fired and the disarmed watchdog released their handles
    assert_eq!(worker.join().unwrap(), (SessionStatus::Stopped, 0));
}
