use std::sync::mpsc;
use std::time::Duration;

use device_orientation::{
    BridgeMessage, PlatformError, RawSample, SamplingRate, SensorInfo, SensorKind, SensorPlatform, Session,
    SessionEvent, ThreadTimer,
};
use nalgebra::Vector3;

const SAMPLE_PERIOD_NS: u64 = 10_000_000; // 10 ms sample period

/// Platform with all three sensors that accepts every subscription
struct SimulatedPlatform;

impl SensorPlatform for SimulatedPlatform {
    fn sensors(&self) -> Vec<SensorInfo> {
        SensorKind::REQUIRED
            .into_iter()
            .map(|kind| SensorInfo::new(format!("simulated {kind}"), Some(kind)))
            .collect()
    }

    fn subscribe(&mut self, kind: SensorKind, rate: SamplingRate) -> Result<(), PlatformError> {
        println!("subscribe {kind} at {rate:?}");
        Ok(())
    }

    fn unsubscribe(&mut self, kind: SensorKind) {
        println!("unsubscribe {kind}");
    }
}

fn main() {
    let (event_tx, event_rx) = mpsc::channel();
    let (bridge_tx, bridge_rx) = mpsc::channel();

    let timer = ThreadTimer::new(event_tx.clone());
    let control = std::thread::spawn(move || {
        let mut session = Session::new(SimulatedPlatform, timer, bridge_tx);
        session.run(event_rx);
    });

    event_tx.send(SessionEvent::Start).expect("control thread alive");

    // Device lying flat, slowly turning clockwise at 9°/s
    let rate = Vector3::new(0.0, 0.0, -9.0_f32.to_radians());
    for i in 0..100u64 {
        let timestamp = i * SAMPLE_PERIOD_NS;
        let heading = (i as f32 * 0.09).to_radians();
        // Earth field rotates the other way in device coordinates
        let magnetometer = Vector3::new(-22.0 * heading.sin(), 22.0 * heading.cos(), -40.0);

        for sample in [
            RawSample::gyroscope(rate, timestamp),
            RawSample::magnetometer(magnetometer, timestamp),
            RawSample::accelerometer(Vector3::new(0.0, 0.0, 9.81), timestamp),
        ] {
            event_tx.send(SessionEvent::Sample(sample)).expect("control thread alive");
        }
    }
    event_tx.send(SessionEvent::Destroy).expect("control thread alive");
    control.join().expect("control thread panicked");

    while let Ok(message) = bridge_rx.recv_timeout(Duration::from_millis(10)) {
        if let BridgeMessage::Orientation(orientation) = &message {
            if orientation.timestamp % 100 != 0 {
                continue;
            }
        }
        println!("{}", message.to_json());
    }
}
