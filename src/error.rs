use crate::types::{Failure, SensorInfo, SensorKind, SessionStatus};

/// Errors reported by the sensor platform
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Sensor not present: {0}")]
    NotPresent(SensorKind),

    #[error("Listener registration rejected for {0}")]
    Rejected(SensorKind),
}

/// Errors that end a session start attempt
///
/// Every variant is terminal for the current attempt and is surfaced to the
/// caller exactly once as a [`Failure`] with code `ERROR_FAILED_TO_START`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Not all sensors available: {}", sensor_names(.sensors))]
    SensorUnavailable { sensors: Vec<SensorInfo> },

    #[error("Sensor listening could not be started")]
    StartTimeout,

    #[error("Could not subscribe to {kind}: {source}")]
    SubscribeFailed {
        kind: SensorKind,
        #[source]
        source: PlatformError,
    },
}

impl SessionError {
    pub fn to_failure(&self) -> Failure {
        Failure {
            code: SessionStatus::ERROR_FAILED_TO_START,
            message: self.to_string(),
        }
    }
}

fn sensor_names(sensors: &[SensorInfo]) -> String {
    let names: Vec<&str> = sensors.iter().map(|s| s.name.as_str()).collect();
    names.join(", ")
}
