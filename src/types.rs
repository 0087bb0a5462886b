//! Core types and settings for the device orientation library

use core::time::Duration;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Kind of inertial sensor feeding the estimator
///
/// Sensor-native units follow the platform conventions:
/// - **Accelerometer**: m/s², gravity included
/// - **Gyroscope**: rad/s, device frame
/// - **Magnetometer**: µT, device frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    Magnetometer,
}

impl SensorKind {
    /// The three sensors a session needs before it can start
    pub const REQUIRED: [SensorKind; 3] = [
        SensorKind::Accelerometer,
        SensorKind::Gyroscope,
        SensorKind::Magnetometer,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            SensorKind::Accelerometer => 0,
            SensorKind::Gyroscope => 1,
            SensorKind::Magnetometer => 2,
        }
    }
}

impl core::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::Magnetometer => "magnetometer",
        };
        f.write_str(name)
    }
}

/// One sensor reading as delivered by the platform
///
/// Samples are consumed immediately by the estimator and never retained
/// beyond the update they trigger (only the vector is cached).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub kind: SensorKind,
    pub vector: Vector3<f32>,
    /// Monotonic sensor clock in nanoseconds
    pub timestamp: u64,
}

impl RawSample {
    pub fn new(kind: SensorKind, vector: Vector3<f32>, timestamp: u64) -> Self {
        Self {
            kind,
            vector,
            timestamp,
        }
    }

    pub fn accelerometer(vector: Vector3<f32>, timestamp: u64) -> Self {
        Self::new(SensorKind::Accelerometer, vector, timestamp)
    }

    pub fn gyroscope(vector: Vector3<f32>, timestamp: u64) -> Self {
        Self::new(SensorKind::Gyroscope, vector, timestamp)
    }

    pub fn magnetometer(vector: Vector3<f32>, timestamp: u64) -> Self {
        Self::new(SensorKind::Magnetometer, vector, timestamp)
    }
}

/// Calibration accuracy reported by the platform for a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum SensorAccuracy {
    Unreliable,
    Low,
    Medium,
    #[default]
    High,
}

impl SensorAccuracy {
    /// Map a raw platform accuracy level (0..=3) to an accuracy value
    ///
    /// Unknown levels are treated as unreliable.
    pub fn from_level(level: i32) -> Self {
        match level {
            1 => SensorAccuracy::Low,
            2 => SensorAccuracy::Medium,
            3 => SensorAccuracy::High,
            _ => SensorAccuracy::Unreliable,
        }
    }
}

/// Which update path is authoritative for the rotation estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionMode {
    /// Rotation is replaced by the accelerometer/magnetometer fix on every
    /// accelerometer sample
    #[default]
    AccMagAbsolute,
    /// Rotation is propagated by gyroscope integration and pulled towards the
    /// absolute fix by the complementary filter
    GyroIntegrated,
}

/// Persistent internal state of the orientation estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionState {
    pub mode: FusionMode,
    /// Device to world (East-North-Up) rotation
    pub rotation: UnitQuaternion<f32>,
    pub last_accel: Option<Vector3<f32>>,
    pub last_magnet: Option<Vector3<f32>>,
    pub last_gyro_timestamp: Option<u64>,
    /// Whether an absolute fix has seeded the rotation since the last reset
    /// or gyroscope dropout
    pub seeded: bool,
    /// Last accelerometer sample was rejected as linear acceleration
    pub accelerometer_ignored: bool,
    /// Last magnetometer reading was rejected as magnetic interference
    pub magnetometer_ignored: bool,
    pub accuracy: [SensorAccuracy; 3],
    pub accuracy_unreliable: bool,
    /// Timestamp of the most recent sample of any kind, nanoseconds
    pub last_timestamp: u64,
}

impl Default for FusionState {
    fn default() -> Self {
        Self {
            mode: FusionMode::AccMagAbsolute,
            rotation: UnitQuaternion::identity(),
            last_accel: None,
            last_magnet: None,
            last_gyro_timestamp: None,
            seeded: false,
            accelerometer_ignored: false,
            magnetometer_ignored: false,
            accuracy: [SensorAccuracy::default(); 3],
            accuracy_unreliable: false,
            last_timestamp: 0,
        }
    }
}

/// Orientation snapshot delivered to the caller
///
/// All angles are in degrees:
/// - `azimuth` ∈ [0, 360): clockwise compass heading, 0 = magnetic north
/// - `pitch` ∈ [-90, 90]: rotation about the device X axis
/// - `roll` ∈ [-180, 180]: rotation about the device Y axis
///
/// `timestamp` is the sensor timestamp of the triggering sample in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub azimuth: f32,
    pub pitch: f32,
    pub roll: f32,
    pub timestamp: u64,
    /// Set while the platform reports unreliable sensor calibration
    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub unreliable: bool,
}

impl Orientation {
    /// Encode as the JSON object the host bridge forwards to the caller
    pub fn to_json(&self) -> serde_json::Value {
        // Serializing plain numbers and a bool cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Listener session status
///
/// The numeric codes are part of the host bridge contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    FailedToStart,
}

impl SessionStatus {
    pub const STOPPED: i32 = 0;
    pub const STARTING: i32 = 1;
    pub const RUNNING: i32 = 2;
    pub const ERROR_FAILED_TO_START: i32 = 3;

    pub fn code(self) -> i32 {
        match self {
            SessionStatus::Stopped => Self::STOPPED,
            SessionStatus::Starting => Self::STARTING,
            SessionStatus::Running => Self::RUNNING,
            SessionStatus::FailedToStart => Self::ERROR_FAILED_TO_START,
        }
    }

    /// Whether the session currently holds (or wants) sensor subscriptions
    pub fn is_active(self) -> bool {
        matches!(self, SessionStatus::Starting | SessionStatus::Running)
    }
}

/// Failure payload delivered to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub code: i32,
    pub message: String,
}

impl Failure {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// One entry of the platform's sensor enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub name: String,
    /// `None` for sensors the estimator does not consume
    pub kind: Option<SensorKind>,
}

impl SensorInfo {
    pub fn new(name: impl Into<String>, kind: Option<SensorKind>) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Requested sensor delivery rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SamplingRate {
    #[default]
    Fastest,
    Game,
    Ui,
    Normal,
}

/// Estimator settings
///
/// # Example
/// ```
/// use device_orientation::FusionSettings;
///
/// let settings = FusionSettings {
///     filter_coefficient: 0.95,   // trust the absolute fix a little more
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    /// Weight of the gyroscope path in the complementary filter (0..=1)
    ///
    /// On each accelerometer sample in gyro mode the estimate moves
    /// `1 - filter_coefficient` of the way towards the absolute fix.
    pub filter_coefficient: f32,
    /// Largest gyroscope sample gap that is still integrated, nanoseconds
    pub gyro_dropout_ns: u64,
    /// Accelerometer magnitudes below this (m/s²) are treated as free fall
    pub min_gravity: f32,
    /// Minimum normalised east-vector magnitude for a usable heading
    ///
    /// Guards against a magnetic field parallel to gravity.
    pub min_heading_norm: f32,
    /// Distance of |sin(pitch)| from 1 at which the gimbal rule applies
    pub gimbal_epsilon: f32,
    /// Largest deviation of the accelerometer magnitude from standard gravity
    /// (m/s²) still blended in gyro mode
    ///
    /// Larger deviations are treated as linear acceleration and ignored.
    pub acceleration_rejection: f32,
    /// Smallest magnetic field magnitude (µT) still used for heading in gyro mode
    pub min_magnetic_field: f32,
    /// Largest magnetic field magnitude (µT) still used for heading in gyro mode
    pub max_magnetic_field: f32,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            filter_coefficient: 0.98,
            gyro_dropout_ns: 1_000_000_000,
            min_gravity: 0.1 * STANDARD_GRAVITY,
            min_heading_norm: 0.1,
            gimbal_epsilon: 1e-6,
            acceleration_rejection: 0.25 * STANDARD_GRAVITY,
            min_magnetic_field: 10.0,
            max_magnetic_field: 100.0,
        }
    }
}

/// Standard gravity, m/s²
pub const STANDARD_GRAVITY: f32 = 9.806_65;

/// Listener session settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Time allowed between `start` and the first accelerometer sample
    pub watchdog: Duration,
    pub rate: SamplingRate,
    pub fusion: FusionSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            watchdog: Duration::from_millis(2000),
            rate: SamplingRate::Fastest,
            fusion: FusionSettings::default(),
        }
    }
}
