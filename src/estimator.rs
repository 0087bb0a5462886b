//! Orientation estimator fusing accelerometer, magnetometer and gyroscope samples

use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, trace, warn};

use crate::compass::absolute_fix;
use crate::math::{QuaternionExt, RAD_TO_DEG, Vector3Ext, wrap_degrees};
use crate::types::{
    FusionMode, FusionSettings, FusionState, Orientation, RawSample, STANDARD_GRAVITY, SensorAccuracy, SensorKind,
};

/// Slerp tolerance for rotations that are (nearly) opposite
const SLERP_EPSILON: f32 = 1e-6;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_TO_SECONDS: f32 = 1e-9;

/// Complementary-filter orientation estimator
///
/// Keeps a device-to-world rotation quaternion. Accelerometer samples compute an
/// absolute fix from gravity and the last magnetometer reading; gyroscope
/// samples integrate angular rate on top of it. The first gyroscope step after
/// an absolute fix switches the estimator to [`FusionMode::GyroIntegrated`],
/// after which each accelerometer sample only pulls the integrated rotation
/// `1 - filter_coefficient` of the way towards the fix. A gyroscope dropout
/// falls back to [`FusionMode::AccMagAbsolute`].
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use device_orientation::OrientationEstimator;
///
/// let mut estimator = OrientationEstimator::new();
/// estimator.on_magnetometer(Vector3::new(0.0, 22.0, -40.0), 0);
/// let orientation = estimator.on_accelerometer(Vector3::new(0.0, 0.0, 9.81), 1_000_000);
///
/// assert!(orientation.azimuth < 1e-3 || orientation.azimuth > 359.999);
/// assert!(orientation.pitch.abs() < 1e-3);
/// assert_eq!(orientation.timestamp, 1);
/// ```
#[derive(Debug, Clone)]
pub struct OrientationEstimator {
    settings: FusionSettings,
    state: FusionState,
}

impl OrientationEstimator {
    /// Create a new estimator with default settings
    pub fn new() -> Self {
        Self::with_settings(FusionSettings::default())
    }

    /// Create a new estimator with specified settings
    pub fn with_settings(settings: FusionSettings) -> Self {
        Self {
            settings,
            state: FusionState::default(),
        }
    }

    /// Return to the initial identity orientation in absolute mode
    ///
    /// Clears cached vectors, timestamps and reported accuracy.
    pub fn reset(&mut self) {
        self.state = FusionState::default();
    }

    pub fn settings(&self) -> FusionSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: FusionSettings) {
        self.settings = settings;
    }

    pub fn state(&self) -> &FusionState {
        &self.state
    }

    pub fn mode(&self) -> FusionMode {
        self.state.mode
    }

    /// Current device-to-world rotation
    pub fn quaternion(&self) -> UnitQuaternion<f32> {
        self.state.rotation
    }

    /// Dispatch a raw sample by kind
    ///
    /// Returns an orientation only for accelerometer samples, which drive the
    /// output cadence.
    pub fn update(&mut self, sample: &RawSample) -> Option<Orientation> {
        trace!(kind = %sample.kind, timestamp = sample.timestamp, "sensor sample");
        match sample.kind {
            SensorKind::Accelerometer => Some(self.on_accelerometer(sample.vector, sample.timestamp)),
            SensorKind::Gyroscope => {
                self.on_gyroscope(sample.vector, sample.timestamp);
                None
            }
            SensorKind::Magnetometer => {
                self.on_magnetometer(sample.vector, sample.timestamp);
                None
            }
        }
    }

    /// Process an accelerometer sample (m/s²) and return the updated orientation
    ///
    /// Without any magnetometer reading the heading is undefined; azimuth is
    /// then 0 in absolute mode, or held at the integrated value in gyro mode.
    /// A free-fall reading leaves the rotation untouched. In gyro mode a
    /// reading far from 1 g is ignored as linear acceleration, and a field
    /// outside the plausible geomagnetic range only corrects tilt.
    pub fn on_accelerometer(&mut self, accelerometer: Vector3<f32>, timestamp: u64) -> Orientation {
        self.state.last_accel = Some(accelerometer);
        self.state.last_timestamp = timestamp;

        let fallback_azimuth = match self.state.mode {
            FusionMode::AccMagAbsolute => 0.0,
            FusionMode::GyroIntegrated => {
                let (azimuth, _, _) = self.state.rotation.to_compass_angles(self.settings.gimbal_epsilon);
                azimuth
            }
        };

        // Rejection only applies once the gyroscope can carry the estimate
        let gyro_mode = self.state.mode == FusionMode::GyroIntegrated;
        let accelerometer_ignored = gyro_mode && !self.gravity_plausible(accelerometer);
        let magnetometer_ignored = gyro_mode
            && self
                .state
                .last_magnet
                .is_some_and(|magnetometer| !self.magnetic_field_plausible(magnetometer));
        if accelerometer_ignored && !self.state.accelerometer_ignored {
            debug!(?accelerometer, "linear acceleration detected, ignoring accelerometer");
        }
        if magnetometer_ignored && !self.state.magnetometer_ignored {
            debug!(magnetometer = ?self.state.last_magnet, "magnetic interference detected, holding heading");
        }
        self.state.accelerometer_ignored = accelerometer_ignored;
        self.state.magnetometer_ignored = magnetometer_ignored;
        if accelerometer_ignored {
            return self.current_orientation();
        }

        let magnetometer = if magnetometer_ignored { None } else { self.state.last_magnet };
        match absolute_fix(accelerometer, magnetometer, fallback_azimuth, &self.settings) {
            Some(fix) => {
                self.state.rotation = match self.state.mode {
                    FusionMode::AccMagAbsolute => fix,
                    FusionMode::GyroIntegrated => {
                        let weight = 1.0 - self.settings.filter_coefficient.clamp(0.0, 1.0);
                        self.state
                            .rotation
                            .try_slerp(&fix, weight, SLERP_EPSILON)
                            .unwrap_or(fix)
                    }
                };
                self.state.seeded = true;
            }
            None => debug!(?accelerometer, "accelerometer reading cannot define gravity, keeping estimate"),
        }

        self.current_orientation()
    }

    /// Store a magnetometer sample (µT)
    ///
    /// Does not recompute the orientation; the accelerometer stream drives
    /// recomputation.
    pub fn on_magnetometer(&mut self, magnetometer: Vector3<f32>, timestamp: u64) {
        self.state.last_magnet = Some(magnetometer);
        self.state.last_timestamp = timestamp;
    }

    /// Integrate a gyroscope sample (rad/s, device frame)
    ///
    /// The step is skipped when `dt <= 0` (out-of-order or repeated timestamp)
    /// or when `dt` exceeds the dropout bound; a dropout also returns the
    /// estimator to absolute mode. Before the first absolute fix, and after a
    /// dropout until the next one, the sample only anchors the timestamp.
    pub fn on_gyroscope(&mut self, gyroscope: Vector3<f32>, timestamp: u64) {
        self.state.last_timestamp = timestamp;
        let Some(previous) = self.state.last_gyro_timestamp.replace(timestamp) else {
            return;
        };
        if !self.state.seeded {
            return;
        }
        if timestamp <= previous {
            debug!(previous, timestamp, "gyroscope timestamp not increasing, skipping step");
            return;
        }

        let dt_ns = timestamp - previous;
        if dt_ns > self.settings.gyro_dropout_ns {
            debug!(dt_ns, "gyroscope dropout, skipping step");
            if self.state.mode == FusionMode::GyroIntegrated {
                debug!("switching to absolute mode");
                self.state.mode = FusionMode::AccMagAbsolute;
            }
            // Integration resumes only after the next absolute fix
            self.state.seeded = false;
            return;
        }
        if !gyroscope.all_finite() {
            warn!(?gyroscope, "non-finite gyroscope sample ignored");
            return;
        }

        let delta_time = dt_ns as f32 * NANOS_TO_SECONDS;
        self.integrate_quaternion(gyroscope, delta_time);

        if self.state.mode == FusionMode::AccMagAbsolute {
            debug!("switching to gyro-integrated mode");
            self.state.mode = FusionMode::GyroIntegrated;
        }
    }

    /// Record a platform accuracy report for one sensor
    pub fn set_accuracy(&mut self, kind: SensorKind, accuracy: SensorAccuracy) {
        self.state.accuracy[kind.index()] = accuracy;
        let unreliable = self.state.accuracy.contains(&SensorAccuracy::Unreliable);
        if unreliable && !self.state.accuracy_unreliable {
            warn!(sensor = %kind, "sensor accuracy unreliable, flagging output");
        }
        self.state.accuracy_unreliable = unreliable;
    }

    /// Project the current rotation to azimuth, pitch and roll in degrees
    pub fn current_orientation(&self) -> Orientation {
        let (azimuth, pitch, roll) = self.state.rotation.to_compass_angles(self.settings.gimbal_epsilon);
        Orientation {
            azimuth: wrap_degrees(azimuth * RAD_TO_DEG),
            pitch: (pitch * RAD_TO_DEG).clamp(-90.0, 90.0),
            roll: (roll * RAD_TO_DEG).clamp(-180.0, 180.0),
            timestamp: self.state.last_timestamp / NANOS_PER_MILLI,
            unreliable: self.state.accuracy_unreliable,
        }
    }

    fn gravity_plausible(&self, accelerometer: Vector3<f32>) -> bool {
        (accelerometer.norm() - STANDARD_GRAVITY).abs() <= self.settings.acceleration_rejection
    }

    fn magnetic_field_plausible(&self, magnetometer: Vector3<f32>) -> bool {
        (self.settings.min_magnetic_field..=self.settings.max_magnetic_field).contains(&magnetometer.norm())
    }

    /// Rotate by the body-frame angular rate over `delta_time` seconds
    fn integrate_quaternion(&mut self, gyroscope: Vector3<f32>, delta_time: f32) {
        // Exact exponential map: q ← q · exp(ω·dt / 2)
        let delta = UnitQuaternion::from_scaled_axis(gyroscope * delta_time);
        self.state.rotation = self.state.rotation * delta;
        self.state.rotation.renormalize();
    }
}

impl Default for OrientationEstimator {
    fn default() -> Self {
        Self::new()
    }
}
