//! Device Orientation - fused azimuth, pitch and roll from inertial sensors
//!
//! This library turns three raw sensor streams (accelerometer, gyroscope and
//! magnetometer) into a single stable orientation estimate and delivers it to
//! a caller through a start/stop listener session.
//!
//! # Features
//!
//! - Absolute fix from gravity and the geomagnetic field
//! - Gyroscope integration with a complementary filter pulling towards the fix
//! - Dropout and out-of-order timestamp guards on the gyroscope path
//! - Gimbal-safe projection to compass angles
//! - Listener session with a cancellable startup watchdog
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use device_orientation::OrientationEstimator;
//!
//! let mut estimator = OrientationEstimator::new();
//!
//! // Sensor readings: µT, m/s², rad/s; timestamps in nanoseconds
//! estimator.on_magnetometer(Vector3::new(0.0, 22.0, -40.0), 0);
//! let orientation = estimator.on_accelerometer(Vector3::new(0.0, 0.0, 9.81), 0);
//! estimator.on_gyroscope(Vector3::new(0.0, 0.0, 0.1), 5_000_000);
//!
//! println!(
//!     "azimuth {:.1}°, pitch {:.1}°, roll {:.1}°",
//!     orientation.azimuth, orientation.pitch, orientation.roll
//! );
//! ```

pub mod compass;
mod error;
mod estimator;
mod math;
pub mod platform;
mod session;
mod types;

// Re-export all public types and functions
pub use compass::{absolute_fix, calculate_heading};
pub use error::{PlatformError, SessionError};
pub use estimator::OrientationEstimator;
pub use math::{DEG_TO_RAD, QuaternionExt, RAD_TO_DEG, Vector3Ext, wrap_degrees};
pub use platform::{
    Bridge, BridgeMessage, ManualTimer, SensorPlatform, SessionEvent, ThreadTimer, Timer, TimerHandle,
};
pub use session::Session;
pub use types::*;
