//! Absolute orientation fix from gravity and the geomagnetic field
//!
//! The accelerometer defines the world up axis in device coordinates and the
//! magnetometer, crossed with it, defines east. Together they give a full
//! device-to-world rotation without any history, which is noisy but never
//! drifts.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

use crate::math::{QuaternionExt, RAD_TO_DEG, Vector3Ext, wrap_degrees};
use crate::types::FusionSettings;

/// Compute the absolute device-to-world rotation
///
/// # Arguments
/// * `accelerometer` - Latest accelerometer reading (m/s², gravity included)
/// * `magnetometer` - Latest magnetometer reading, if any has arrived
/// * `fallback_azimuth` - Azimuth in radians used when the heading is undefined
/// * `settings` - Estimator settings providing the degeneracy thresholds
///
/// # Returns
/// `None` when the accelerometer reading is too small to define up (free fall)
/// or not finite. When the magnetometer is missing or parallel to gravity the
/// result is a tilt-only rotation carrying `fallback_azimuth`.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use device_orientation::{FusionSettings, compass::absolute_fix};
///
/// let accel = Vector3::new(0.0, 0.0, 9.81);   // lying flat, screen up
/// let mag = Vector3::new(0.0, 22.0, -40.0);   // top edge facing north
/// let q = absolute_fix(accel, Some(mag), 0.0, &FusionSettings::default()).unwrap();
/// assert!(q.angle() < 1e-4);
/// ```
pub fn absolute_fix(
    accelerometer: Vector3<f32>,
    magnetometer: Option<Vector3<f32>>,
    fallback_azimuth: f32,
    settings: &FusionSettings,
) -> Option<UnitQuaternion<f32>> {
    if !accelerometer.all_finite() || accelerometer.norm() < settings.min_gravity {
        return None;
    }
    let up = accelerometer.safe_normalize();

    if let Some(east) = magnetometer.and_then(|m| east_vector(up, m, settings)) {
        let north = up.cross(&east);
        let matrix = Matrix3::from_rows(&[east.transpose(), north.transpose(), up.transpose()]);
        let rotation = Rotation3::from_matrix_unchecked(matrix);
        return Some(UnitQuaternion::from_rotation_matrix(&rotation));
    }

    Some(tilt_fix(up, fallback_azimuth))
}

/// Calculate the tilt-compensated compass heading in degrees
///
/// # Returns
/// Heading in [0, 360), 0° = magnetic north, or `None` when gravity or the
/// heading is undefined.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use device_orientation::{FusionSettings, compass::calculate_heading};
///
/// let accel = Vector3::new(0.0, 0.0, 9.81);
/// let mag = Vector3::new(22.0, 0.0, -40.0);   // north lies along the device X axis
/// let heading = calculate_heading(accel, mag, &FusionSettings::default()).unwrap();
/// assert!((heading - 270.0).abs() < 1e-3);
/// ```
pub fn calculate_heading(
    accelerometer: Vector3<f32>,
    magnetometer: Vector3<f32>,
    settings: &FusionSettings,
) -> Option<f32> {
    if !accelerometer.all_finite() || accelerometer.norm() < settings.min_gravity {
        return None;
    }
    let up = accelerometer.safe_normalize();
    let east = east_vector(up, magnetometer, settings)?;
    let north = up.cross(&east);

    // Row 0 and row 1 of the rotation matrix, column 1 (device Y)
    let heading = east.y.atan2(north.y) * RAD_TO_DEG;
    Some(wrap_degrees(heading))
}

/// East axis in device coordinates, or `None` if the field is unusable
fn east_vector(up: Vector3<f32>, magnetometer: Vector3<f32>, settings: &FusionSettings) -> Option<Vector3<f32>> {
    if !magnetometer.all_finite() {
        return None;
    }
    let east = magnetometer.safe_normalize().cross(&up);
    if east.norm() < settings.min_heading_norm {
        return None;
    }
    Some(east.safe_normalize())
}

/// Rotation that levels `up` with the given azimuth
fn tilt_fix(up: Vector3<f32>, azimuth: f32) -> UnitQuaternion<f32> {
    // Third row of R is world up in device coordinates: [-cos(p)sin(r), -sin(p), cos(p)cos(r)]
    let pitch = (-up.y).clamp(-1.0, 1.0).asin();
    let roll = (-up.x).atan2(up.z);
    UnitQuaternion::from_compass_angles(azimuth, pitch, roll)
}
