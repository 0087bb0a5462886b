//! Mathematical utilities and nalgebra extensions for the orientation estimator

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

/// Mathematical constants
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
pub const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Normalize the vector, returning zero vector if magnitude is zero
    fn safe_normalize(&self) -> Vector3<f32>;

    /// Whether all components are finite
    fn all_finite(&self) -> bool;
}

impl Vector3Ext for Vector3<f32> {
    fn safe_normalize(&self) -> Vector3<f32> {
        let mag = self.norm();
        if mag > 0.0 && mag.is_finite() {
            *self / mag
        } else {
            Vector3::zeros()
        }
    }

    fn all_finite(&self) -> bool {
        self.iter().all(|c| c.is_finite())
    }
}

/// Extension trait converting device-to-world rotations to and from
/// compass angles.
///
/// The world frame is East-North-Up. Angles follow the handset convention:
/// `R = Rz(-azimuth) · Rx(-pitch) · Ry(roll)`, so that
/// - azimuth = atan2(R01, R11), clockwise from north
/// - pitch = asin(-R21)
/// - roll = atan2(-R20, R22)
pub trait QuaternionExt {
    /// Convert to (azimuth, pitch, roll) in radians
    ///
    /// Near pitch = ±90° azimuth and roll are no longer distinct. Once
    /// |R21| exceeds `1 - gimbal_epsilon` roll is pinned to zero and the
    /// combined rotation about the vertical is reported as azimuth, so both
    /// stay finite and well defined at the singularity.
    fn to_compass_angles(&self, gimbal_epsilon: f32) -> (f32, f32, f32);

    /// Create a device-to-world rotation from (azimuth, pitch, roll) in radians
    fn from_compass_angles(azimuth: f32, pitch: f32, roll: f32) -> UnitQuaternion<f32>;
}

impl QuaternionExt for UnitQuaternion<f32> {
    fn to_compass_angles(&self, gimbal_epsilon: f32) -> (f32, f32, f32) {
        let r: Matrix3<f32> = self.to_rotation_matrix().into_inner();
        let sin_pitch = (-r[(2, 1)]).clamp(-1.0, 1.0);
        let pitch = sin_pitch.asin();

        if sin_pitch.abs() > 1.0 - gimbal_epsilon {
            let azimuth = (sin_pitch.signum() * r[(0, 2)]).atan2(r[(0, 0)]);
            return (azimuth, pitch, 0.0);
        }

        let azimuth = r[(0, 1)].atan2(r[(1, 1)]);
        let roll = (-r[(2, 0)]).atan2(r[(2, 2)]);
        (azimuth, pitch, roll)
    }

    fn from_compass_angles(azimuth: f32, pitch: f32, roll: f32) -> UnitQuaternion<f32> {
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -azimuth)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -pitch)
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), roll)
    }
}

/// Wrap an angle in degrees into [0, 360)
pub fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_vector_extensions() {
        let v = Vector3::new(3.0f32, 4.0, 0.0);
        let normalized = v.safe_normalize();
        assert!((normalized.norm() - 1.0).abs() < 1e-6);

        assert_eq!(Vector3::<f32>::zeros().safe_normalize(), Vector3::zeros());
        assert!(!Vector3::new(f32::NAN, 0.0, 0.0).all_finite());
    }

    #[test]
    fn test_compass_angle_conversion() {
        let (azimuth, pitch, roll) = (60.0 * DEG_TO_RAD, 30.0 * DEG_TO_RAD, -45.0 * DEG_TO_RAD);
        let q = UnitQuaternion::from_compass_angles(azimuth, pitch, roll);
        let (a, p, r) = q.to_compass_angles(1e-6);

        assert!((a - azimuth).abs() < EPSILON, "azimuth {a}");
        assert!((p - pitch).abs() < EPSILON, "pitch {p}");
        assert!((r - roll).abs() < EPSILON, "roll {r}");
    }

    #[test]
    fn test_pure_heading_is_clockwise() {
        // Turning the device 90° counter-clockwise seen from above points its
        // top edge west, which is a compass heading of 270° (= -90°).
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), core::f32::consts::FRAC_PI_2);
        let (a, p, r) = q.to_compass_angles(1e-6);
        assert!((a + core::f32::consts::FRAC_PI_2).abs() < EPSILON);
        assert!(p.abs() < EPSILON);
        assert!(r.abs() < EPSILON);
    }

    #[test]
    fn test_gimbal_rule_keeps_azimuth() {
        let azimuth = 40.0 * DEG_TO_RAD;
        let q = UnitQuaternion::from_compass_angles(azimuth, core::f32::consts::FRAC_PI_2, 0.0);
        let (a, p, r) = q.to_compass_angles(1e-4);

        assert!(a.is_finite() && p.is_finite() && r.is_finite());
        assert!((p - core::f32::consts::FRAC_PI_2).abs() < 1e-2);
        assert_eq!(r, 0.0);
        assert!((a - azimuth).abs() < 1e-3, "azimuth {}", a * RAD_TO_DEG);
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(0.0), 0.0);
        assert!((wrap_degrees(-90.0) - 270.0).abs() < EPSILON);
        assert!((wrap_degrees(450.0) - 90.0).abs() < EPSILON);
        assert!(wrap_degrees(-1e-9) < 360.0);
    }
}
