// telemetry.rs — Per-row derivation for the playback layer
//
// Pure functions of a single row: no state, no I/O. The index calls into
// this on demand for single-row lookups and for the bulk attitude extract.

use crate::types::{xyzw, Quat, Sample};
use nalgebra::Quaternion;
use serde::{Deserialize, Serialize};

const MIN_QUAT_NORM: f64 = 1e-12;

/// Roll/pitch/yaw in degrees (extrinsic XYZ).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Everything the record builder needs from one row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DerivedTelemetry {
    pub vehicle_world: Quat,
    pub helmet_world: Quat,
    pub vehicle_euler: EulerAngles,
    pub helmet_euler: EulerAngles,
    pub ground_speed: f64,
}

/// Treat a stored quaternion as a rotation: unit length, or identity when
/// the stored value has no usable norm.
pub fn as_rotation(q: &Quat) -> Quat {
    let norm = q.norm();
    if norm.is_finite() && norm > MIN_QUAT_NORM {
        q.normalize()
    } else {
        Quaternion::identity()
    }
}

/// Promote a sensor orientation expressed in the vehicle frame to the world
/// frame: `world = vehicle ⨯ local` (Hamilton product, order matters).
pub fn compose(vehicle_world: &Quat, sensor_local: &Quat) -> Quat {
    vehicle_world * sensor_local
}

/// Quaternion to roll/pitch/yaw in degrees.
///
/// The pitch argument is clamped to [-1, 1] so rounding near gimbal lock
/// cannot produce NaN.
pub fn quat_to_euler_deg(q: &Quat) -> EulerAngles {
    let [x, y, z, w] = xyzw(q);

    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    let sin_pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0);
    let pitch = sin_pitch.asin();
    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));

    EulerAngles {
        roll: roll.to_degrees(),
        pitch: pitch.to_degrees(),
        yaw: yaw.to_degrees(),
    }
}

/// Euclidean norm of the NED velocity triple.
pub fn ground_speed(north: f64, east: f64, down: f64) -> f64 {
    (north * north + east * east + down * down).sqrt()
}

/// Vehicle attitude only; used by the bulk extractor.
pub fn vehicle_attitude(sample: &Sample) -> EulerAngles {
    quat_to_euler_deg(&as_rotation(&sample.vehicle_quat()))
}

pub fn derive(sample: &Sample) -> DerivedTelemetry {
    let vehicle_world = as_rotation(&sample.vehicle_quat());
    let helmet_local = as_rotation(&sample.helmet_quat());
    let helmet_world = compose(&vehicle_world, &helmet_local);
    let (north, east, down) = sample.velocity_ned();

    DerivedTelemetry {
        vehicle_world,
        helmet_world,
        vehicle_euler: quat_to_euler_deg(&vehicle_world),
        helmet_euler: quat_to_euler_deg(&helmet_world),
        ground_speed: ground_speed(north, east, down),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::quat_xyzw;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_1_SQRT_2;

    fn assert_quat_eq(a: &Quat, b: &Quat) {
        let (a, b) = (xyzw(a), xyzw(b));
        for i in 0..4 {
            assert_relative_eq!(a[i], b[i], epsilon = 1e-12);
        }
    }

    // 90° about z
    fn yaw90() -> Quat {
        quat_xyzw(0.0, 0.0, FRAC_1_SQRT_2, FRAC_1_SQRT_2)
    }

    // 90° about x
    fn roll90() -> Quat {
        quat_xyzw(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2)
    }

    #[test]
    fn test_identity_composition() {
        let q = as_rotation(&quat_xyzw(0.1, -0.2, 0.3, 0.9));
        let id = Quaternion::identity();
        assert_quat_eq(&compose(&id, &q), &q);
        assert_quat_eq(&compose(&q, &id), &q);
    }

    #[test]
    fn test_conjugate_composition_is_identity() {
        let q = yaw90();
        let result = compose(&q, &q.conjugate());
        assert_quat_eq(&result, &Quaternion::identity());
    }

    #[test]
    fn test_composition_order_matters() {
        let a = compose(&yaw90(), &roll90());
        let b = compose(&roll90(), &yaw90());
        // Hamilton product of (z90)(x90): x = y = z = w = 0.5
        assert_quat_eq(&a, &quat_xyzw(0.5, 0.5, 0.5, 0.5));
        assert!((xyzw(&a)[1] - xyzw(&b)[1]).abs() > 0.5);
    }

    #[test]
    fn test_euler_single_axes() {
        let e = quat_to_euler_deg(&yaw90());
        assert_relative_eq!(e.yaw, 90.0, epsilon = 1e-9);
        assert_relative_eq!(e.roll, 0.0, epsilon = 1e-9);
        assert_relative_eq!(e.pitch, 0.0, epsilon = 1e-9);

        let e = quat_to_euler_deg(&roll90());
        assert_relative_eq!(e.roll, 90.0, epsilon = 1e-9);

        let pitch30 = quat_xyzw(0.0, (15.0f64).to_radians().sin(), 0.0, (15.0f64).to_radians().cos());
        let e = quat_to_euler_deg(&pitch30);
        assert_relative_eq!(e.pitch, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gimbal_lock_clamp() {
        // Slightly over-unit quaternion pushes 2(wy - zx) past 1.0
        let q = quat_xyzw(0.0, 0.707_107, 0.0, 0.707_107);
        let e = quat_to_euler_deg(&q);
        assert!(!e.pitch.is_nan());
        assert_relative_eq!(e.pitch, 90.0, epsilon = 1e-9);

        let q = quat_xyzw(0.0, -0.707_107, 0.0, 0.707_107);
        assert_relative_eq!(quat_to_euler_deg(&q).pitch, -90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ground_speed() {
        assert_relative_eq!(ground_speed(3.0, 4.0, 0.0), 5.0);
        assert_relative_eq!(ground_speed(1.0, 2.0, 2.0), 3.0);
        assert_eq!(ground_speed(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_zero_quaternion_is_identity_rotation() {
        let q = as_rotation(&quat_xyzw(0.0, 0.0, 0.0, 0.0));
        assert_quat_eq(&q, &Quaternion::identity());
    }

    #[test]
    fn test_derive_promotes_helmet_to_world() {
        let sample = Sample::with_timestamp("0")
            .with("z_vehicle", FRAC_1_SQRT_2)
            .with("w_vehicle", FRAC_1_SQRT_2)
            .with("z_helmet", FRAC_1_SQRT_2)
            .with("w_helmet", FRAC_1_SQRT_2)
            .with("north", 3.0)
            .with("east", 4.0);
        let d = derive(&sample);
        assert_relative_eq!(d.vehicle_euler.yaw, 90.0, epsilon = 1e-9);
        // vehicle yaw 90 + helmet yaw 90 relative to the vehicle
        assert_relative_eq!(d.helmet_euler.yaw.abs(), 180.0, epsilon = 1e-9);
        assert_relative_eq!(d.ground_speed, 5.0);
    }

    #[test]
    fn test_derive_defaults_without_orientation_columns() {
        let d = derive(&Sample::with_timestamp("0"));
        assert_quat_eq(&d.vehicle_world, &Quaternion::identity());
        assert_quat_eq(&d.helmet_world, &Quaternion::identity());
        assert_eq!(d.vehicle_euler, EulerAngles::default());
        assert_eq!(d.ground_speed, 0.0);
    }
}
