//! Quaternion aliases shared by the derivation layer.
//!
//! Storage order in the telemetry CSV is scalar-last `(x, y, z, w)`;
//! nalgebra builds quaternions scalar-first, so always go through
//! [`quat_xyzw`] instead of calling `Quaternion::new` directly.

use nalgebra::Quaternion;

pub type Quat = Quaternion<f64>;

// ===== Identity components (scalar-last) =====
pub const IDENTITY_X: f64 = 0.0;
pub const IDENTITY_Y: f64 = 0.0;
pub const IDENTITY_Z: f64 = 0.0;
pub const IDENTITY_W: f64 = 1.0;

/// Build a quaternion from scalar-last components.
pub fn quat_xyzw(x: f64, y: f64, z: f64, w: f64) -> Quat {
    Quaternion::new(w, x, y, z)
}

/// Scalar-last components of a quaternion.
pub fn xyzw(q: &Quat) -> [f64; 4] {
    [q.i, q.j, q.k, q.w]
}
