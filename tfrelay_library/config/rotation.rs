//! Yaw/pitch/roll handling for configuration files

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// Convert a yaw/pitch/roll triple (radians) into a (w, x, y, z) quaternion
///
/// Axis assignment: roll about Z, yaw about Y, pitch about X, composed as
/// `roll * yaw * pitch`.
pub fn ypr_to_quaternion(yaw: f64, pitch: f64, roll: f64) -> [f64; 4] {
    let roll = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), roll);
    let yaw = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw);
    let pitch = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), pitch);
    let q = roll * yaw * pitch;
    [q.w, q.i, q.j, q.k]
}

/// Normalize a (w, x, y, z) quaternion; `None` if it has no direction
pub fn normalize_quaternion(rotation: [f64; 4]) -> Option<[f64; 4]> {
    let [w, x, y, z] = rotation;
    let q = UnitQuaternion::try_new(Quaternion::new(w, x, y, z), f64::EPSILON)?;
    Some([q.w, q.i, q.j, q.k])
}
