use glam::{DAffine3, DMat3, DQuat, DVec3, EulerRot};

use crate::pose::Attitude;

/// Wrap an angle to the interval `(-pi, pi]`.
///
/// Example:
///
/// ```
/// use dfloc_3d::transforms::normalize_angle;
///
/// let angle = normalize_angle(3.0 * std::f64::consts::PI);
/// assert!((angle - std::f64::consts::PI).abs() < 1e-12);
/// ```
pub fn normalize_angle(angle: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    if angle > -PI && angle <= PI {
        return angle;
    }
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Compute the rotation matrix `Rz(yaw) * Ry(pitch) * Rx(roll)`.
pub fn rotation_from_rpy(roll: f64, pitch: f64, yaw: f64) -> DMat3 {
    DMat3::from_quat(DQuat::from_euler(EulerRot::ZYX, yaw, pitch, roll))
}

/// Compute the tilt rotation `Ry(pitch) * Rx(roll)` of an attitude.
///
/// Applying it to base frame points gives gravity aligned points that only
/// miss the heading rotation.
pub fn tilt_rotation(attitude: &Attitude) -> DMat3 {
    DMat3::from_rotation_y(attitude.pitch) * DMat3::from_rotation_x(attitude.roll)
}

/// Rotate a point around the z axis by `yaw` given its precomputed sine and cosine.
#[inline]
pub fn rotate_yaw(point: DVec3, sin_yaw: f64, cos_yaw: f64) -> DVec3 {
    DVec3::new(
        cos_yaw * point.x - sin_yaw * point.y,
        sin_yaw * point.x + cos_yaw * point.y,
        point.z,
    )
}

/// Derivative of [`rotate_yaw`] with respect to the heading angle.
#[inline]
pub fn rotate_yaw_derivative(point: DVec3, sin_yaw: f64, cos_yaw: f64) -> DVec3 {
    DVec3::new(
        -sin_yaw * point.x - cos_yaw * point.y,
        cos_yaw * point.x - sin_yaw * point.y,
        0.0,
    )
}

/// Build a rigid transform from roll, pitch, yaw and a translation.
pub fn rigid_from_rpy(roll: f64, pitch: f64, yaw: f64, translation: DVec3) -> DAffine3 {
    DAffine3::from_rotation_translation(
        DQuat::from_euler(EulerRot::ZYX, yaw, pitch, roll),
        translation,
    )
}

/// Extract `(roll, pitch, yaw)` from the rotation of a rigid transform.
pub fn rpy_from_rigid(transform: &DAffine3) -> (f64, f64, f64) {
    let (yaw, pitch, roll) = DQuat::from_mat3(&transform.matrix3)
        .normalize()
        .to_euler(EulerRot::ZYX);
    (roll, pitch, yaw)
}
