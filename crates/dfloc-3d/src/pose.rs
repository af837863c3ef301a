use glam::{DAffine3, DVec3};
use serde::{Deserialize, Serialize};

use crate::transforms::{normalize_angle, rigid_from_rpy, rpy_from_rigid};

/// A 4-DOF pose estimate: position in the map frame and heading.
///
/// Roll and pitch are carried separately by [`Attitude`] since they are
/// held fixed during registration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose4 {
    /// Position along the x axis in meters.
    pub x: f64,
    /// Position along the y axis in meters.
    pub y: f64,
    /// Position along the z axis in meters.
    pub z: f64,
    /// Heading around the z axis in radians.
    pub yaw: f64,
}

impl Pose4 {
    /// The pose at the origin with zero heading.
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        yaw: 0.0,
    };

    /// Create a new pose.
    pub fn new(x: f64, y: f64, z: f64, yaw: f64) -> Self {
        Self { x, y, z, yaw }
    }

    /// The position as a vector.
    #[inline]
    pub fn translation(&self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }

    /// Apply an additive increment `[dx, dy, dz, dyaw]`.
    ///
    /// The resulting heading is wrapped to `(-pi, pi]`.
    #[inline]
    pub fn apply_increment(&self, delta: &[f64; 4]) -> Self {
        Self {
            x: self.x + delta[0],
            y: self.y + delta[1],
            z: self.z + delta[2],
            yaw: normalize_angle(self.yaw + delta[3]),
        }
    }

    /// Euclidean distance between the positions of two poses.
    pub fn translation_distance(&self, other: &Self) -> f64 {
        (self.translation() - other.translation()).length()
    }

    /// Signed heading difference `self.yaw - other.yaw` wrapped to `(-pi, pi]`.
    pub fn yaw_difference(&self, other: &Self) -> f64 {
        normalize_angle(self.yaw - other.yaw)
    }

    /// Build the full rigid transform of this pose with the given attitude.
    pub fn to_rigid(&self, attitude: Attitude) -> DAffine3 {
        rigid_from_rpy(attitude.roll, attitude.pitch, self.yaw, self.translation())
    }

    /// Split a rigid transform into its 4-DOF pose and attitude.
    pub fn from_rigid(transform: &DAffine3) -> (Self, Attitude) {
        let (roll, pitch, yaw) = rpy_from_rigid(transform);
        let t = transform.translation;
        (Self::new(t.x, t.y, t.z, yaw), Attitude::new(roll, pitch))
    }
}

/// Roll and pitch of the platform, held fixed while the heading is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Attitude {
    /// Rotation around the x axis in radians.
    pub roll: f64,
    /// Rotation around the y axis in radians.
    pub pitch: f64,
}

impl Attitude {
    /// A gravity aligned platform.
    pub const LEVEL: Self = Self {
        roll: 0.0,
        pitch: 0.0,
    };

    /// Create a new attitude.
    pub fn new(roll: f64, pitch: f64) -> Self {
        Self { roll, pitch }
    }

    /// Whether both angles are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.roll.is_finite() && self.pitch.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_apply_increment_wraps_yaw() {
        let pose = Pose4::new(1.0, 2.0, 3.0, 3.1);
        let next = pose.apply_increment(&[0.5, -0.5, 0.25, 0.1]);
        assert_relative_eq!(next.x, 1.5);
        assert_relative_eq!(next.y, 1.5);
        assert_relative_eq!(next.z, 3.25);
        assert_relative_eq!(next.yaw, 3.2 - 2.0 * std::f64::consts::PI, epsilon = 1e-12);
    }

    #[test]
    fn test_rigid_roundtrip() {
        let pose = Pose4::new(0.3, -1.2, 0.5, 0.7);
        let attitude = Attitude::new(0.05, -0.02);
        let (pose_back, attitude_back) = Pose4::from_rigid(&pose.to_rigid(attitude));

        assert_relative_eq!(pose_back.x, pose.x, epsilon = 1e-12);
        assert_relative_eq!(pose_back.y, pose.y, epsilon = 1e-12);
        assert_relative_eq!(pose_back.z, pose.z, epsilon = 1e-12);
        assert_relative_eq!(pose_back.yaw, pose.yaw, epsilon = 1e-9);
        assert_relative_eq!(attitude_back.roll, attitude.roll, epsilon = 1e-9);
        assert_relative_eq!(attitude_back.pitch, attitude.pitch, epsilon = 1e-9);
    }

    #[test]
    fn test_yaw_difference() {
        let a = Pose4::new(0.0, 0.0, 0.0, 3.0);
        let b = Pose4::new(3.0, 4.0, 0.0, -3.0);
        let expected = 6.0 - 2.0 * std::f64::consts::PI;
        assert_relative_eq!(a.yaw_difference(&b), expected, epsilon = 1e-12);
        assert_relative_eq!(a.translation_distance(&b), 5.0);
    }
}
