use dfloc_3d::ops::tilt_compensate;
use dfloc_3d::pose::{Attitude, Pose4};
use dfloc_3d::registration::{Registration, RegistrationResult, RegistrationStatus};
use dfloc_3d::transforms::{rotate_yaw, rotate_yaw_derivative};
use glam::{DMat4, DVec3, DVec4};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::voxel_grid::NdtVoxelGrid;

/// Error types for the NDT module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum NdtError {
    /// The voxel size must be finite and strictly positive.
    #[error("Invalid voxel resolution: {0}")]
    InvalidResolution(f64),

    /// No voxel holds enough map points.
    #[error("No voxel holds enough map points")]
    EmptyMap,

    /// A registration parameter is out of its valid range.
    #[error("Invalid NDT configuration: {0}")]
    InvalidConfig(String),
}

/// Parameters of the NDT registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NdtConfig {
    /// Voxel edge length in meters.
    pub resolution: f64,
    /// Minimum number of map points of a voxel.
    pub min_points_per_voxel: usize,
    /// Relative diagonal inflation of the voxel covariances.
    pub regularization: f64,
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// The iteration stops when the step norm is below this value.
    pub epsilon: f64,
    /// Damping added to the diagonal of the Hessian.
    pub damping: f64,
    /// Maximum norm of the translation part of a step in meters.
    pub max_translation_step: f64,
    /// Maximum magnitude of the heading part of a step in radians.
    pub max_yaw_step: f64,
    /// Minimum number of scan points falling in a voxel.
    pub min_valid_points: usize,
}

impl Default for NdtConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            min_points_per_voxel: 6,
            regularization: 0.01,
            max_iterations: 50,
            epsilon: 1e-4,
            damping: 0.01,
            max_translation_step: 0.5,
            max_yaw_step: 0.2,
            min_valid_points: 10,
        }
    }
}

impl NdtConfig {
    /// Check that the parameters are in their valid ranges.
    ///
    /// The voxel resolution is checked when the voxel grid is built.
    pub fn validate(&self) -> Result<(), NdtError> {
        let non_negative = [
            ("regularization", self.regularization),
            ("epsilon", self.epsilon),
            ("damping", self.damping),
            ("max_translation_step", self.max_translation_step),
            ("max_yaw_step", self.max_yaw_step),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(NdtError::InvalidConfig(format!(
                    "{name} must be finite and non negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Linearization {
    hessian: DMat4,
    gradient: DVec4,
    score: f64,
    count: usize,
}

impl Linearization {
    fn zero() -> Self {
        Self {
            hessian: DMat4::ZERO,
            gradient: DVec4::ZERO,
            score: 0.0,
            count: 0,
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            hessian: self.hessian + other.hessian,
            gradient: self.gradient + other.gradient,
            score: self.score + other.score,
            count: self.count + other.count,
        }
    }

    /// Non negative cost, zero when every point sits on its voxel mean.
    fn cost(&self) -> f64 {
        self.count as f64 - self.score
    }
}

/// Normal distributions transform registration over `(x, y, z, yaw)`.
///
/// Each scan point is scored against the distribution of the voxel it falls
/// in. The Mahalanobis residuals are weighted by the point score and solved
/// with damped Gauss-Newton steps.
#[derive(Debug, Clone)]
pub struct NdtAligner {
    grid: NdtVoxelGrid,
    config: NdtConfig,
}

impl NdtAligner {
    /// Build the voxel distributions of a map point cloud.
    pub fn new(map_points: &[[f64; 3]], config: NdtConfig) -> Result<Self, NdtError> {
        config.validate()?;
        let grid = NdtVoxelGrid::new(
            map_points,
            config.resolution,
            config.min_points_per_voxel,
            config.regularization,
        )?;
        Ok(Self { grid, config })
    }

    /// The voxel distributions of the map.
    pub fn grid(&self) -> &NdtVoxelGrid {
        &self.grid
    }

    fn linearize(&self, points: &[[f64; 3]], pose: &Pose4) -> Linearization {
        let (sin_yaw, cos_yaw) = pose.yaw.sin_cos();
        let translation = pose.translation();

        points
            .par_iter()
            .map(|point| {
                let q = DVec3::from_array(*point);
                let p = rotate_yaw(q, sin_yaw, cos_yaw) + translation;
                let Some(voxel) = self.grid.get_voxel_at(p) else {
                    return Linearization::zero();
                };

                let e = p - voxel.mean;
                let s = voxel.inv_covariance;
                let se = s * e;
                // E = exp(-0.5 * e^T * Sigma^-1 * e), clamped to avoid underflow
                let weight = (-0.5 * e.dot(se)).max(-50.0).exp();

                // Jacobian of the transformed point: identity for the translation
                let d = rotate_yaw_derivative(q, sin_yaw, cos_yaw);
                let sd = s * d;

                let hessian = DMat4::from_cols(
                    s.x_axis.extend(sd.x),
                    s.y_axis.extend(sd.y),
                    s.z_axis.extend(sd.z),
                    sd.extend(d.dot(sd)),
                ) * weight;
                let gradient = se.extend(d.dot(se)) * weight;

                Linearization {
                    hessian,
                    gradient,
                    score: weight,
                    count: 1,
                }
            })
            .reduce(Linearization::zero, Linearization::merge)
    }
}

impl Registration for NdtAligner {
    fn register(
        &self,
        points: &[[f64; 3]],
        initial_pose: Pose4,
        attitude: Attitude,
    ) -> RegistrationResult {
        let config = &self.config;
        let points = tilt_compensate(points, &attitude);

        let mut pose = initial_pose;
        let mut current = self.linearize(&points, &pose);
        let initial_cost = current.cost();

        if current.count < config.min_valid_points {
            return RegistrationResult::unchanged(
                pose,
                RegistrationStatus::InsufficientPoints,
                current.count,
                initial_cost,
            );
        }

        let mut iterations = 0;
        let mut status = RegistrationStatus::MaxIterations;

        while iterations < config.max_iterations {
            // solve for delta: (H + damping I) * delta = -g
            let damped = current.hessian + DMat4::from_diagonal(DVec4::splat(config.damping));
            let det = damped.determinant();
            if !(det.is_finite() && det.abs() > f64::EPSILON) {
                log::warn!("NDT Hessian inversion failed at iteration {}", iterations);
                status = RegistrationStatus::Singular;
                break;
            }

            let mut delta = -(damped.inverse() * current.gradient);
            let delta_norm = delta.length();

            let translation = delta.truncate();
            let translation_norm = translation.length();
            if translation_norm > config.max_translation_step {
                let scale = config.max_translation_step / translation_norm;
                delta = (translation * scale).extend(delta.w);
            }
            delta.w = delta.w.clamp(-config.max_yaw_step, config.max_yaw_step);

            let next_pose = pose.apply_increment(&delta.to_array());
            let next = self.linearize(&points, &next_pose);
            iterations += 1;

            if next.count < config.min_valid_points {
                status = RegistrationStatus::InsufficientPoints;
                break;
            }

            pose = next_pose;
            current = next;

            log::debug!(
                "Iteration {}: score = {:.4}, step = {:.3e}",
                iterations,
                current.score,
                delta_norm
            );

            if delta_norm < config.epsilon {
                status = RegistrationStatus::Converged;
                break;
            }
        }

        RegistrationResult {
            pose,
            converged: status == RegistrationStatus::Converged,
            valid_point_count: current.count,
            status,
            iterations,
            initial_cost,
            final_cost: current.cost(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A room whose walls and floor cross the middle of the voxels.
    fn room_points() -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        for a in 0..=20 {
            let z = 0.3 + 0.1 * a as f64;
            for b in 0..=30 {
                let y = 0.5 + 0.1 * b as f64;
                points.push([0.5, y, z]);
                points.push([4.5, y, z]);
            }
            for b in 0..=40 {
                let x = 0.5 + 0.1 * b as f64;
                points.push([x, 0.5, z]);
                points.push([x, 3.5, z]);
            }
        }
        for a in 0..=40 {
            for b in 0..=30 {
                points.push([0.5 + 0.1 * a as f64, 0.5 + 0.1 * b as f64, 0.3]);
            }
        }
        points
    }

    fn to_base_frame(points: &[[f64; 3]], pose: &Pose4) -> Vec<[f64; 3]> {
        let (sin_yaw, cos_yaw) = (-pose.yaw).sin_cos();
        points
            .iter()
            .map(|p| {
                rotate_yaw(DVec3::from_array(*p) - pose.translation(), sin_yaw, cos_yaw).to_array()
            })
            .collect()
    }

    #[test]
    fn test_recovers_small_offset() -> Result<(), NdtError> {
        let map = room_points();
        let aligner = NdtAligner::new(&map, NdtConfig::default())?;
        let truth = Pose4::new(0.15, -0.1, 0.05, 0.03);
        let scan = to_base_frame(&map, &truth);

        let result = aligner.register(&scan, Pose4::IDENTITY, Attitude::LEVEL);
        assert!(!result.status.is_failure(), "{:?}", result.status);
        assert!(result.final_cost < result.initial_cost);
        assert!(result.pose.translation_distance(&truth) < 0.02, "{:?}", result.pose);
        assert!(result.pose.yaw_difference(&truth).abs() < 0.01, "{:?}", result.pose);
        Ok(())
    }

    #[test]
    fn test_scan_outside_the_map() -> Result<(), NdtError> {
        let aligner = NdtAligner::new(&room_points(), NdtConfig::default())?;
        let scan = vec![[100.0, 100.0, 100.0]; 50];
        let result = aligner.register(&scan, Pose4::IDENTITY, Attitude::LEVEL);
        assert_eq!(result.status, RegistrationStatus::InsufficientPoints);
        assert_eq!(result.valid_point_count, 0);
        assert_eq!(result.pose, Pose4::IDENTITY);
        Ok(())
    }

    #[test]
    fn test_invalid_config() {
        let map = room_points();
        let config = NdtConfig {
            max_yaw_step: -0.1,
            ..Default::default()
        };
        assert!(matches!(
            NdtAligner::new(&map, config),
            Err(NdtError::InvalidConfig(_))
        ));

        let config = NdtConfig {
            damping: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(NdtConfig::default().validate(), Ok(()));
    }
}
