use dfloc_3d::ops::tilt_compensate;
use dfloc_3d::pose::{Attitude, Pose4};
use dfloc_3d::registration::{Registration, RegistrationResult, RegistrationStatus};
use dfloc_3d::linalg::transform_points3d;
use glam::DMat3;
use kiddo::immutable::float::kdtree::ImmutableKdTree;
use serde::{Deserialize, Serialize};

use crate::ops::{find_correspondences, fit_yaw_translation};

/// Error types for the ICP module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IcpError {
    /// The map holds no finite point.
    #[error("The map point cloud is empty")]
    EmptyMap,
}

/// Structure to define the ICP parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Convergence tolerance as the difference in RMSE between two consecutive iterations.
    pub tolerance: f64,
    /// Minimum number of correspondences kept by the outlier gate.
    pub min_correspondences: usize,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-6,
            min_correspondences: 10,
        }
    }
}

/// Iterative Closest Point registration using point to point distance.
///
/// The map points are indexed once in a kd-tree. Every iteration matches the
/// scan against the map and refits heading and translation in closed form.
pub struct IcpAligner {
    map_points: Vec<[f64; 3]>,
    kdtree: ImmutableKdTree<f64, u32, 3, 32>,
    config: IcpConfig,
}

impl IcpAligner {
    /// Index a map point cloud for registration.
    ///
    /// Non finite map points are dropped.
    pub fn new(map_points: &[[f64; 3]], config: IcpConfig) -> Result<Self, IcpError> {
        let map_points = map_points
            .iter()
            .filter(|p| p.iter().all(|v| v.is_finite()))
            .copied()
            .collect::<Vec<_>>();

        if map_points.is_empty() {
            return Err(IcpError::EmptyMap);
        }

        // build kdtree for target points to speed up the nearest neighbor search
        let kdtree = ImmutableKdTree::new_from_slice(&map_points);

        Ok(Self {
            map_points,
            kdtree,
            config,
        })
    }

    /// The parameters of the aligner.
    pub fn config(&self) -> &IcpConfig {
        &self.config
    }
}

impl Registration for IcpAligner {
    fn register(
        &self,
        points: &[[f64; 3]],
        initial_pose: Pose4,
        attitude: Attitude,
    ) -> RegistrationResult {
        let source = tilt_compensate(points, &attitude);

        let mut pose = initial_pose;
        let mut rmse = f64::INFINITY;
        let mut initial_cost = None;
        let mut final_cost = 0.0;
        let mut valid_point_count = 0;
        let mut iterations = 0;
        let mut status = RegistrationStatus::MaxIterations;

        let mut current = vec![[0.0; 3]; source.len()];

        // main icp loop
        loop {
            let rotation = DMat3::from_rotation_z(pose.yaw);
            let translation = pose.translation();
            if let Err(err) = transform_points3d(&source, &rotation, &translation, &mut current) {
                log::warn!("Failed to transform the scan: {err}");
                status = RegistrationStatus::Singular;
                break;
            }

            // find closest points between current source and target
            let matches = find_correspondences(&source, &current, &self.map_points, &self.kdtree);
            let cost = matches.squared_distances.iter().sum::<f64>();
            let initial = *initial_cost.get_or_insert(cost);

            log::debug!(
                "Iteration {}: {} correspondences",
                iterations,
                matches.source.len()
            );

            if matches.source.len() < self.config.min_correspondences {
                status = RegistrationStatus::InsufficientPoints;
                if iterations == 0 {
                    let valid = matches.source.len();
                    return RegistrationResult::unchanged(pose, status, valid, initial);
                }
                break;
            }

            valid_point_count = matches.source.len();
            final_cost = cost;

            let current_rmse = (cost / matches.source.len() as f64).sqrt();

            // check convergence and exit if below tolerance
            if (rmse - current_rmse).abs() < self.config.tolerance {
                log::debug!("ICP converged in {iterations} iterations with error {current_rmse}");
                status = RegistrationStatus::Converged;
                break;
            }
            rmse = current_rmse;

            if iterations >= self.config.max_iterations {
                break;
            }

            let Some(fitted) = fit_yaw_translation(&matches.source, &matches.target) else {
                status = RegistrationStatus::Singular;
                if iterations == 0 {
                    return RegistrationResult::unchanged(pose, status, valid_point_count, initial);
                }
                break;
            };

            pose = fitted;
            iterations += 1;
        }

        RegistrationResult {
            pose,
            converged: status == RegistrationStatus::Converged,
            valid_point_count,
            status,
            iterations,
            initial_cost: initial_cost.unwrap_or(0.0),
            final_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfloc_3d::transforms::rotate_yaw;
    use glam::DVec3;
    use rand::{Rng, SeedableRng};

    fn corner_map() -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        for a in 0..60 {
            for b in 0..30 {
                let (u, v) = (a as f64 * 0.05, b as f64 * 0.05);
                points.push([u, 0.0, v]);
                points.push([0.0, u, v]);
                points.push([u, v * 2.0, 0.0]);
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
    fn test_empty_map() {
        assert!(matches!(
            IcpAligner::new(&[[f64::NAN, 0.0, 0.0]], IcpConfig::default()),
            Err(IcpError::EmptyMap)
        ));
    }

    #[test]
    fn test_recovers_small_offset() -> Result<(), IcpError> {
        let map = corner_map();
        let aligner = IcpAligner::new(&map, IcpConfig::default())?;

        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let scan_map = (0..1500)
            .map(|_| map[rng.random_range(0..map.len())])
            .collect::<Vec<_>>();
        let truth = Pose4::new(0.04, -0.03, 0.01, 0.015);
        let scan = to_base_frame(&scan_map, &truth);

        let result = aligner.register(&scan, Pose4::IDENTITY, Attitude::LEVEL);
        assert!(!result.status.is_failure());
        assert!(result.pose.translation_distance(&truth) < 0.01, "{:?}", result.pose);
        assert!(result.pose.yaw_difference(&truth).abs() < 0.01, "{:?}", result.pose);
        Ok(())
    }

    #[test]
    fn test_insufficient_correspondences() -> Result<(), IcpError> {
        let aligner = IcpAligner::new(&corner_map(), IcpConfig::default())?;
        let scan = vec![[1.0, 1.0, 1.0]; 3];
        let initial = Pose4::new(0.1, 0.2, 0.0, 0.0);
        let result = aligner.register(&scan, initial, Attitude::LEVEL);
        assert_eq!(result.status, RegistrationStatus::InsufficientPoints);
        assert_eq!(result.pose, initial);
        Ok(())
    }
}
