use std::collections::HashMap;

use glam::{DMat3, DVec3};
use rayon::prelude::*;

use crate::ndt::NdtError;

/// Accumulated statistics for a single voxel during construction.
#[derive(Debug, Clone, Copy)]
struct VoxelAccumulator {
    sum: DVec3,
    sum_sq: DMat3,
    count: usize,
}

impl Default for VoxelAccumulator {
    fn default() -> Self {
        Self {
            sum: DVec3::ZERO,
            sum_sq: DMat3::ZERO,
            count: 0,
        }
    }
}

impl VoxelAccumulator {
    fn add_point(&mut self, p: DVec3) {
        self.sum += p;
        self.sum_sq += DMat3::from_cols(p * p.x, p * p.y, p * p.z);
        self.count += 1;
    }
}

/// The normal distribution of the map points inside one voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NdtVoxel {
    /// Mean of the points.
    pub mean: DVec3,
    /// Inverse of the regularized covariance of the points.
    pub inv_covariance: DMat3,
    /// Number of points in the voxel.
    pub point_count: usize,
}

impl NdtVoxel {
    /// Compute the distribution from accumulated sums.
    ///
    /// The covariance is inflated by `regularization * trace` on its diagonal so
    /// that planar and linear voxels stay invertible.
    fn from_statistics(
        sum: DVec3,
        sum_sq: DMat3,
        count: usize,
        min_points: usize,
        regularization: f64,
    ) -> Option<Self> {
        if count < min_points.max(2) {
            return None;
        }

        let n = count as f64;
        let mean = sum / n;

        // Cov = (sum_sq - n * mean * mean^T) / (n - 1)
        let mean_outer = DMat3::from_cols(mean * mean.x, mean * mean.y, mean * mean.z);
        let covariance = (sum_sq - mean_outer * n) * (1.0 / (n - 1.0));

        let trace = covariance.x_axis.x + covariance.y_axis.y + covariance.z_axis.z;
        if !(trace > 0.0 && trace.is_finite()) {
            return None;
        }

        let regularized = covariance + DMat3::from_diagonal(DVec3::splat(regularization * trace));
        let det = regularized.determinant();
        if !(det > 0.0 && det.is_finite()) {
            return None;
        }

        Some(Self {
            mean,
            inv_covariance: regularized.inverse(),
            point_count: count,
        })
    }
}

/// Sparse voxel grid of normal distributions built from a map point cloud.
#[derive(Debug, Clone)]
pub struct NdtVoxelGrid {
    resolution: f64,
    voxels: HashMap<[i64; 3], NdtVoxel>,
}

impl NdtVoxelGrid {
    /// Bin the map points into voxels and keep the voxels with enough points.
    ///
    /// # Arguments
    ///
    /// * `points` - Map points.
    /// * `resolution` - Voxel edge length in meters.
    /// * `min_points` - Minimum number of points of a kept voxel.
    /// * `regularization` - Relative diagonal inflation of the covariances.
    pub fn new(
        points: &[[f64; 3]],
        resolution: f64,
        min_points: usize,
        regularization: f64,
    ) -> Result<Self, NdtError> {
        if !(resolution > 0.0 && resolution.is_finite()) {
            return Err(NdtError::InvalidResolution(resolution));
        }

        // Phase 1: accumulate points into voxels
        let mut accumulators: HashMap<[i64; 3], VoxelAccumulator> = HashMap::new();
        for point in points {
            let p = DVec3::from_array(*point);
            if !p.is_finite() {
                continue;
            }
            accumulators
                .entry(voxel_key(p, resolution))
                .or_default()
                .add_point(p);
        }

        // Phase 2: convert accumulators to voxels (parallel)
        let voxels = accumulators
            .into_par_iter()
            .filter_map(|(key, acc)| {
                let voxel = NdtVoxel::from_statistics(
                    acc.sum,
                    acc.sum_sq,
                    acc.count,
                    min_points,
                    regularization,
                )?;
                Some((key, voxel))
            })
            .collect::<HashMap<_, _>>();

        if voxels.is_empty() {
            return Err(NdtError::EmptyMap);
        }

        log::debug!("Built {} NDT voxels", voxels.len());

        Ok(Self { resolution, voxels })
    }

    /// Voxel edge length in meters.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Number of kept voxels.
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    /// Whether no voxel was kept.
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// The voxel containing a map frame point.
    #[inline]
    pub fn get_voxel_at(&self, point: DVec3) -> Option<&NdtVoxel> {
        self.voxels.get(&voxel_key(point, self.resolution))
    }
}

#[inline]
fn voxel_key(p: DVec3, resolution: f64) -> [i64; 3] {
    let v = (p / resolution).floor();
    [v.x as i64, v.y as i64, v.z as i64]
}
