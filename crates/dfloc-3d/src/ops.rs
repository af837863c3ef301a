use std::collections::BTreeMap;

use glam::DVec3;

use crate::pose::Attitude;
use crate::transforms::tilt_rotation;

/// Error types for the point operations.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OpsError {
    /// The voxel size must be strictly positive and finite.
    #[error("Invalid voxel size: {0}")]
    InvalidVoxelSize(f64),

    /// The range band must satisfy `0 <= min < max`.
    #[error("Invalid range band: [{0}, {1}]")]
    InvalidRange(f64, f64),
}

/// Keep the points whose distance to the sensor lies strictly inside `(min_range, max_range)`.
///
/// Non finite points are dropped.
///
/// # Arguments
///
/// * `points` - Points in the sensor or base frame.
/// * `min_range` - Lower bound of the accepted range in meters.
/// * `max_range` - Upper bound of the accepted range in meters.
pub fn filter_by_range(
    points: &[[f64; 3]],
    min_range: f64,
    max_range: f64,
) -> Result<Vec<[f64; 3]>, OpsError> {
    if !(min_range >= 0.0 && max_range > min_range) {
        return Err(OpsError::InvalidRange(min_range, max_range));
    }

    let min_sq = min_range * min_range;
    let max_sq = max_range * max_range;

    Ok(points
        .iter()
        .filter(|p| {
            let d2 = p[0] * p[0] + p[1] * p[1] + p[2] * p[2];
            d2 > min_sq && d2 < max_sq
        })
        .copied()
        .collect())
}

/// Rotate points by the roll and pitch of the platform.
///
/// The result is gravity aligned and only misses the heading rotation.
pub fn tilt_compensate(points: &[[f64; 3]], attitude: &Attitude) -> Vec<[f64; 3]> {
    let rotation = tilt_rotation(attitude);
    points
        .iter()
        .map(|p| (rotation * DVec3::from_array(*p)).to_array())
        .collect()
}

/// Downsample points by replacing the points of every voxel with their centroid.
///
/// The output is ordered by voxel index so repeated calls give identical results.
///
/// # Arguments
///
/// * `points` - The input points.
/// * `voxel_size` - The edge length of a cubic voxel in meters.
pub fn voxel_downsample(points: &[[f64; 3]], voxel_size: f64) -> Result<Vec<[f64; 3]>, OpsError> {
    if !(voxel_size > 0.0 && voxel_size.is_finite()) {
        return Err(OpsError::InvalidVoxelSize(voxel_size));
    }

    let inv_size = 1.0 / voxel_size;
    let mut grid: BTreeMap<(i64, i64, i64), (DVec3, usize)> = BTreeMap::new();

    for point in points.iter() {
        let p = DVec3::from_array(*point);
        if !p.is_finite() {
            continue;
        }
        let key = (
            (p.x * inv_size).floor() as i64,
            (p.y * inv_size).floor() as i64,
            (p.z * inv_size).floor() as i64,
        );
        let entry = grid.entry(key).or_insert((DVec3::ZERO, 0));
        entry.0 += p;
        entry.1 += 1;
    }

    Ok(grid
        .into_values()
        .map(|(sum, count)| (sum / count as f64).to_array())
        .collect())
}
