use glam::DVec3;

/// A point cloud expressed in a single coordinate frame.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
}

impl PointCloud {
    /// Create a new point cloud from points.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self { points }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get the minimum bound of the point cloud.
    ///
    /// Returns zero for an empty point cloud.
    pub fn get_min_bound(&self) -> DVec3 {
        let Some(first) = self.points.first() else {
            return DVec3::ZERO;
        };
        self.points
            .iter()
            .map(|p| DVec3::from_array(*p))
            .fold(DVec3::from_array(*first), |a, b| a.min(b))
    }

    /// Get the maximum bound of the point cloud.
    ///
    /// Returns zero for an empty point cloud.
    pub fn get_max_bound(&self) -> DVec3 {
        let Some(first) = self.points.first() else {
            return DVec3::ZERO;
        };
        self.points
            .iter()
            .map(|p| DVec3::from_array(*p))
            .fold(DVec3::from_array(*first), |a, b| a.max(b))
    }
}

impl From<Vec<[f64; 3]>> for PointCloud {
    fn from(points: Vec<[f64; 3]>) -> Self {
        Self::new(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointcloud() {
        let pointcloud = PointCloud::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);

        assert_eq!(pointcloud.len(), 2);
        assert!(!pointcloud.is_empty());

        if let Some(p1) = pointcloud.points().last() {
            assert_eq!(p1[0], 1.0);
            assert_eq!(p1[1], 0.0);
            assert_eq!(p1[2], 0.0);
        }
    }

    #[test]
    fn test_pointcloud_bounds() {
        let pointcloud =
            PointCloud::new(vec![[0.5, -2.0, 1.0], [-1.0, 3.0, 0.0], [2.0, 0.0, -4.0]]);
        assert_eq!(pointcloud.get_min_bound(), DVec3::new(-1.0, -2.0, -4.0));
        assert_eq!(pointcloud.get_max_bound(), DVec3::new(2.0, 3.0, 1.0));

        let empty = PointCloud::default();
        assert_eq!(empty.get_min_bound(), DVec3::ZERO);
        assert_eq!(empty.get_max_bound(), DVec3::ZERO);
    }
}
