use dfloc_3d::pose::Pose4;
use glam::DVec3;
use kiddo::immutable::float::kdtree::ImmutableKdTree;

/// Matched scan and map points with their distance.
pub(crate) struct Correspondences {
    pub source: Vec<[f64; 3]>,
    pub target: Vec<[f64; 3]>,
    pub squared_distances: Vec<f64>,
}

fn median(sorted: &[f64]) -> f64 {
    sorted[sorted.len() / 2]
}

/// Find the nearest map point of every transformed scan point.
///
/// Matches farther than `median + 3 sigma` are dropped, with sigma estimated
/// from the median absolute deviation of the match distances.
///
/// # Arguments
///
/// * `source` - The scan points before the current estimate is applied.
/// * `transformed` - The scan points moved by the current estimate.
/// * `target` - The map points indexed by `kdtree`.
pub(crate) fn find_correspondences(
    source: &[[f64; 3]],
    transformed: &[[f64; 3]],
    target: &[[f64; 3]],
    kdtree: &ImmutableKdTree<f64, u32, 3, 32>,
) -> Correspondences {
    // find nearest neighbors for each point in source
    let nn_results = transformed
        .iter()
        .map(|p| kdtree.nearest_one::<kiddo::SquaredEuclidean>(p))
        .collect::<Vec<_>>();

    if nn_results.is_empty() {
        return Correspondences {
            source: Vec::new(),
            target: Vec::new(),
            squared_distances: Vec::new(),
        };
    }

    // compute median distance
    let mut distances = nn_results
        .iter()
        .map(|nn| nn.distance.sqrt())
        .collect::<Vec<_>>();
    distances.sort_by(|a, b| a.total_cmp(b));
    let median_dist = median(&distances);

    // compute median absolute deviation
    let mut deviations = distances
        .iter()
        .map(|d| (d - median_dist).abs())
        .collect::<Vec<_>>();
    deviations.sort_by(|a, b| a.total_cmp(b));
    let sigma_d = 1.4826 * median(&deviations);
    let gate = median_dist + 3.0 * sigma_d;

    let mut matches = Correspondences {
        source: Vec::with_capacity(nn_results.len()),
        target: Vec::with_capacity(nn_results.len()),
        squared_distances: Vec::with_capacity(nn_results.len()),
    };

    for (src, nn) in source.iter().zip(nn_results.iter()) {
        if nn.distance.sqrt() > gate {
            continue;
        }
        let Some(dst) = target.get(nn.item as usize) else {
            continue;
        };
        matches.source.push(*src);
        matches.target.push(*dst);
        matches.squared_distances.push(nn.distance);
    }

    matches
}

/// Fit the heading and translation that best map `source` onto `target`.
///
/// Rotation is restricted to the z axis. The heading follows in closed form
/// from the centered cross and dot products in the xy plane; the translation
/// then aligns the centroids.
///
/// Returns `None` for fewer than two pairs or when the heading is unobservable.
///
/// Example:
///
/// ```
/// use dfloc_icp::fit_yaw_translation;
///
/// let source = vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [-1.0, 0.0, 1.0]];
/// let target = vec![[2.0, 0.0, 0.5], [3.0, 1.0, 0.5], [2.0, 2.0, 1.5]];
/// let pose = fit_yaw_translation(&source, &target).unwrap();
/// assert!((pose.yaw + std::f64::consts::FRAC_PI_2).abs() < 1e-9);
/// assert!((pose.x - 2.0).abs() < 1e-9);
/// ```
pub fn fit_yaw_translation(source: &[[f64; 3]], target: &[[f64; 3]]) -> Option<Pose4> {
    if source.len() != target.len() || source.len() < 2 {
        return None;
    }

    let n = source.len() as f64;
    let src_centroid = source.iter().map(|p| DVec3::from_array(*p)).sum::<DVec3>() / n;
    let dst_centroid = target.iter().map(|p| DVec3::from_array(*p)).sum::<DVec3>() / n;

    let (mut cross, mut dot) = (0.0, 0.0);
    for (s, d) in source.iter().zip(target.iter()) {
        let a = DVec3::from_array(*s) - src_centroid;
        let b = DVec3::from_array(*d) - dst_centroid;
        cross += a.x * b.y - a.y * b.x;
        dot += a.x * b.x + a.y * b.y;
    }

    if cross.hypot(dot) < 1e-12 {
        return None;
    }

    let yaw = cross.atan2(dot);
    let (sin_yaw, cos_yaw) = yaw.sin_cos();
    let t = dst_centroid - dfloc_3d::transforms::rotate_yaw(src_centroid, sin_yaw, cos_yaw);

    Some(Pose4::new(t.x, t.y, t.z, yaw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use dfloc_3d::transforms::rotate_yaw;

    #[test]
    fn test_fit_yaw_translation() {
        let source = (0..20)
            .map(|i| {
                let a = i as f64 * 0.3;
                [a.cos() * (1.0 + 0.1 * a), a.sin(), 0.05 * a]
            })
            .collect::<Vec<_>>();
        let pose = Pose4::new(0.4, -0.2, 0.1, 0.3);
        let (s, c) = pose.yaw.sin_cos();
        let target = source
            .iter()
            .map(|p| (rotate_yaw(DVec3::from_array(*p), s, c) + pose.translation()).to_array())
            .collect::<Vec<_>>();

        let fitted = fit_yaw_translation(&source, &target);
        assert!(fitted.is_some());
        if let Some(fitted) = fitted {
            assert_relative_eq!(fitted.x, pose.x, epsilon = 1e-9);
            assert_relative_eq!(fitted.y, pose.y, epsilon = 1e-9);
            assert_relative_eq!(fitted.z, pose.z, epsilon = 1e-9);
            assert_relative_eq!(fitted.yaw, pose.yaw, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_fit_degenerate() {
        // points on the z axis do not observe the heading
        let source = vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(fit_yaw_translation(&source, &source).is_none());
        assert!(fit_yaw_translation(&source[..1], &source[..1]).is_none());
    }

    #[test]
    fn test_find_correspondences_rejects_outliers() {
        let target = (0..50).map(|i| [i as f64 * 0.1, 0.0, 0.0]).collect::<Vec<_>>();
        let kdtree: ImmutableKdTree<f64, u32, 3, 32> = ImmutableKdTree::new_from_slice(&target);

        let mut source = target
            .iter()
            .map(|p| [p[0], 0.01 * (p[0] * 10.0).sin(), 0.0])
            .collect::<Vec<_>>();
        source.push([2.0, 5.0, 0.0]);

        let matches = find_correspondences(&source, &source, &target, &kdtree);
        assert_eq!(matches.source.len(), 50);
        assert!(!matches.source.contains(&[2.0, 5.0, 0.0]));
        assert_eq!(matches.target.len(), matches.squared_distances.len());
    }
}
