use glam::{DMat3, DVec3};

/// Error types for the linear algebra module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LinalgError {
    /// The source and destination point sets have different lengths.
    #[error("Source and destination lengths differ: {0} != {1}")]
    LengthMismatch(usize, usize),
}

/// Transform a set of points using a rotation and translation.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `dst_r_src` - A rotation matrix.
/// * `dst_t_src` - A translation vector.
/// * `dst_points` - A pre-allocated vector to store the transformed points.
///
/// PRECONDITION: dst_points is a pre-allocated vector of the same size as source.
///
/// Example:
///
/// ```
/// use dfloc_3d::linalg::transform_points3d;
/// use glam::{DMat3, DVec3};
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points3d(&src_points, &DMat3::IDENTITY, &DVec3::ZERO, &mut dst_points).unwrap();
/// assert_eq!(dst_points, src_points);
/// ```
pub fn transform_points3d(
    src_points: &[[f64; 3]],
    dst_r_src: &DMat3,
    dst_t_src: &DVec3,
    dst_points: &mut [[f64; 3]],
) -> Result<(), LinalgError> {
    if src_points.len() != dst_points.len() {
        return Err(LinalgError::LengthMismatch(
            src_points.len(),
            dst_points.len(),
        ));
    }

    for (point_dst, point_src) in dst_points.iter_mut().zip(src_points.iter()) {
        *point_dst = (*dst_r_src * DVec3::from_array(*point_src) + *dst_t_src).to_array();
    }

    Ok(())
}
