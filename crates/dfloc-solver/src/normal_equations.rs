use dfloc_3d::pose::Pose4;
use dfloc_3d::transforms::{rotate_yaw, rotate_yaw_derivative};
use dfloc_grid::DistanceField;
use glam::{DMat4, DVec3, DVec4};
use rayon::prelude::*;

use crate::config::{ExecutionStrategy, LossFunction};

/// The Gauss-Newton system `J^T W J`, `J^T W r` of a scan at one pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalEquations {
    /// The approximated Hessian `J^T W J` over `(x, y, z, yaw)`.
    pub hessian: DMat4,
    /// The gradient `J^T W r`.
    pub gradient: DVec4,
    /// The total loss of the points inside the field.
    pub cost: f64,
    /// The number of points inside the field.
    pub valid_points: usize,
}

impl Default for NormalEquations {
    fn default() -> Self {
        Self {
            hessian: DMat4::ZERO,
            gradient: DVec4::ZERO,
            cost: 0.0,
            valid_points: 0,
        }
    }
}

impl NormalEquations {
    /// Add the contribution of one residual with its Jacobian row.
    #[inline]
    fn accumulate(mut self, residual: f64, jacobian: DVec4, loss: &LossFunction) -> Self {
        let (rho, weight) = loss.evaluate(residual * residual);
        let wj = jacobian * weight;
        self.hessian += DMat4::from_cols(
            wj * jacobian.x,
            wj * jacobian.y,
            wj * jacobian.z,
            wj * jacobian.w,
        );
        self.gradient += wj * residual;
        self.cost += rho;
        self.valid_points += 1;
        self
    }

    /// Combine two partial sums.
    #[inline]
    fn merge(self, other: Self) -> Self {
        Self {
            hessian: self.hessian + other.hessian,
            gradient: self.gradient + other.gradient,
            cost: self.cost + other.cost,
            valid_points: self.valid_points + other.valid_points,
        }
    }

    /// Whether the system constrains every degree of freedom.
    ///
    /// The Hessian is scaled to unit diagonal before its determinant is compared
    /// with `threshold`, so the test does not depend on the units of the axes.
    pub fn is_singular(&self, threshold: f64) -> bool {
        let diagonal = DVec4::new(
            self.hessian.x_axis.x,
            self.hessian.y_axis.y,
            self.hessian.z_axis.z,
            self.hessian.w_axis.w,
        );

        let max_diagonal = diagonal.max_element();
        if !(max_diagonal > 0.0 && max_diagonal.is_finite())
            || diagonal.min_element() <= max_diagonal * f64::EPSILON
        {
            return true;
        }

        let inv_sqrt = DVec4::ONE / DVec4::new(
            diagonal.x.sqrt(),
            diagonal.y.sqrt(),
            diagonal.z.sqrt(),
            diagonal.w.sqrt(),
        );
        let scaling = DMat4::from_diagonal(inv_sqrt);
        let scaled = scaling * self.hessian * scaling;
        let det = scaled.determinant();

        !(det.is_finite() && det >= threshold)
    }
}

/// Evaluate the residuals of tilt compensated points at a pose and build the normal equations.
///
/// Points that fall outside of the field are skipped.
///
/// # Arguments
///
/// * `points` - Points already rotated by the roll and pitch of the platform.
/// * `pose` - The pose at which the residuals are evaluated.
/// * `field` - The distance field of the map.
/// * `loss` - The loss applied to the distances.
/// * `execution` - Whether to accumulate serially or on the rayon pool.
pub fn evaluate(
    points: &[[f64; 3]],
    pose: &Pose4,
    field: &DistanceField,
    loss: &LossFunction,
    execution: ExecutionStrategy,
) -> NormalEquations {
    let (sin_yaw, cos_yaw) = pose.yaw.sin_cos();
    let translation = pose.translation();

    let contribution = |acc: NormalEquations, point: &[f64; 3]| {
        let q = DVec3::from_array(*point);
        let Some(sample) = field.query(rotate_yaw(q, sin_yaw, cos_yaw) + translation) else {
            return acc;
        };
        let dyaw = sample.gradient.dot(rotate_yaw_derivative(q, sin_yaw, cos_yaw));
        acc.accumulate(sample.distance, sample.gradient.extend(dyaw), loss)
    };

    match execution {
        ExecutionStrategy::Serial => points
            .iter()
            .fold(NormalEquations::default(), contribution),
        ExecutionStrategy::Parallel => points
            .par_iter()
            .fold(NormalEquations::default, contribution)
            .reduce(NormalEquations::default, NormalEquations::merge),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use dfloc_grid::GridError;

    // distance grows linearly with x, so every point has residual x and gradient (1, 0, 0)
    fn ramp_field() -> Result<DistanceField, GridError> {
        let dims = [11, 3, 3];
        let distances = (0..99).map(|idx| (idx % 11) as f32).collect();
        DistanceField::from_distances(DVec3::ZERO, 1.0, dims, distances)
    }

    #[test]
    fn test_evaluate_ramp() -> Result<(), GridError> {
        let field = ramp_field()?;
        let points = vec![[2.0, 1.0, 1.0], [4.0, 0.5, 1.5], [50.0, 0.0, 0.0]];
        let eq = evaluate(
            &points,
            &Pose4::IDENTITY,
            &field,
            &LossFunction::Squared,
            ExecutionStrategy::Serial,
        );
        assert_eq!(eq.valid_points, 2);
        assert_relative_eq!(eq.cost, 4.0 + 16.0, epsilon = 1e-9);
        assert_relative_eq!(eq.gradient.x, 6.0, epsilon = 1e-9);
        // d/dyaw of x is -y
        assert_relative_eq!(eq.gradient.w, -(2.0 * 1.0 + 4.0 * 0.5), epsilon = 1e-9);
        assert_relative_eq!(eq.hessian.x_axis.x, 2.0, epsilon = 1e-9);
        // only x and yaw are observed on a ramp
        assert!(eq.is_singular(1e-10));
        Ok(())
    }

    #[test]
    fn test_serial_matches_parallel() -> Result<(), GridError> {
        let field = ramp_field()?;
        let points = (0..200)
            .map(|i| [0.5 + (i % 9) as f64, (i % 3) as f64 * 0.7, (i % 5) as f64 * 0.4])
            .collect::<Vec<_>>();
        let pose = Pose4::new(0.2, 0.1, -0.05, 0.03);
        let loss = LossFunction::Squared;
        let serial = evaluate(&points, &pose, &field, &loss, ExecutionStrategy::Serial);
        let parallel = evaluate(&points, &pose, &field, &loss, ExecutionStrategy::Parallel);
        assert_eq!(serial.valid_points, parallel.valid_points);
        assert_relative_eq!(serial.cost, parallel.cost, epsilon = 1e-9);
        for (a, b) in serial
            .hessian
            .to_cols_array()
            .iter()
            .zip(parallel.hessian.to_cols_array().iter())
        {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_singularity() {
        let mut eq = NormalEquations::default();
        assert!(eq.is_singular(1e-10));
        eq.hessian = DMat4::from_diagonal(DVec4::new(1.0, 100.0, 1e-3, 5.0));
        assert!(!eq.is_singular(1e-10));
        // two identical rows
        eq.hessian = DMat4::from_cols(
            DVec4::new(1.0, 1.0, 0.0, 0.0),
            DVec4::new(1.0, 1.0, 0.0, 0.0),
            DVec4::new(0.0, 0.0, 1.0, 0.0),
            DVec4::new(0.0, 0.0, 0.0, 1.0),
        );
        assert!(eq.is_singular(1e-10));
    }
}
