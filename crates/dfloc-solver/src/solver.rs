use dfloc_3d::ops::tilt_compensate;
use dfloc_3d::pose::{Attitude, Pose4};
use dfloc_3d::registration::{RegistrationResult, RegistrationStatus};
use dfloc_grid::DistanceField;
use glam::{DMat4, DVec4};

use crate::config::SolverConfig;
use crate::error::SolverError;
use crate::normal_equations::{evaluate, NormalEquations};

/// Damped Gauss-Newton registration of a scan against a distance field.
///
/// The solver estimates `(x, y, z, yaw)` while roll and pitch stay fixed. Each
/// point contributes its interpolated distance as residual, so the cost is the
/// sum of squared distances of the transformed scan to the mapped surfaces.
/// The solver holds no state between calls.
#[derive(Debug, Clone, Default)]
pub struct PoseSolver {
    config: SolverConfig,
}

impl PoseSolver {
    /// Create a solver with the given parameters.
    ///
    /// Fails when a parameter is out of its valid range, see [`SolverConfig::validate`].
    pub fn new(config: SolverConfig) -> Result<Self, SolverError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The parameters of the solver.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Register a scan against a distance field.
    ///
    /// # Arguments
    ///
    /// * `points` - Scan points in the base frame.
    /// * `initial_pose` - The starting estimate of the platform pose in the map frame.
    /// * `attitude` - The roll and pitch of the platform. Use [`Attitude::LEVEL`]
    ///   for points that are already gravity aligned.
    /// * `field` - The distance field of the map.
    ///
    /// # Returns
    ///
    /// The refined pose and the reason the iteration stopped. Degenerate inputs are
    /// reported through [`RegistrationStatus`] and leave the initial pose untouched.
    pub fn solve(
        &self,
        points: &[[f64; 3]],
        initial_pose: Pose4,
        attitude: Attitude,
        field: &DistanceField,
    ) -> RegistrationResult {
        let config = &self.config;
        let points = tilt_compensate(points, &attitude);

        let evaluate_at =
            |pose: &Pose4| evaluate(&points, pose, field, &config.loss, config.execution);

        let mut pose = initial_pose;
        let mut current = evaluate_at(&pose);
        let initial_cost = current.cost;

        if current.valid_points < config.min_valid_points {
            log::debug!(
                "Only {} of {} points inside the field",
                current.valid_points,
                points.len()
            );
            return RegistrationResult::unchanged(
                pose,
                RegistrationStatus::InsufficientPoints,
                current.valid_points,
                initial_cost,
            );
        }

        if current.is_singular(config.singular_threshold) {
            log::debug!("Singular normal equations at the initial pose");
            return RegistrationResult::unchanged(
                pose,
                RegistrationStatus::Singular,
                current.valid_points,
                initial_cost,
            );
        }

        let mut lambda = config.initial_lambda;
        let mut iterations = 0;
        let mut status = RegistrationStatus::MaxIterations;

        while iterations < config.max_iterations {
            iterations += 1;

            let Some(delta) = self.solve_damped_system(&current, lambda) else {
                status = RegistrationStatus::Singular;
                break;
            };

            let candidate_pose = pose.apply_increment(&delta.to_array());
            let candidate = evaluate_at(&candidate_pose);

            if candidate.valid_points < config.min_valid_points {
                status = RegistrationStatus::InsufficientPoints;
                break;
            }

            if candidate.cost > current.cost {
                // reject the step and move towards gradient descent
                lambda = (lambda * config.lambda_factor).min(config.max_lambda);
                log::debug!(
                    "Iteration {}: rejected step, cost {:.6} > {:.6}, lambda {:.2e}",
                    iterations,
                    candidate.cost,
                    current.cost,
                    lambda
                );
                continue;
            }

            if candidate.is_singular(config.singular_threshold) {
                status = RegistrationStatus::Singular;
                break;
            }

            pose = candidate_pose;
            current = candidate;
            lambda = (lambda / config.lambda_factor).max(config.min_lambda);

            log::debug!(
                "Iteration {}: cost {:.6}, valid {}, step {:.3e}",
                iterations,
                current.cost,
                current.valid_points,
                delta.length()
            );

            if delta.length() < config.convergence_threshold {
                status = RegistrationStatus::Converged;
                break;
            }
        }

        if status.is_failure() {
            log::warn!("Registration stopped on singular normal equations");
        }

        RegistrationResult {
            pose,
            converged: status == RegistrationStatus::Converged,
            valid_point_count: current.valid_points,
            status,
            iterations,
            initial_cost,
            final_cost: current.cost,
        }
    }

    /// Solve `(J^T J + lambda diag(J^T J)) delta = -J^T r` and clamp the step.
    fn solve_damped_system(&self, system: &NormalEquations, lambda: f64) -> Option<DVec4> {
        let h = &system.hessian;
        let diagonal = DVec4::new(h.x_axis.x, h.y_axis.y, h.z_axis.z, h.w_axis.w);
        let damped = *h + DMat4::from_diagonal(diagonal * lambda);

        let det = damped.determinant();
        if !(det.is_finite() && det != 0.0) {
            return None;
        }

        let mut delta = -(damped.inverse() * system.gradient);
        if !delta.is_finite() {
            return None;
        }

        let translation = delta.truncate();
        let norm = translation.length();
        if norm > self.config.max_translation_step {
            let scaled = translation * (self.config.max_translation_step / norm);
            delta = scaled.extend(delta.w);
        }
        delta.w = delta
            .w
            .clamp(-self.config.max_yaw_step, self.config.max_yaw_step);

        Some(delta)
    }
}
