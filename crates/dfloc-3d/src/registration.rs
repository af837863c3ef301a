use crate::pose::{Attitude, Pose4};

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// The step size dropped below the convergence threshold.
    Converged,
    /// The iteration cap was reached before convergence.
    MaxIterations,
    /// Too few points produced a valid residual.
    InsufficientPoints,
    /// The normal equations are degenerate; the pose is unconstrained.
    Singular,
}

impl RegistrationStatus {
    /// Whether the result must be discarded by the caller.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Singular)
    }

    /// Whether the result is usable but should be trusted less.
    pub fn is_low_confidence(&self) -> bool {
        matches!(self, Self::InsufficientPoints)
    }
}

/// The result of registering a scan against a map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistrationResult {
    /// The estimated pose.
    pub pose: Pose4,
    /// Whether the iteration converged.
    pub converged: bool,
    /// Number of points that contributed a residual at the returned pose.
    pub valid_point_count: usize,
    /// Why the iteration stopped.
    pub status: RegistrationStatus,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Cost at the initial pose.
    pub initial_cost: f64,
    /// Cost at the returned pose.
    pub final_cost: f64,
}

impl RegistrationResult {
    /// A result that leaves the initial pose untouched.
    pub fn unchanged(
        pose: Pose4,
        status: RegistrationStatus,
        valid_point_count: usize,
        cost: f64,
    ) -> Self {
        Self {
            pose,
            converged: false,
            valid_point_count,
            status,
            iterations: 0,
            initial_cost: cost,
            final_cost: cost,
        }
    }
}

/// A 4-DOF scan to map registration strategy.
///
/// Implementations estimate `x, y, z, yaw` of the platform while roll and
/// pitch are held at the given attitude. The points are in the base frame.
pub trait Registration: Send + Sync {
    /// Register `points` starting from `initial_pose`.
    fn register(
        &self,
        points: &[[f64; 3]],
        initial_pose: Pose4,
        attitude: Attitude,
    ) -> RegistrationResult;
}
