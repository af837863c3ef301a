use std::sync::Arc;

use dfloc_3d::pose::{Attitude, Pose4};
use dfloc_3d::registration::{Registration, RegistrationResult};
use dfloc_grid::DistanceField;

use crate::solver::PoseSolver;

/// Registers scans against one distance field shared between threads.
#[derive(Debug, Clone)]
pub struct DistanceFieldAligner {
    solver: PoseSolver,
    field: Arc<DistanceField>,
}

impl DistanceFieldAligner {
    /// Create an aligner for a field.
    pub fn new(solver: PoseSolver, field: Arc<DistanceField>) -> Self {
        Self { solver, field }
    }

    /// The distance field of the map.
    pub fn field(&self) -> &DistanceField {
        &self.field
    }
}

impl Registration for DistanceFieldAligner {
    fn register(
        &self,
        points: &[[f64; 3]],
        initial_pose: Pose4,
        attitude: Attitude,
    ) -> RegistrationResult {
        self.solver
            .solve(points, initial_pose, attitude, &self.field)
    }
}
