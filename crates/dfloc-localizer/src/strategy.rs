use std::sync::Arc;

use dfloc_3d::pose::{Attitude, Pose4};
use dfloc_3d::registration::{Registration, RegistrationResult};
use dfloc_grid::DistanceField;
use dfloc_icp::IcpAligner;
use dfloc_ndt::NdtAligner;
use dfloc_solver::{DistanceFieldAligner, PoseSolver};

use crate::config::{AlignMethod, LocalizerConfig};
use crate::error::LocalizerError;

/// The registration strategy selected by [`AlignMethod`].
pub enum Strategy {
    /// Direct registration against a distance field.
    DistanceField(DistanceFieldAligner),
    /// Point to point ICP.
    Icp(IcpAligner),
    /// Normal distributions transform.
    Ndt(NdtAligner),
}

impl Strategy {
    /// Build the strategy named by `config.align_method`.
    ///
    /// # Arguments
    ///
    /// * `config` - The localizer configuration.
    /// * `field` - The distance field, required by [`AlignMethod::DistanceField`].
    /// * `map_points` - The map points, required by [`AlignMethod::Icp`] and [`AlignMethod::Ndt`].
    pub fn from_config(
        config: &LocalizerConfig,
        field: Option<Arc<DistanceField>>,
        map_points: Option<&[[f64; 3]]>,
    ) -> Result<Self, LocalizerError> {
        match config.align_method {
            AlignMethod::DistanceField => {
                let field = field.ok_or(LocalizerError::MissingDistanceField)?;
                let solver = PoseSolver::new(config.solver.clone())?;
                Ok(Self::DistanceField(DistanceFieldAligner::new(solver, field)))
            }
            AlignMethod::Icp => {
                let points = map_points.ok_or(LocalizerError::MissingMapPoints(AlignMethod::Icp))?;
                Ok(Self::Icp(IcpAligner::new(points, config.icp.clone())?))
            }
            AlignMethod::Ndt => {
                let points = map_points.ok_or(LocalizerError::MissingMapPoints(AlignMethod::Ndt))?;
                Ok(Self::Ndt(NdtAligner::new(points, config.ndt.clone())?))
            }
        }
    }

    /// The method implemented by this strategy.
    pub fn method(&self) -> AlignMethod {
        match self {
            Self::DistanceField(_) => AlignMethod::DistanceField,
            Self::Icp(_) => AlignMethod::Icp,
            Self::Ndt(_) => AlignMethod::Ndt,
        }
    }
}

impl Registration for Strategy {
    fn register(
        &self,
        points: &[[f64; 3]],
        initial_pose: Pose4,
        attitude: Attitude,
    ) -> RegistrationResult {
        match self {
            Self::DistanceField(aligner) => aligner.register(points, initial_pose, attitude),
            Self::Icp(aligner) => aligner.register(points, initial_pose, attitude),
            Self::Ndt(aligner) => aligner.register(points, initial_pose, attitude),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfloc_grid::MapInput;
    use glam::DVec3;

    fn wall_points() -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        for a in 0..20 {
            for b in 0..20 {
                let (u, v) = (0.1 * a as f64, 0.1 * b as f64);
                points.push([0.5, u, v]);
                points.push([u, 0.5, v]);
                points.push([u, v, 0.5]);
            }
        }
        points
    }

    #[test]
    fn test_missing_inputs() {
        let mut config = LocalizerConfig::default();
        assert!(matches!(
            Strategy::from_config(&config, None, None),
            Err(LocalizerError::MissingDistanceField)
        ));

        config.align_method = AlignMethod::Icp;
        assert!(matches!(
            Strategy::from_config(&config, None, None),
            Err(LocalizerError::MissingMapPoints(AlignMethod::Icp))
        ));

        config.align_method = AlignMethod::Ndt;
        assert!(matches!(
            Strategy::from_config(&config, None, Some(&[])),
            Err(LocalizerError::Ndt(_))
        ));
    }

    #[test]
    fn test_dispatch() -> Result<(), Box<dyn std::error::Error>> {
        let points = wall_points();
        let field = DistanceField::build(
            MapInput::Points(&points),
            DVec3::splat(-0.5),
            0.1,
            [31, 31, 31],
        )?;
        let field = Arc::new(field);

        for method in [AlignMethod::DistanceField, AlignMethod::Icp, AlignMethod::Ndt] {
            let config = LocalizerConfig {
                align_method: method,
                ..Default::default()
            };
            let strategy =
                Strategy::from_config(&config, Some(field.clone()), Some(points.as_slice()))?;
            assert_eq!(strategy.method(), method);
        }
        Ok(())
    }
}
