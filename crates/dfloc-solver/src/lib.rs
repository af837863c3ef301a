#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Registration strategy backed by a shared distance field.
pub mod aligner;

/// Solver configuration.
pub mod config;

/// Error types for the solver.
pub mod error;

/// Accumulation of the normal equations over a scan.
pub mod normal_equations;

/// The damped Gauss-Newton pose solver.
pub mod solver;

pub use aligner::DistanceFieldAligner;
pub use config::{ExecutionStrategy, LossFunction, SolverConfig};
pub use error::SolverError;
pub use solver::PoseSolver;
