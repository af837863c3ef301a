#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Exact Euclidean distance transform of occupancy grids.
pub mod edt;

/// Error types for the grid module.
pub mod error;

/// The distance field and its queries.
pub mod field;

/// Trilinear interpolation coefficients of a grid cell.
pub mod interpolation;

/// Saving and loading distance fields.
pub mod io;

pub use error::GridError;
pub use field::{DistanceField, FieldSample, MapInput};
pub use interpolation::TrilinearCoefficients;
