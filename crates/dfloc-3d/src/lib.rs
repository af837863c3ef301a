#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// I/O utilities for reading and writing 3D data.
pub mod io;

/// Linear algebra utilities.
pub mod linalg;

/// Operations on point sets.
pub mod ops;

/// Point cloud container.
pub mod pointcloud;

/// Planar pose and attitude types.
pub mod pose;

/// The common contract of the registration strategies.
pub mod registration;

/// 3D rotation and rigid transform helpers.
pub mod transforms;
