#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod ndt;
pub use ndt::*;

mod voxel_grid;
pub use voxel_grid::{NdtVoxel, NdtVoxelGrid};
