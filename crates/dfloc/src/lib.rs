#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use dfloc_3d as d3;

#[doc(inline)]
pub use dfloc_grid as grid;

#[doc(inline)]
pub use dfloc_solver as solver;

#[doc(inline)]
pub use dfloc_icp as icp;

#[doc(inline)]
pub use dfloc_ndt as ndt;

#[doc(inline)]
pub use dfloc_localizer as localizer;
