use dfloc_3d::ops::OpsError;
use dfloc_icp::IcpError;
use dfloc_ndt::NdtError;
use dfloc_solver::SolverError;

/// An error type for the localizer.
#[derive(thiserror::Error, Debug)]
pub enum LocalizerError {
    /// Failed to read the configuration file.
    #[error("Failed to read the configuration")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON.
    #[error("Failed to parse the configuration")]
    Json(#[from] serde_json::Error),

    /// The configuration values are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The alignment method name is unknown.
    #[error("Unknown alignment method: {0}")]
    UnknownAlignMethod(String),

    /// The distance field strategy was selected without a field.
    #[error("The distance field strategy requires a distance field")]
    MissingDistanceField,

    /// A point based strategy was selected without map points.
    #[error("The {0:?} strategy requires the map points")]
    MissingMapPoints(crate::config::AlignMethod),

    /// Failed to preprocess a scan.
    #[error(transparent)]
    Ops(#[from] OpsError),

    /// The distance field solver parameters are invalid.
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// Failed to build the ICP strategy.
    #[error(transparent)]
    Icp(#[from] IcpError),

    /// Failed to build the NDT strategy.
    #[error(transparent)]
    Ndt(#[from] NdtError),
}
