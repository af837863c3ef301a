/// An error type for the solver.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SolverError {
    /// A solver parameter is out of its valid range.
    #[error("Invalid solver configuration: {0}")]
    InvalidConfig(String),
}
