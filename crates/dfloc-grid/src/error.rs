/// An error type for building, loading and saving distance fields.
#[derive(thiserror::Error, Debug)]
pub enum GridError {
    /// The resolution must be finite and strictly positive.
    #[error("Invalid resolution: {0}")]
    InvalidResolution(f64),

    /// Every dimension must hold at least two nodes.
    #[error("Invalid dimensions: {0:?}")]
    InvalidDimensions([usize; 3]),

    /// The origin must be finite.
    #[error("Invalid origin: {0:?}")]
    InvalidOrigin([f64; 3]),

    /// The occupancy buffer does not match the node count.
    #[error("Occupancy length mismatch. Expected {0}, got {1}")]
    OccupancyLengthMismatch(usize, usize),

    /// The distance buffer does not match the node count.
    #[error("Distance length mismatch. Expected {0}, got {1}")]
    DistanceLengthMismatch(usize, usize),

    /// A stored distance is NaN, infinite or negative.
    #[error("Non finite distance at node {0}")]
    NonFiniteDistance(usize),

    /// The map marks no node as occupied.
    #[error("The map has no occupied node inside the grid")]
    EmptyMap,

    /// Failed to read or write a grid file.
    #[error("Failed to access the grid file")]
    Io(#[from] std::io::Error),

    /// Failed to encode a grid.
    #[error("Failed to encode the grid")]
    Encode(#[from] bincode::error::EncodeError),

    /// Failed to decode a grid.
    #[error("Failed to decode the grid")]
    Decode(#[from] bincode::error::DecodeError),
}
