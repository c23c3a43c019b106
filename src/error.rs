//! Error kinds for the shared-tensor engine.

use thiserror::Error;

/// Errors produced by the arithmetic secret-sharing engine and the
/// approximation library built on top of it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MpcError {
    #[error("shape mismatch: {lhs:?} vs {rhs:?}")]
    ShapeMismatch { lhs: Vec<usize>, rhs: Vec<usize> },

    #[error("scale mismatch: {lhs} vs {rhs}")]
    ScaleMismatch { lhs: u64, rhs: u64 },

    #[error("source party {src} out of range for world size {world_size}")]
    InvalidSource { src: usize, world_size: usize },

    #[error("source party {src} did not provide a data tensor")]
    MissingSourceData { src: usize },

    #[error("tensor size unknown and broadcast_size not set")]
    BroadcastRequired,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("numerical divergence: {0}")]
    NumericalDivergence(String),
}

pub type Result<T> = std::result::Result<T, MpcError>;
