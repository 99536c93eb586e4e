//! Error type shared by every fallible operation in the crate.
use crate::linalg::LinalgError;
use thiserror::Error;

/// Result alias used throughout the crate
pub type MfaResult<V> = Result<V, MfaError>;

#[derive(Debug, Error)]
pub enum MfaError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error(
        "Dimension {dim}: degree {degree} needs at least {} control points, found {found}",
        .degree + 1
    )]
    TooFewControlPoints {
        dim: usize,
        degree: usize,
        found: usize,
    },

    #[error("Dimension {dim}: {npts} input points cannot support degree {degree}")]
    TooFewPoints {
        dim: usize,
        degree: usize,
        npts: usize,
    },

    #[error("Dimension {dim}: knot {value} is already present; knot multiplicity above one is not supported")]
    DuplicateKnot { dim: usize, value: f64 },

    #[error("Dimension {dim}: parameter {value} lies outside the knot range [{min}, {max}]")]
    ParamOutOfRange {
        dim: usize,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Dimension {dim}: parameter {index} decreases; grid parameters must be nondecreasing")]
    UnsortedParams { dim: usize, index: usize },

    #[error("Dimension {dim}: parameter {value} lies outside tensor product {tensor} knot range [{min}, {max}]")]
    ParamOutsideTensor {
        dim: usize,
        tensor: usize,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Dimension {dim}: span {span} has no knot at or below level {level} of tensor product {tensor}")]
    LevelMismatch {
        dim: usize,
        tensor: usize,
        span: usize,
        level: usize,
    },

    #[error("Tensor product {0} does not exist")]
    NoSuchTensor(usize),

    #[error("Dimension {dim}: invalid knot index range [{min}, {max}] for {nknots} knots")]
    InvalidKnotRange {
        dim: usize,
        min: usize,
        max: usize,
        nknots: usize,
    },

    #[error("Encoding requires a structured (gridded) input point set")]
    UnstructuredInput,

    #[error("Model has no control points; encode before decoding")]
    NotEncoded,

    #[error("Fast decoding is not supported for this model: {0}")]
    UnsupportedFastPath(&'static str),

    #[error(transparent)]
    Linalg(#[from] LinalgError),
}
