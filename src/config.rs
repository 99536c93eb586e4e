//! Options controlling knot placement, encoding, rational weights and adaptive refinement.
//!
//! All options are plain values with `Default` implementations; nothing is read from files
//! or the environment.
use crate::Real;

/// How the initial knot vector of each dimension is placed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KnotPlacement {
    /// Equally spaced interior knots
    #[default]
    Uniform,
    /// Interior knots interpolated between input parameters so that every
    /// knot span contains input points
    Parametric,
}

/// How parameters are assigned to a structured input grid
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Parameterization {
    /// Normalized domain coordinates along each grid axis
    #[default]
    Domain,
    /// Equally spaced parameters in [0, 1] regardless of coordinates
    Uniform,
}

/// Bounds used by the rational-weight solver
#[derive(Clone, Copy, Debug)]
pub struct WeightOptions {
    /// Lower bound on any weight produced by the LP fallback
    pub min_weight: f64,
    /// Upper bound on any weight produced by the LP fallback
    pub max_weight: f64,
    /// Eigenvector entries smaller than this in magnitude are treated as zero
    pub min_eigvec_entry: f64,
    /// Eigenvalues within this fraction of the matrix scale of zero, or of each other, are
    /// treated as zero or repeated
    pub eigval_rtol: f64,
}

impl Default for WeightOptions {
    fn default() -> Self {
        Self {
            min_weight: 1.0,
            max_weight: 1.0e4,
            min_eigvec_entry: 1.0e-12,
            eigval_rtol: 1.0e-10,
        }
    }
}

/// Options for a single fixed-size encode
#[derive(Clone, Copy, Debug, Default)]
pub struct EncodeOptions {
    /// Solve rational weights for the range coordinate
    pub weighted: bool,
    pub weights: WeightOptions,
}

/// Options for the adaptive knot-insertion loop
#[derive(Clone, Debug)]
pub struct AdaptiveOptions<T: Real> {
    /// Maximum allowed absolute error per coordinate, after normalization by `extents`
    pub err_limit: T,
    /// Solve rational weights for the range coordinate on every round
    pub weighted: bool,
    pub weights: WeightOptions,
    /// Per-coordinate normalization of the error, one entry per output column;
    /// `None` compares raw absolute errors
    pub extents: Option<Vec<T>>,
    /// Stop after this many refinement rounds even if the error limit is not met
    pub max_rounds: Option<usize>,
}

impl<T: Real> Default for AdaptiveOptions<T> {
    fn default() -> Self {
        Self {
            err_limit: crate::cast(1.0e-3),
            weighted: false,
            weights: WeightOptions::default(),
            extents: None,
            max_rounds: None,
        }
    }
}

impl<T: Real> AdaptiveOptions<T> {
    pub fn with_err_limit(err_limit: T) -> Self {
        Self {
            err_limit,
            ..Self::default()
        }
    }
}
