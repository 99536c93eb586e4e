//! Hierarchical tensor-product B-spline / NURBS fitting of structured point data,
//! prioritizing bounded approximation error with far fewer coefficients than samples.
//!
//! A model is a set of tensor products of control points sharing one knot sequence per
//! domain dimension (a T-mesh). The encoder fits control points (and optionally rational
//! weights) to a grid of samples dimension by dimension, and the adaptive driver inserts
//! knots where the decoded error is too large. The decoder evaluates values and
//! derivatives at arbitrary parameters.
//!
//! # Layout
//! Control points and structured samples are stored as rows of an `ndarray::Array2`,
//! linearized with the *first* domain dimension varying fastest:
//! `row = i0 + n0 * (i1 + n1 * (i2 + ...))`. Columns are coordinates; the last column is the
//! range (science) variable and the only one that is rationally weighted.
//!
//! # Performance Scalings
//! | Operation                     | Cost per evaluation / solve                         |
//! |-------------------------------|-----------------------------------------------------|
//! | basis functions, one dim      | O(p^2) + log2(nknots)                               |
//! | decode::vol_pt                | O((p+1)^ndims)                                      |
//! | decode::fast_vol_pt           | O((p+1)^ndims) with k-mode contractions, no alloc   |
//! | encode, one dimension         | O(ncurves * (npts * nctrl + nctrl^3))               |
//! | knot insertion, one knot      | O(prod(nctrl) * p)                                  |
//!
//! # Example: fit and decode a curve
//! ```rust
//! use mfa::{Mfa, PointSet, EncodeOptions};
//! use mfa::utils::linspace;
//! use ndarray::Array2;
//!
//! // 20 samples of a ramp, stored as (x, y) rows
//! let x = linspace(0.0_f64, 1.0, 20);
//! let mut domain = Array2::zeros((20, 2));
//! for (i, &xi) in x.iter().enumerate() {
//!     domain[[i, 0]] = xi;
//!     domain[[i, 1]] = 2.0 * xi - 1.0;
//! }
//! let input = PointSet::structured(domain, &[20]).unwrap();
//!
//! // Cubic fit with 7 control points
//! let mut mfa = Mfa::new(&[3], &[7], input, 0, 1).unwrap();
//! mfa.fixed_encode(&EncodeOptions::default()).unwrap();
//! let y = mfa.decode_pt(&[0.5]).unwrap();
//! assert!((y[1] - 0.0).abs() < 1e-6);
//! ```
// These "needless" range loops are a significant speedup
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

use num_traits::{Float, NumCast, ToPrimitive};
use std::fmt::{Debug, Display};

pub mod error;
pub use error::{MfaError, MfaResult};

pub mod config;
pub use config::{AdaptiveOptions, EncodeOptions, KnotPlacement, Parameterization, WeightOptions};

pub mod basis;
pub use basis::BasisScratch;

pub mod volume;
pub use volume::VolIterator;

pub mod linalg;
pub mod lp;
pub use lp::{BoxLp, DenseSimplex, LpSolver, LpStatus};

pub mod param;
pub use param::{Param, PointSet};

pub mod tmesh;
pub use tmesh::{KnotIdx, TensorProduct, Tmesh};

pub mod model;
pub use model::ModelData;

pub mod encode;
pub use encode::{adaptive::AdaptiveOutcome, EncodeSummary, Encoder};

pub mod decode;
pub use decode::{fast::FastDecodeInfo, DecodeInfo, Decoder};

pub mod mfa;
pub use mfa::Mfa;

pub mod utils;

pub(crate) mod parallel;

#[cfg(test)]
pub(crate) mod testing;

/// Scalar type of knots, parameters, control points and weights.
///
/// Blanket-implemented for every `Float` that can cross thread boundaries,
/// which in practice means `f32` and `f64`.
pub trait Real: Float + Send + Sync + Debug + Display + 'static {}

impl<T> Real for T where T: Float + Send + Sync + Debug + Display + 'static {}

/// Convert a primitive number into the working scalar.
///
/// Every finite primitive is representable (possibly rounded) in `f32`/`f64`;
/// values that are not produce NaN, which downstream checks reject.
#[inline]
pub(crate) fn cast<T: Real, N: ToPrimitive>(n: N) -> T {
    <T as NumCast>::from(n).unwrap_or_else(T::nan)
}

/// Lossy conversion for error messages and logging
#[inline]
pub(crate) fn to_f64<T: Real>(x: T) -> f64 {
    x.to_f64().unwrap_or(f64::NAN)
}

/// Linear index of a multi-index under first-dimension-fastest strides
#[inline]
pub(crate) fn index_of(loc: &[usize], strides: &[usize]) -> usize {
    let mut i = 0;
    for j in 0..strides.len() {
        i += loc[j] * strides[j];
    }

    i
}

/// Cumulative strides for first-dimension-fastest linearization
pub(crate) fn strides_of(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1_usize; dims.len()];
    for i in 1..dims.len() {
        strides[i] = strides[i - 1] * dims[i - 1];
    }
    strides
}
