//! Top-level handle pairing an input point set with the model that approximates it.
//!
//! ```rust
//! use mfa::{AdaptiveOptions, Mfa, PointSet};
//! use mfa::utils::{linspace, sample_grid};
//!
//! let axes = vec![linspace(0.0_f64, 1.0, 16), linspace(0.0_f64, 1.0, 16)];
//! let domain = sample_grid(&axes, |p| p[0] * p[0] - p[1]);
//! let input = PointSet::structured(domain, &[16, 16]).unwrap();
//!
//! // Fit the last column only, starting from a single Bezier patch
//! let mut mfa = Mfa::new(&[2, 2], &[3, 3], input, 2, 2).unwrap();
//! let outcome = mfa.adaptive_encode(&AdaptiveOptions::with_err_limit(1e-6)).unwrap();
//! assert!(outcome.converged());
//! let z = mfa.decode_pt(&[0.5, 0.5]).unwrap();
//! assert!((z[0] - (0.25 - 0.5)).abs() < 1e-6);
//! ```
use crate::config::{AdaptiveOptions, EncodeOptions, KnotPlacement};
use crate::decode::{DecodeInfo, Decoder};
use crate::encode::{adaptive::AdaptiveOutcome, EncodeSummary, Encoder};
use crate::error::{MfaError, MfaResult};
use crate::lp::{DenseSimplex, LpSolver};
use crate::model::ModelData;
use crate::param::PointSet;
use crate::Real;

pub struct Mfa<T: Real> {
    input: PointSet<T>,
    model: ModelData<T>,
    lp: Box<dyn LpSolver>,
}

impl<T: Real> Mfa<T> {
    /// Model of columns `[min_dim, max_dim]` of `input` with the given degree and initial
    /// control-point count per domain dimension.
    ///
    /// Knots of structured inputs are placed uniformly; see [`Mfa::with_knot_placement`].
    ///
    /// # Errors
    /// * If the column range is empty or outside the point set
    /// * If `degree` does not have one entry per domain dimension of `input`
    /// * If any dimension has too few control points or input points for its degree
    pub fn new(
        degree: &[usize],
        nctrl_pts: &[usize],
        input: PointSet<T>,
        min_dim: usize,
        max_dim: usize,
    ) -> MfaResult<Self> {
        if max_dim >= input.pt_dim() {
            return Err(MfaError::DimensionMismatch(format!(
                "column {max_dim} is outside a point set of {} columns",
                input.pt_dim()
            )));
        }
        if degree.len() != input.dom_dim() {
            return Err(MfaError::DimensionMismatch(format!(
                "{} degrees for a point set of {} domain dimensions",
                degree.len(),
                input.dom_dim()
            )));
        }
        let mut model = ModelData::new(degree, nctrl_pts, min_dim, max_dim)?;
        if input.is_structured() {
            model.set_knots(&input, KnotPlacement::Uniform)?;
        }
        Ok(Self {
            input,
            model,
            lp: Box::new(DenseSimplex::default()),
        })
    }

    /// Re-place the knots, discarding any encoded control points
    pub fn with_knot_placement(mut self, placement: KnotPlacement) -> MfaResult<Self> {
        self.model.set_knots(&self.input, placement)?;
        Ok(self)
    }

    /// Use another feasibility solver for rational weights
    pub fn with_lp_solver(mut self, lp: Box<dyn LpSolver>) -> Self {
        self.lp = lp;
        self
    }

    pub fn model(&self) -> &ModelData<T> {
        &self.model
    }

    pub fn input(&self) -> &PointSet<T> {
        &self.input
    }

    /// Encode with the current control-point counts
    pub fn fixed_encode(&mut self, opts: &EncodeOptions) -> MfaResult<EncodeSummary> {
        Encoder::new(&mut self.model, &self.input)
            .with_lp_solver(self.lp.as_ref())
            .fixed_encode(opts)
    }

    /// Encode, refining knots until the error limit is met
    pub fn adaptive_encode(&mut self, opts: &AdaptiveOptions<T>) -> MfaResult<AdaptiveOutcome> {
        Encoder::new(&mut self.model, &self.input)
            .with_lp_solver(self.lp.as_ref())
            .adaptive_encode(opts)
    }

    /// Copy of the input with the model's columns replaced by decoded values, or by
    /// derivatives if `derivs` holds a nonzero order
    pub fn decode_domain(&self, derivs: &[usize], saved_basis: bool) -> MfaResult<PointSet<T>> {
        let decoder = Decoder::new(&self.model)?;
        let mut approx = self.input.clone();
        decoder.decode_point_set(&mut approx, self.model.min_dim, self.model.max_dim, derivs, saved_basis)?;
        Ok(approx)
    }

    /// Model coordinates at one parameter point
    pub fn decode_pt(&self, param: &[T]) -> MfaResult<Vec<T>> {
        let decoder = Decoder::new(&self.model)?;
        let mut di = DecodeInfo::new(&self.model);
        let mut out = vec![T::zero(); self.model.pt_dim()];
        decoder.decode_pt(param, &mut di, &mut out)?;
        Ok(out)
    }

    /// Absolute error of point `idx` of `approx` against the input, per model coordinate
    pub fn abs_coord_error(&self, approx: &PointSet<T>, idx: usize) -> MfaResult<Vec<T>> {
        if approx.npts() != self.input.npts() || approx.pt_dim() != self.input.pt_dim() {
            return Err(MfaError::DimensionMismatch(format!(
                "approximation of {} x {} for input of {} x {}",
                approx.npts(),
                approx.pt_dim(),
                self.input.npts(),
                self.input.pt_dim()
            )));
        }
        if idx >= self.input.npts() {
            return Err(MfaError::DimensionMismatch(format!(
                "point {idx} of {}",
                self.input.npts()
            )));
        }
        Ok((self.model.min_dim..=self.model.max_dim)
            .map(|c| (approx.domain[[idx, c]] - self.input.domain[[idx, c]]).abs())
            .collect())
    }
}
