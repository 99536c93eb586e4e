//! Fast evaluation of unweighted scalar models with one tensor product.
//!
//! The `(p + 1)^d` support box is contracted one dimension at a time (k-mode products):
//! dimension 0 collapses the box into `(p + 1)^(d-1)` partial sums read straight from the
//! control points, each further dimension collapses the previous partial sums by another
//! factor of `p + 1`. All buffers live in a [`FastDecodeInfo`] built once per worker, so
//! evaluation does not allocate.
//!
//! The gradient shares the first contraction between the value and every derivative
//! except the one along dimension 0, and keeps one chain of partial sums per derivative.
use super::Decoder;
use crate::basis::{der_basis_funs, find_span, BasisScratch};
use crate::error::{MfaError, MfaResult};
use crate::{to_f64, Real};
use ndarray::{Array2, ArrayView1};

/// Per-worker buffers of the fast decoder
#[derive(Clone, Debug)]
pub struct FastDecodeInfo<T: Real> {
    /// First control point of the support box, per dimension
    start: Vec<usize>,
    /// Highest derivative order the basis tables hold
    nders: usize,
    /// Basis functions (row 0) and derivatives per dimension, `(nders + 1) x (p + 1)`
    d: Vec<Array2<T>>,
    /// Value contractions: `t[k]` holds the box contracted over dimensions `0..=k`
    t: Vec<Vec<T>>,
    /// Derivative contractions: `td[i][k]` as `t[k]` with dimension `i` differentiated
    td: Vec<Vec<Vec<T>>>,
    scratch: BasisScratch<T>,
}

impl<T: Real> FastDecodeInfo<T> {
    pub fn new(decoder: &Decoder<T>) -> Self {
        let model = decoder.model;
        let dom_dim = model.dom_dim;
        let t: Vec<Vec<T>> = (0..dom_dim)
            .map(|k| vec![T::zero(); decoder.tot_iters / decoder.ds[k + 1]])
            .collect();
        Self {
            start: vec![0; dom_dim],
            nders: 0,
            d: model.p.iter().map(|p| Array2::zeros((1, p + 1))).collect(),
            td: vec![t.clone(); dom_dim],
            t,
            scratch: BasisScratch::for_degrees(&model.p),
        }
    }

    /// Grow the basis tables to hold derivatives up to `nders`
    pub fn resize_ders(&mut self, nders: usize) {
        if nders > self.nders {
            for d in self.d.iter_mut() {
                *d = Array2::zeros((nders + 1, d.ncols()));
            }
            self.nders = nders;
        }
    }
}

/// `dst[n] = Σ_i row[i] src[n q + i]`
#[inline]
fn contract<T: Real>(src: &[T], row: ArrayView1<T>, dst: &mut [T]) {
    let q = row.len();
    for (n, out) in dst.iter_mut().enumerate() {
        let block = &src[n * q..(n + 1) * q];
        let mut acc = T::zero();
        for i in 0..q {
            acc = acc + row[i] * block[i];
        }
        *out = acc;
    }
}

impl<'a, T: Real> Decoder<'a, T> {
    /// Check that the model qualifies for [`Decoder::fast_vol_pt`] and [`Decoder::fast_grad`]
    pub fn check_fast(&self) -> MfaResult<()> {
        let tmesh = &self.model.tmesh;
        if tmesh.tensor_prods.len() != 1 {
            return Err(MfaError::UnsupportedFastPath("model has more than one tensor product"));
        }
        if self.model.pt_dim() != 1 {
            return Err(MfaError::UnsupportedFastPath("model has more than one output coordinate"));
        }
        if !tmesh.tensor_prods[0].is_unweighted() {
            return Err(MfaError::UnsupportedFastPath("model is rational"));
        }
        Ok(())
    }

    /// Basis tables up to `nders` and box start for `param`
    fn fast_basis(&self, param: &[T], nders: usize, fdi: &mut FastDecodeInfo<T>) -> MfaResult<()> {
        let model = self.model;
        if param.len() != model.dom_dim {
            return Err(MfaError::DimensionMismatch(format!(
                "{} parameters for {} dimensions",
                param.len(),
                model.dom_dim
            )));
        }
        fdi.resize_ders(nders);
        let tensor = &model.tmesh.tensor_prods[0];
        for k in 0..model.dom_dim {
            let p = model.p[k];
            let knots = &model.tmesh.all_knots[k];
            let u = param[k];
            let span = find_span(knots, p, u).ok_or_else(|| MfaError::ParamOutOfRange {
                dim: k,
                value: to_f64(u),
                min: to_f64(knots[0]),
                max: to_f64(knots[knots.len() - 1]),
            })?;
            let j0 = span - p;
            if j0 + p >= tensor.nctrl_pts[k] {
                return Err(MfaError::LevelMismatch {
                    dim: k,
                    tensor: 0,
                    span,
                    level: tensor.level,
                });
            }
            fdi.start[k] = j0;
            der_basis_funs(knots, p, span, u, nders, fdi.d[k].view_mut(), &mut fdi.scratch);
        }
        Ok(())
    }

    /// Contract the control points of the support box along dimension 0 with `row`
    fn fast_first_mode(&self, row: ArrayView1<T>, start: &[usize], dst: &mut [T]) {
        let ctrl = self.model.tmesh.tensor_prods[0].ctrl_pts.column(0);
        let base: usize = start.iter().zip(&self.cs).map(|(s, c)| s * c).sum();
        let q0 = self.q[0];
        for (n, m) in (0..self.tot_iters).step_by(q0).enumerate() {
            let idx = base + self.jumps[m];
            let mut acc = T::zero();
            for i in 0..q0 {
                acc = acc + row[i] * ctrl[idx + i];
            }
            dst[n] = acc;
        }
    }

    /// Value of an unweighted scalar single-tensor model at `param`.
    ///
    /// # Errors
    /// * If the model does not pass [`Decoder::check_fast`]
    /// * If `param` lies outside the knot range
    pub fn fast_vol_pt(&self, param: &[T], fdi: &mut FastDecodeInfo<T>) -> MfaResult<T> {
        self.check_fast()?;
        self.fast_basis(param, 0, fdi)?;
        let FastDecodeInfo { start, d, t, .. } = fdi;
        self.fast_first_mode(d[0].row(0), start, &mut t[0]);
        for k in 1..self.model.dom_dim {
            let (prev, cur) = t.split_at_mut(k);
            contract(&prev[k - 1], d[k].row(0), &mut cur[0]);
        }
        Ok(t[self.model.dom_dim - 1][0])
    }

    /// Gradient of an unweighted scalar single-tensor model at `param`, written to
    /// `grad[..dom_dim]`, and optionally its value.
    ///
    /// # Errors
    /// * If the model does not pass [`Decoder::check_fast`]
    /// * If `param` lies outside the knot range or `grad` is too short
    pub fn fast_grad(
        &self,
        param: &[T],
        fdi: &mut FastDecodeInfo<T>,
        grad: &mut [T],
        value: Option<&mut T>,
    ) -> MfaResult<()> {
        self.check_fast()?;
        let dom_dim = self.model.dom_dim;
        if grad.len() < dom_dim {
            return Err(MfaError::DimensionMismatch(format!(
                "gradient buffer of {} for {dom_dim} dimensions",
                grad.len()
            )));
        }
        self.fast_basis(param, 1, fdi)?;
        let FastDecodeInfo { start, d, t, td, .. } = fdi;

        // dimension 0: the derivative along 0 uses the derivative row, every other chain
        // starts from the plain contraction
        self.fast_first_mode(d[0].row(0), start, &mut t[0]);
        self.fast_first_mode(d[0].row(1), start, &mut td[0][0]);
        for i in 1..dom_dim {
            td[i][0].copy_from_slice(&t[0]);
        }

        for k in 1..dom_dim {
            for i in 0..dom_dim {
                let alias = if i == k { 1 } else { 0 };
                let (prev, cur) = td[i].split_at_mut(k);
                contract(&prev[k - 1], d[k].row(alias), &mut cur[0]);
            }
            if value.is_some() {
                let (prev, cur) = t.split_at_mut(k);
                contract(&prev[k - 1], d[k].row(0), &mut cur[0]);
            }
        }

        for i in 0..dom_dim {
            grad[i] = td[i][dom_dim - 1][0];
        }
        if let Some(v) = value {
            *v = t[dom_dim - 1][0];
        }
        Ok(())
    }
}
