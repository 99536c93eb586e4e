//! Separable least-squares encoding of a structured point set into control points.
//!
//! Dimension `k` solves one small normal-equation system per curve of points running along
//! `k` (P&T A9.7 in n dimensions). The output of dimension `k` replaces the point grid along
//! `k` with control points and becomes the input of dimension `k + 1`, so after the last
//! dimension the buffer holds the full control-point grid.
//!
//! Only the last column (the range coordinate) is rational. Rational weights are solved in
//! the last dimension only, where every curve sees final control points of the previous
//! dimensions.
use crate::basis::{self, basis_funs_row, BasisScratch};
use crate::config::EncodeOptions;
use crate::error::{MfaError, MfaResult};
use crate::linalg::SymmetricFactor;
use crate::lp::{DenseSimplex, LpSolver};
use crate::model::ModelData;
use crate::parallel::map_units;
use crate::param::PointSet;
use crate::volume::curve_origin;
use crate::{to_f64, Real};
use ndarray::{Array1, Array2, ArrayView1, Axis, Slice};

pub mod adaptive;
pub mod weights;

use weights::{solve_weights, CurveWeights};

static DEFAULT_LP: DenseSimplex = DenseSimplex {
    max_iter: 10_000,
    tol: 1e-9,
};

/// Bookkeeping of one encode pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Curves of the last dimension that solved rational weights
    pub weighted_curves: usize,
    /// Of those, curves that fell back to uniform weights
    pub degraded_curves: usize,
}

/// Normal matrix of `n` with basis functions rationalized by `weights`:
/// `N_rat[i][j] = N[i][j] w[j] / Σ_l N[i][l] w[l]`, returned as `N_ratᵗ N_rat`.
pub fn rationalize<T: Real>(n: &Array2<T>, weights: ArrayView1<T>) -> Array2<T> {
    let denom = n.dot(&weights);
    let n_rat = Array2::from_shape_fn(n.dim(), |(i, j)| n[[i, j]] * weights[j] / denom[i]);
    n_rat.t().dot(&n_rat)
}

/// Right-hand side `Nᵗ Q` for the points `q` of one curve; the last column is weighted by
/// `weights` and the rational denominators of each point.
pub fn rhs<T: Real>(n: &Array2<T>, q: &Array2<T>, weights: ArrayView1<T>) -> Array2<T> {
    let last = q.ncols() - 1;
    let mut r = n.t().dot(q);
    let denom = n.dot(&weights);
    for i in 0..n.ncols() {
        let mut acc = T::zero();
        for k in 0..n.nrows() {
            acc = acc + n[[k, i]] * weights[i] / denom[k] * q[[k, last]];
        }
        r[[i, last]] = acc;
    }
    r
}

/// Encoder over one model and the structured point set it approximates
pub struct Encoder<'a, T: Real> {
    pub(crate) model: &'a mut ModelData<T>,
    pub(crate) input: &'a PointSet<T>,
    pub(crate) lp: &'a dyn LpSolver,
}

impl<'a, T: Real> Encoder<'a, T> {
    pub fn new(model: &'a mut ModelData<T>, input: &'a PointSet<T>) -> Self {
        Self {
            model,
            input,
            lp: &DEFAULT_LP,
        }
    }

    /// Use another feasibility solver for the rational-weight fallback
    pub fn with_lp_solver(mut self, lp: &'a dyn LpSolver) -> Self {
        self.lp = lp;
        self
    }

    fn check_input(&self) -> MfaResult<()> {
        if !self.input.is_structured() {
            return Err(MfaError::UnstructuredInput);
        }
        if self.input.dom_dim() != self.model.dom_dim {
            return Err(MfaError::DimensionMismatch(format!(
                "point set has {} domain dimensions, model has {}",
                self.input.dom_dim(),
                self.model.dom_dim
            )));
        }
        if self.model.max_dim >= self.input.pt_dim() {
            return Err(MfaError::DimensionMismatch(format!(
                "model coordinates [{}, {}] exceed the {} columns of the point set",
                self.model.min_dim,
                self.model.max_dim,
                self.input.pt_dim()
            )));
        }
        Ok(())
    }

    /// Least-squares control points and weights for `nctrl_pts` control points per
    /// dimension over the model's current global knots.
    ///
    /// Basis matrices of the input parameters are cached in the model for later decoding.
    ///
    /// # Errors
    /// * If the input is unstructured or does not match the model's dimensions
    /// * If `nctrl_pts` does not match the global knot sequences or the degree
    /// * If a normal-equation solve fails
    pub fn encode(
        &mut self,
        nctrl_pts: &[usize],
        opts: &EncodeOptions,
    ) -> MfaResult<(Array2<T>, Array1<T>, EncodeSummary)> {
        self.check_input()?;
        let dom_dim = self.model.dom_dim;
        if nctrl_pts.len() != dom_dim {
            return Err(MfaError::DimensionMismatch(format!(
                "{} control point counts for {dom_dim} dimensions",
                nctrl_pts.len()
            )));
        }
        let ndom_pts = self.input.ndom_pts().to_vec();
        for k in 0..dom_dim {
            let p = self.model.p[k];
            if nctrl_pts[k] <= p {
                return Err(MfaError::TooFewControlPoints {
                    dim: k,
                    degree: p,
                    found: nctrl_pts[k],
                });
            }
            if nctrl_pts[k] != self.model.tmesh.nctrl_global(k) {
                return Err(MfaError::DimensionMismatch(format!(
                    "dimension {k}: {} control points requested, knots support {}",
                    nctrl_pts[k],
                    self.model.tmesh.nctrl_global(k)
                )));
            }
            if nctrl_pts[k] > ndom_pts[k] {
                log::warn!(
                    "dimension {k}: {} control points exceed {} input points; compression is unlikely",
                    nctrl_pts[k],
                    ndom_pts[k]
                );
            }
        }

        let (min_dim, max_dim) = (self.model.min_dim, self.model.max_dim);
        let pt_dim = max_dim - min_dim + 1;
        let mut buf: Array2<T> = self
            .input
            .domain
            .slice_axis(Axis(1), Slice::from(min_dim..max_dim + 1))
            .to_owned();
        let mut ntemp = ndom_pts.clone();
        let mut weights = Array1::<T>::ones(nctrl_pts.iter().product::<usize>());
        let mut summary = EncodeSummary::default();
        let mut basis_cache = Vec::with_capacity(dom_dim);

        for k in 0..dom_dim {
            let n = self.basis_matrix(k, nctrl_pts[k])?;
            let ntn = n.t().dot(&n);
            let factor = SymmetricFactor::new(&ntn)?;
            let solve_w = opts.weighted && k + 1 == dom_dim;

            let npts_k = ntemp[k];
            let nc = nctrl_pts[k];
            let cs: usize = ntemp[..k].iter().product();
            let ncurves = buf.nrows() / npts_k;

            let curves = map_units(
                ncurves,
                || (),
                |_, j| -> MfaResult<(Array2<T>, Option<CurveWeights<T>>)> {
                    let co = curve_origin(j, cs, npts_k);
                    let q = Array2::from_shape_fn((npts_k, pt_dim), |(i, c)| buf[[co + i * cs, c]]);
                    let cw = if solve_w {
                        Some(solve_weights(&n, &factor, q.column(pt_dim - 1), &opts.weights, self.lp, j)?)
                    } else {
                        None
                    };
                    let p = solve_curve(&n, &factor, &q, cw.as_ref().map(|c| c.weights.view()))?;
                    Ok((p, cw))
                },
            );

            ntemp[k] = nc;
            let mut next = Array2::<T>::zeros((ntemp.iter().product::<usize>(), pt_dim));
            for (j, curve) in curves.into_iter().enumerate() {
                let (p, cw) = curve?;
                let to = curve_origin(j, cs, nc);
                for i in 0..nc {
                    next.row_mut(to + i * cs).assign(&p.row(i));
                }
                if let Some(cw) = cw {
                    summary.weighted_curves += 1;
                    if cw.degraded {
                        summary.degraded_curves += 1;
                    }
                    for i in 0..nc {
                        weights[to + i * cs] = cw.weights[i];
                    }
                }
            }
            buf = next;
            basis_cache.push(n);
            log::debug!("dimension {k} of {dom_dim} encoded: {ncurves} curves");
        }

        if summary.degraded_curves > 0 {
            log::warn!(
                "{} of {} curves fell back to uniform weights",
                summary.degraded_curves,
                summary.weighted_curves
            );
        }
        self.model.basis = basis_cache;
        self.model.basis_params = (0..dom_dim)
            .map(|k| self.input.params.grid(k).map(<[T]>::to_vec))
            .collect::<Option<Vec<_>>>()
            .ok_or(MfaError::UnstructuredInput)?;
        Ok((buf, weights, summary))
    }

    /// Encode with the control-point counts of tensor product 0 and store the result there
    pub fn fixed_encode(&mut self, opts: &EncodeOptions) -> MfaResult<EncodeSummary> {
        let nctrl_pts = self.model.tmesh.tensor(0)?.nctrl_pts.clone();
        let (ctrl_pts, weights, summary) = self.encode(&nctrl_pts, opts)?;
        let tensor = self.model.tmesh.tensor_mut(0)?;
        tensor.ctrl_pts = ctrl_pts;
        tensor.weights = weights;
        Ok(summary)
    }

    /// Basis matrix (points x control points) of the input parameters along `dim`
    fn basis_matrix(&self, dim: usize, nctrl: usize) -> MfaResult<Array2<T>> {
        let params = self
            .input
            .params
            .grid(dim)
            .ok_or(MfaError::UnstructuredInput)?;
        let p = self.model.p[dim];
        let knots = &self.model.tmesh.all_knots[dim];
        let mut n = Array2::<T>::zeros((params.len(), nctrl));
        let mut scratch = BasisScratch::new(p);
        for (i, &u) in params.iter().enumerate() {
            let span = basis::find_span(knots, p, u).ok_or_else(|| MfaError::ParamOutOfRange {
                dim,
                value: to_f64(u),
                min: to_f64(knots[0]),
                max: to_f64(knots[knots.len() - 1]),
            })?;
            basis_funs_row(knots, p, span, u, n.row_mut(i), &mut scratch);
        }
        Ok(n)
    }
}

/// Control points of one curve: polynomial fit for the domain columns, rational fit for the
/// last column when weights are given
fn solve_curve<T: Real>(
    n: &Array2<T>,
    factor: &SymmetricFactor,
    q: &Array2<T>,
    weights: Option<ArrayView1<T>>,
) -> MfaResult<Array2<T>> {
    let w: Array1<T> = match weights {
        Some(w) => w.to_owned(),
        None => Array1::ones(n.ncols()),
    };
    let r = rhs(n, q, w.view());
    let mut p = factor.solve(&r)?;
    if weights.is_some() {
        let last = q.ncols() - 1;
        let rat = SymmetricFactor::new(&rationalize(n, w.view()))?;
        let r_last = r.column(last).insert_axis(Axis(1)).to_owned();
        let p_last = rat.solve(&r_last)?;
        p.column_mut(last).assign(&p_last.column(0));
    }
    Ok(p)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::KnotPlacement;
    use crate::utils::*;

    fn ramp_input(npts: usize) -> PointSet<f64> {
        let x = linspace(0.0_f64, 1.0, npts);
        let domain = sample_grid(&[x], |p| 2.0 * p[0] - 1.0);
        PointSet::structured(domain, &[npts]).unwrap()
    }

    #[test]
    fn test_rationalize_unit_weights_is_plain() {
        let input = ramp_input(12);
        let mut model = ModelData::new(&[2], &[5], 0, 1).unwrap();
        model.set_knots(&input, KnotPlacement::Uniform).unwrap();
        let enc = Encoder::new(&mut model, &input);
        let n = enc.basis_matrix(0, 5).unwrap();
        let ones = Array1::ones(5);
        let plain = n.t().dot(&n);
        let rat = rationalize(&n, ones.view());
        for (a, b) in plain.iter().zip(rat.iter()) {
            assert!((a - b).abs() < 1e-14);
        }
    }

    #[test]
    fn test_degree_one_interpolates() {
        let npts = 9;
        let x = linspace(0.0_f64, 1.0, npts);
        let domain = sample_grid(&[x], |p| (5.0 * p[0]).sin());
        let input = PointSet::structured(domain, &[npts]).unwrap();
        let mut model = ModelData::new(&[1], &[npts], 0, 1).unwrap();
        model.set_knots(&input, KnotPlacement::Parametric).unwrap();
        let mut enc = Encoder::new(&mut model, &input);
        let (ctrl, _, _) = enc.encode(&[npts], &EncodeOptions::default()).unwrap();
        for i in 0..npts {
            for c in 0..2 {
                assert!((ctrl[[i, c]] - input.domain[[i, c]]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_encode_2d_caches_basis() {
        let axes = vec![linspace(0.0_f64, 1.0, 10), linspace(0.0_f64, 1.0, 8)];
        let domain = sample_grid(&axes, |p| p[0] * p[1]);
        let input = PointSet::structured(domain, &[10, 8]).unwrap();
        let mut model = ModelData::new(&[2, 2], &[4, 5], 0, 2).unwrap();
        model.set_knots(&input, KnotPlacement::Uniform).unwrap();
        let mut enc = Encoder::new(&mut model, &input);
        let (ctrl, weights, summary) = enc.encode(&[4, 5], &EncodeOptions::default()).unwrap();
        assert_eq!(ctrl.dim(), (20, 3));
        assert!(weights.iter().all(|&w| w == 1.0));
        assert_eq!(summary, EncodeSummary::default());
        assert_eq!(model.basis.len(), 2);
        assert_eq!(model.basis[0].dim(), (10, 4));
        assert_eq!(model.basis[1].dim(), (8, 5));
    }

    #[test]
    fn test_encode_rejects_bad_requests() {
        let input = ramp_input(10);
        let mut model = ModelData::new(&[3], &[6], 0, 1).unwrap();
        model.set_knots(&input, KnotPlacement::Uniform).unwrap();
        let mut enc = Encoder::new(&mut model, &input);
        assert!(matches!(
            enc.encode(&[3], &EncodeOptions::default()),
            Err(MfaError::TooFewControlPoints { .. })
        ));
        assert!(enc.encode(&[7], &EncodeOptions::default()).is_err());

        let params = Array2::from_elem((10, 1), 0.5);
        let scattered = PointSet::unstructured(input.domain.clone(), params).unwrap();
        let mut enc = Encoder::new(&mut model, &scattered);
        assert!(matches!(
            enc.encode(&[6], &EncodeOptions::default()),
            Err(MfaError::UnstructuredInput)
        ));
    }

    #[test]
    fn test_weighted_encode_reports_weights() {
        let npts = 25;
        let x = linspace(0.0_f64, 1.0, npts);
        let domain = sample_grid(&[x], |p| 1.0 / (1.0 + 10.0 * p[0] * p[0]));
        let input = PointSet::structured(domain, &[npts]).unwrap();
        let mut model = ModelData::new(&[3], &[8], 0, 1).unwrap();
        model.set_knots(&input, KnotPlacement::Uniform).unwrap();
        let mut enc = Encoder::new(&mut model, &input);
        let opts = EncodeOptions {
            weighted: true,
            ..Default::default()
        };
        let summary = enc.fixed_encode(&opts).unwrap();
        assert_eq!(summary.weighted_curves, 1);
        let w = &model.tmesh.tensor_prods[0].weights;
        assert!(w.iter().all(|&w| w > 0.0));
        let max = w.iter().fold(0.0_f64, |a, &b| a.max(b));
        assert!((max - 1.0).abs() < 1e-12);
    }
}
