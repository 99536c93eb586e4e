//! Evaluation of encoded models: single points, points with derivatives, whole point sets
//! and regular parameter grids.
//!
//! A point of one tensor product is accumulated over the `(p + 1)^d` box of control points
//! with nonzero basis functions in one flat loop (P&T A4.3). The first dimension is
//! summed directly; whenever a dimension rolls over, its partial sum is folded into the
//! next dimension scaled by that dimension's basis function, so no intermediate tensor is
//! formed.
//!
//! Across a T-mesh, [`Decoder::vol_pt_tmesh`] blends the control points of every tensor
//! product whose anchors support the query point, finest level first.
use crate::basis::{basis_funs_level, der_basis_funs, one_basis_fun_local, BasisScratch};
use crate::error::{MfaError, MfaResult};
use crate::model::ModelData;
use crate::parallel::map_units;
use crate::param::{Param, PointSet};
use crate::tmesh::{is_not_a_weight, KnotIdx, LevelKnots};
use crate::utils::linspace;
use crate::volume::{index_table, VolIterator};
use crate::{index_of, strides_of, to_f64, Real};
use ndarray::Array2;
use std::collections::HashSet;

pub mod fast;

/// Per-worker scratch for decoding one point at a time
#[derive(Clone, Debug)]
pub struct DecodeInfo<T: Real> {
    /// First control point of the support box, per dimension
    start: Vec<usize>,
    /// Extent of the support box, per dimension
    count: Vec<usize>,
    /// Nonzero basis functions (or derivatives) per dimension
    basis: Vec<Vec<T>>,
    /// Derivative table per dimension, `(p + 1) x (p + 1)`
    ders: Vec<Array2<T>>,
    /// Partial sums per dimension
    temp: Vec<Vec<T>>,
    /// Partial rational denominators per dimension
    denom: Vec<T>,
    param: Vec<T>,
    ijk: Vec<usize>,
    /// Anchors already counted by [`Decoder::vol_pt_tmesh`]
    claimed: HashSet<Vec<KnotIdx>>,
    anchor: Vec<KnotIdx>,
    scratch: BasisScratch<T>,
}

impl<T: Real> DecodeInfo<T> {
    pub fn new(model: &ModelData<T>) -> Self {
        let dom_dim = model.dom_dim;
        let pt_dim = model.pt_dim();
        Self {
            start: vec![0; dom_dim],
            count: model.p.iter().map(|p| p + 1).collect(),
            basis: model.p.iter().map(|p| vec![T::zero(); p + 1]).collect(),
            ders: model.p.iter().map(|p| Array2::zeros((p + 1, p + 1))).collect(),
            temp: vec![vec![T::zero(); pt_dim]; dom_dim],
            denom: vec![T::zero(); dom_dim],
            param: vec![T::zero(); dom_dim],
            ijk: vec![0; dom_dim],
            claimed: HashSet::new(),
            anchor: vec![0; dom_dim],
            scratch: BasisScratch::for_degrees(&model.p),
        }
    }
}

/// Read-only evaluator over one model.
///
/// Construction precomputes, per tensor product, the visible knots and the mapping from
/// visible basis functions to control points, and for tensor product 0 the linear offsets
/// of the support box.
pub struct Decoder<'a, T: Real> {
    pub(crate) model: &'a ModelData<T>,
    /// Visible knots per tensor product, per dimension
    vis: Vec<Vec<LevelKnots<T>>>,
    /// Visible rank of the anchor of control point 0, per tensor product and dimension
    first_anchor: Vec<Vec<usize>>,
    /// Visible basis index of control point 0, per tensor product and dimension
    offsets: Vec<Vec<usize>>,
    /// Tensor products by decreasing level, newest first within a level
    order: Vec<usize>,
    /// Extent of the support box, `p + 1` per dimension
    pub(crate) q: Vec<usize>,
    /// Strides of the support box, with the total size appended
    pub(crate) ds: Vec<usize>,
    /// Multi-index table of the support box
    pub(crate) ct: Vec<usize>,
    pub(crate) tot_iters: usize,
    /// Control-point strides of tensor product 0
    pub(crate) cs: Vec<usize>,
    /// Offset of every support-box entry from the box origin in tensor product 0
    pub(crate) jumps: Vec<usize>,
}

impl<'a, T: Real> Decoder<'a, T> {
    pub fn model(&self) -> &'a ModelData<T> {
        self.model
    }

    /// # Errors
    /// * If the model has no tensor products or no control points
    pub fn new(model: &'a ModelData<T>) -> MfaResult<Self> {
        let tmesh = &model.tmesh;
        let ntensors = tmesh.tensor_prods.len();
        if ntensors == 0 || tmesh.tensor_prods[0].ctrl_pts.nrows() == 0 {
            return Err(MfaError::NotEncoded);
        }
        let dom_dim = model.dom_dim;

        let mut vis = Vec::with_capacity(ntensors);
        let mut first_anchor = Vec::with_capacity(ntensors);
        let mut offsets = Vec::with_capacity(ntensors);
        for (t, tensor) in tmesh.tensor_prods.iter().enumerate() {
            let mut tv = Vec::with_capacity(dom_dim);
            let mut tf = Vec::with_capacity(dom_dim);
            let mut to = Vec::with_capacity(dom_dim);
            for k in 0..dom_dim {
                let v = tmesh.level_knots(k, tensor.level);
                let min_rank = v.rank_below(tensor.knot_mins[k]);
                tf.push(tmesh.first_anchor_rank(k, min_rank));
                to.push(tmesh.basis_offset(k, min_rank).ok_or(MfaError::LevelMismatch {
                    dim: k,
                    tensor: t,
                    span: tensor.knot_mins[k],
                    level: tensor.level,
                })?);
                tv.push(v);
            }
            vis.push(tv);
            first_anchor.push(tf);
            offsets.push(to);
        }

        let mut order: Vec<usize> = (0..ntensors).collect();
        order.sort_by(|&a, &b| {
            let (la, lb) = (tmesh.tensor_prods[a].level, tmesh.tensor_prods[b].level);
            lb.cmp(&la).then(b.cmp(&a))
        });

        let q: Vec<usize> = model.p.iter().map(|p| p + 1).collect();
        let mut ds = strides_of(&q);
        let tot_iters: usize = q.iter().product();
        ds.push(tot_iters);
        let ct = index_table(&q);
        let cs = strides_of(&tmesh.tensor_prods[0].nctrl_pts);
        let jumps = (0..tot_iters)
            .map(|m| index_of(&ct[m * dom_dim..(m + 1) * dom_dim], &cs))
            .collect();

        Ok(Self {
            model,
            vis,
            first_anchor,
            offsets,
            order,
            q,
            ds,
            ct,
            tot_iters,
            cs,
            jumps,
        })
    }

    fn check_point(&self, param: &[T], out: &[T]) -> MfaResult<()> {
        if param.len() != self.model.dom_dim || out.len() < self.model.pt_dim() {
            return Err(MfaError::DimensionMismatch(format!(
                "{} parameters and {} outputs for a model of {} dimensions and {} coordinates",
                param.len(),
                out.len(),
                self.model.dom_dim,
                self.model.pt_dim()
            )));
        }
        Ok(())
    }

    /// Visible span rank of `u` along `dim` in tensor product `t` and the index of the first
    /// control point with a nonzero basis function there
    fn support_start(&self, dim: usize, u: T, t: usize) -> MfaResult<(KnotIdx, usize, usize)> {
        let p = self.model.p[dim];
        let span = self.model.find_span_tensor(dim, u, t)?;
        let tensor = self.model.tmesh.tensor(t)?;
        let outside = || MfaError::ParamOutsideTensor {
            dim,
            tensor: t,
            value: to_f64(u),
            min: to_f64(self.model.tmesh.all_knots[dim][tensor.knot_mins[dim]]),
            max: to_f64(self.model.tmesh.all_knots[dim][tensor.knot_maxs[dim]]),
        };
        let r = self.vis[t][dim].rank_of(span).ok_or_else(outside)?;
        let j0 = r
            .checked_sub(p)
            .and_then(|f| f.checked_sub(self.offsets[t][dim]))
            .ok_or_else(outside)?;
        if j0 + p >= tensor.nctrl_pts[dim] {
            return Err(outside());
        }
        Ok((span, r, j0))
    }

    /// Value, or partial derivative, of tensor product `t` at `param`.
    ///
    /// `derivs` is empty for values, or holds one derivative order per dimension. With any
    /// nonzero order the rational denominator is taken as one, which is exact for
    /// unweighted models only.
    ///
    /// # Errors
    /// * If `param` lies outside the tensor product or `derivs` has the wrong length
    pub fn vol_pt(
        &self,
        param: &[T],
        t: usize,
        derivs: &[usize],
        di: &mut DecodeInfo<T>,
        out: &mut [T],
    ) -> MfaResult<()> {
        self.check_point(param, out)?;
        let model = self.model;
        let dom_dim = model.dom_dim;
        if !derivs.is_empty() && derivs.len() != dom_dim {
            return Err(MfaError::DimensionMismatch(format!(
                "{} derivative orders for {dom_dim} dimensions",
                derivs.len()
            )));
        }
        let tensor = model.tmesh.tensor(t)?;

        for k in 0..dom_dim {
            let p = model.p[k];
            let u = param[k];
            let (span, r, j0) = self.support_start(k, u, t)?;
            di.start[k] = j0;
            let d = derivs.get(k).copied().unwrap_or(0);
            if d == 0 {
                basis_funs_level(
                    &model.tmesh.all_knots[k],
                    &model.tmesh.all_knot_levels[k],
                    tensor.level,
                    p,
                    span,
                    u,
                    &mut di.basis[k],
                    &mut di.scratch,
                )
                .ok_or(MfaError::LevelMismatch {
                    dim: k,
                    tensor: t,
                    span,
                    level: tensor.level,
                })?;
            } else if d > p {
                log::warn!("dimension {k}: derivative order {d} exceeds degree {p}; the result is zero");
                di.basis[k].iter_mut().for_each(|b| *b = T::zero());
            } else {
                der_basis_funs(&self.vis[t][k].values, p, r, u, d, di.ders[k].view_mut(), &mut di.scratch);
                for j in 0..=p {
                    di.basis[k][j] = di.ders[k][[d, j]];
                }
            }
        }

        let rational = derivs.iter().all(|&d| d == 0);
        self.accumulate(t, di, out, rational);
        Ok(())
    }

    /// Value of tensor product 0 at input point `ijk` of the point set the model was encoded
    /// from, reusing the cached basis matrices.
    ///
    /// # Errors
    /// * If the model holds no basis matrices matching tensor product 0
    pub fn vol_pt_saved_basis(
        &self,
        ijk: &[usize],
        param: &[T],
        di: &mut DecodeInfo<T>,
        out: &mut [T],
    ) -> MfaResult<()> {
        self.check_point(param, out)?;
        let model = self.model;
        if !self.has_saved_basis(None) {
            return Err(MfaError::NotEncoded);
        }
        for k in 0..model.dom_dim {
            let p = model.p[k];
            let (_, _, j0) = self.support_start(k, param[k], 0)?;
            let row = model.basis[k].row(ijk[k]);
            di.start[k] = j0;
            for j in 0..=p {
                di.basis[k][j] = row[j0 + j];
            }
        }
        self.accumulate(0, di, out, true);
        Ok(())
    }

    /// True if the cached basis matrices fit tensor product 0 and, if given, were evaluated
    /// at exactly the grid parameters `params`
    fn has_saved_basis(&self, params: Option<&Param<T>>) -> bool {
        let model = self.model;
        let nctrl = &model.tmesh.tensor_prods[0].nctrl_pts;
        model.basis.len() == model.dom_dim
            && model.basis_params.len() == model.dom_dim
            && (0..model.dom_dim).all(|k| {
                model.basis[k].ncols() == nctrl[k]
                    && model.basis[k].nrows() == model.basis_params[k].len()
                    && params.map_or(true, |ps| ps.grid(k) == Some(&model.basis_params[k][..]))
            })
    }

    /// Sum the support box of tensor product `t` described by `di.start` and `di.basis`
    fn accumulate(&self, t: usize, di: &mut DecodeInfo<T>, out: &mut [T], rational: bool) {
        let tensor = &self.model.tmesh.tensor_prods[t];
        let dom_dim = self.model.dom_dim;
        let pt_dim = self.model.pt_dim();
        let last = pt_dim - 1;
        for k in 0..dom_dim {
            di.temp[k].iter_mut().for_each(|x| *x = T::zero());
            di.denom[k] = T::zero();
        }

        let mut it = VolIterator::new_sub(&self.q, &di.start, &tensor.nctrl_pts);
        while !it.done() {
            let i = it.full_idx();
            let b = di.basis[0][it.idx_dim(0)];
            let w = tensor.weights[i];
            let w = if is_not_a_weight(w) { T::one() } else { w };
            let temp = &mut di.temp[0];
            for c in 0..last {
                temp[c] = temp[c] + b * tensor.ctrl_pts[[i, c]];
            }
            temp[last] = temp[last] + b * w * tensor.ctrl_pts[[i, last]];
            di.denom[0] = di.denom[0] + b * w;

            it.incr_iter();
            for k in 0..dom_dim - 1 {
                if it.done_dim(k) {
                    let bk = di.basis[k + 1][it.prev_idx_dim(k + 1)];
                    let (lo, hi) = di.temp.split_at_mut(k + 1);
                    for c in 0..pt_dim {
                        hi[0][c] = hi[0][c] + bk * lo[k][c];
                        lo[k][c] = T::zero();
                    }
                    di.denom[k + 1] = di.denom[k + 1] + bk * di.denom[k];
                    di.denom[k] = T::zero();
                }
            }
        }

        let top = dom_dim - 1;
        out[..pt_dim].copy_from_slice(&di.temp[top]);
        if rational {
            out[last] = out[last] / di.denom[top];
        }
    }

    /// Value at `param` blended over every tensor product of the T-mesh.
    ///
    /// Tensor products are visited finest first. Each contributes the control points whose
    /// anchors support `param`, except sentinel-weight points and anchors already counted
    /// by an earlier tensor product. Domain coordinates are normalized by the total basis
    /// value, the range coordinate by the total weighted basis value.
    pub fn vol_pt_tmesh(&self, param: &[T], di: &mut DecodeInfo<T>, out: &mut [T]) -> MfaResult<()> {
        self.check_point(param, out)?;
        let model = self.model;
        let tmesh = &model.tmesh;
        let dom_dim = model.dom_dim;
        let pt_dim = model.pt_dim();
        let last = pt_dim - 1;

        di.claimed.clear();
        let acc = &mut di.temp[0];
        acc.iter_mut().for_each(|x| *x = T::zero());
        let (mut sum_b, mut sum_bw) = (T::zero(), T::zero());

        'tensors: for &t in &self.order {
            let tensor = &tmesh.tensor_prods[t];
            for k in 0..dom_dim {
                let (lo, hi) = tmesh.anchor_ranks(k, &self.vis[t][k], param[k])?;
                let first = self.first_anchor[t][k];
                let (lo, hi) = (lo.max(first), hi.min(first + tensor.nctrl_pts[k] - 1));
                if lo > hi {
                    continue 'tensors;
                }
                di.start[k] = lo - first;
                di.count[k] = hi + 1 - lo;
            }

            let mut it = VolIterator::new_sub(&di.count, &di.start, &tensor.nctrl_pts);
            while !it.done() {
                let i = it.full_idx();
                let w = tensor.weights[i];
                if !is_not_a_weight(w) {
                    for k in 0..dom_dim {
                        di.anchor[k] = self.vis[t][k].global[self.first_anchor[t][k] + di.start[k] + it.idx_dim(k)];
                    }
                    if !di.claimed.contains(&di.anchor[..]) {
                        di.claimed.insert(di.anchor.clone());
                        let mut b = T::one();
                        for k in 0..dom_dim {
                            let p = model.p[k];
                            let r = self.offsets[t][k] + di.start[k] + it.idx_dim(k);
                            let loc = &self.vis[t][k].values[r..r + p + 2];
                            b = b * one_basis_fun_local(loc, p, param[k], &mut di.scratch);
                        }
                        if b != T::zero() {
                            let acc = &mut di.temp[0];
                            for c in 0..last {
                                acc[c] = acc[c] + b * tensor.ctrl_pts[[i, c]];
                            }
                            acc[last] = acc[last] + b * w * tensor.ctrl_pts[[i, last]];
                            sum_b = sum_b + b;
                            sum_bw = sum_bw + b * w;
                        }
                    }
                }
                it.incr_iter();
            }
        }

        if sum_b == T::zero() || sum_bw == T::zero() {
            log::warn!("no basis function of the T-mesh supports {param:?}");
            out[..pt_dim].iter_mut().for_each(|x| *x = T::zero());
            return Ok(());
        }
        let acc = &di.temp[0];
        for c in 0..last {
            out[c] = acc[c] / sum_b;
        }
        out[last] = acc[last] / sum_bw;
        Ok(())
    }

    /// Value at `param` through the single tensor product or, when there are several,
    /// the T-mesh blend
    pub fn decode_pt(&self, param: &[T], di: &mut DecodeInfo<T>, out: &mut [T]) -> MfaResult<()> {
        if self.model.tmesh.tensor_prods.len() == 1 {
            self.vol_pt(param, 0, &[], di, out)
        } else {
            self.vol_pt_tmesh(param, di, out)
        }
    }

    /// Decode every point of `ps` into its columns `[min_dim, max_dim]`.
    ///
    /// With nonzero `derivs`, tensor product 0 is differentiated. Otherwise the cached basis
    /// matrices are used if `saved_basis` is set and were evaluated at the grid parameters of `ps`; failing
    /// that, points go through [`Decoder::decode_pt`].
    ///
    /// # Errors
    /// * If the column range does not hold exactly the model's coordinates
    /// * If any point fails to decode
    pub fn decode_point_set(
        &self,
        ps: &mut PointSet<T>,
        min_dim: usize,
        max_dim: usize,
        derivs: &[usize],
        saved_basis: bool,
    ) -> MfaResult<()> {
        let pt_dim = self.model.pt_dim();
        if max_dim < min_dim || max_dim - min_dim + 1 != pt_dim || max_dim >= ps.pt_dim() {
            return Err(MfaError::DimensionMismatch(format!(
                "columns [{min_dim}, {max_dim}] of {} cannot hold {pt_dim} model coordinates",
                ps.pt_dim()
            )));
        }
        if ps.dom_dim() != self.model.dom_dim {
            return Err(MfaError::DimensionMismatch(format!(
                "point set has {} domain dimensions, model has {}",
                ps.dom_dim(),
                self.model.dom_dim
            )));
        }

        let use_derivs = derivs.iter().any(|&d| d > 0);
        let use_saved =
            !use_derivs && saved_basis && ps.is_structured() && self.has_saved_basis(Some(&ps.params));
        if saved_basis && !use_saved && !use_derivs {
            log::debug!("cached basis does not fit the point set; decoding from knots");
        }

        let src: &PointSet<T> = ps;
        let rows = map_units(
            src.npts(),
            || (DecodeInfo::new(self.model), vec![T::zero(); pt_dim]),
            |(di, out), i| -> MfaResult<Vec<T>> {
                let mut param = std::mem::take(&mut di.param);
                let mut ijk = std::mem::take(&mut di.ijk);
                src.pt_params(i, &mut param);
                let res = if use_derivs {
                    self.vol_pt(&param, 0, derivs, di, out)
                } else if use_saved {
                    src.ijk(i, &mut ijk);
                    self.vol_pt_saved_basis(&ijk, &param, di, out)
                } else {
                    self.decode_pt(&param, di, out)
                };
                di.param = param;
                di.ijk = ijk;
                res.map(|()| out.clone())
            },
        );

        for (i, row) in rows.into_iter().enumerate() {
            let row = row?;
            for c in 0..pt_dim {
                ps.domain[[i, min_dim + c]] = row[c];
            }
        }
        Ok(())
    }

    /// Decode tensor product 0 on the regular grid of `ndom_pts` parameters spanning
    /// `[min_params, max_params]`, one row per grid point with the first dimension fastest.
    ///
    /// Basis functions are computed once per grid line and reused for every point.
    pub fn decode_grid(&self, min_params: &[T], max_params: &[T], ndom_pts: &[usize]) -> MfaResult<Array2<T>> {
        let model = self.model;
        let dom_dim = model.dom_dim;
        let pt_dim = model.pt_dim();
        if min_params.len() != dom_dim || max_params.len() != dom_dim || ndom_pts.len() != dom_dim {
            return Err(MfaError::DimensionMismatch(format!(
                "grid bounds and extents must have {dom_dim} entries"
            )));
        }

        // per dimension: start of the support box and basis values of every grid line
        let mut starts: Vec<Vec<usize>> = Vec::with_capacity(dom_dim);
        let mut values: Vec<Array2<T>> = Vec::with_capacity(dom_dim);
        let mut di = DecodeInfo::new(model);
        for k in 0..dom_dim {
            let p = model.p[k];
            let tensor = model.tmesh.tensor(0)?;
            let params = linspace(min_params[k], max_params[k], ndom_pts[k]);
            let mut s = Vec::with_capacity(params.len());
            let mut v = Array2::zeros((params.len(), p + 1));
            for (i, &u) in params.iter().enumerate() {
                let (span, _, j0) = self.support_start(k, u, 0)?;
                basis_funs_level(
                    &model.tmesh.all_knots[k],
                    &model.tmesh.all_knot_levels[k],
                    tensor.level,
                    p,
                    span,
                    u,
                    &mut di.basis[k],
                    &mut di.scratch,
                )
                .ok_or(MfaError::LevelMismatch {
                    dim: k,
                    tensor: 0,
                    span,
                    level: tensor.level,
                })?;
                s.push(j0);
                for j in 0..=p {
                    v[[i, j]] = di.basis[k][j];
                }
            }
            starts.push(s);
            values.push(v);
        }

        let npts: usize = ndom_pts.iter().product();
        let rows = map_units(
            npts,
            || (DecodeInfo::new(model), vec![T::zero(); pt_dim]),
            |(di, out), i| {
                VolIterator::idx_ijk(i, ndom_pts, &mut di.ijk);
                for k in 0..dom_dim {
                    let g = di.ijk[k];
                    di.start[k] = starts[k][g];
                    for j in 0..=model.p[k] {
                        di.basis[k][j] = values[k][[g, j]];
                    }
                }
                self.accumulate(0, di, out, true);
                out.clone()
            },
        );

        let mut result = Array2::zeros((npts, pt_dim));
        for (i, row) in rows.into_iter().enumerate() {
            for c in 0..pt_dim {
                result[[i, c]] = row[c];
            }
        }
        Ok(result)
    }
}
