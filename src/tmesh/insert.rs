//! Knot insertion into tensor products (Boehm's algorithm, P&T A5.1).
//!
//! Inserting one knot along dimension `d` refines every curve of control points running
//! along `d`: `p` control points are replaced by `p + 1` convex blends of their neighbors and
//! the rest shift by one, leaving the represented function unchanged. A volume insertion
//! applies the curve insertion one dimension at a time, each pass reading the previous
//! pass's control points and producing a new block.
//!
//! The range coordinate (last column) is blended in homogeneous form, so rational models are
//! preserved exactly as well.
use super::{is_not_a_weight, mark_duplicates_with, not_a_weight, KnotIdx, Tmesh};
use crate::error::{MfaError, MfaResult};
use crate::parallel::map_units;
use crate::volume::curve_origin;
use crate::{basis, to_f64, Real};
use ndarray::{Array1, Array2};

/// Blend coefficients for inserting `u` into knot span `span` of `knots`
fn insertion_alphas<T: Real>(knots: &[T], p: usize, span: usize, u: T) -> Vec<T> {
    // alphas[r] belongs to basis function span - p + 1 + r
    (0..p)
        .map(|r| {
            let i = span - p + 1 + r;
            (u - knots[i]) / (knots[i + p] - knots[i])
        })
        .collect()
}

/// Refined curve: `n + 1` control points and weights from `n`.
///
/// `offset` is the basis index of the curve's first control point in the knot sequence the
/// alphas were computed on.
fn curve_knot_ins<T: Real>(
    pts: &Array2<T>,
    weights: &[T],
    p: usize,
    span: usize,
    offset: usize,
    alphas: &[T],
) -> (Array2<T>, Vec<T>) {
    let (n, pt_dim) = pts.dim();
    let last = pt_dim - 1;
    let mut new_pts = Array2::<T>::zeros((n + 1, pt_dim));
    let mut new_weights = vec![T::one(); n + 1];

    for jn in 0..=n {
        let i = offset + jn;
        if i + p <= span {
            new_pts.row_mut(jn).assign(&pts.row(jn));
            new_weights[jn] = weights[jn];
        } else if i > span {
            new_pts.row_mut(jn).assign(&pts.row(jn - 1));
            new_weights[jn] = weights[jn - 1];
        } else {
            let a = alphas[i + p - 1 - span];
            let b = T::one() - a;
            let (w0, w1) = (weights[jn - 1], weights[jn]);
            for c in 0..last {
                new_pts[[jn, c]] = a * pts[[jn, c]] + b * pts[[jn - 1, c]];
            }
            if is_not_a_weight(w0) || is_not_a_weight(w1) {
                new_pts[[jn, last]] = a * pts[[jn, last]] + b * pts[[jn - 1, last]];
                new_weights[jn] = not_a_weight();
            } else {
                let w = a * w1 + b * w0;
                new_pts[[jn, last]] = (a * w1 * pts[[jn, last]] + b * w0 * pts[[jn - 1, last]]) / w;
                new_weights[jn] = w;
            }
        }
    }
    (new_pts, new_weights)
}

impl<T: Real> Tmesh<T> {
    /// Insert a new knot value into every dimension of tensor product `t` (volume insertion).
    ///
    /// `param_idxs[k]` is the index of the first input parameter of dimension `k` at or above
    /// `param[k]`. Returns the global index of the new knot in each dimension.
    ///
    /// # Errors
    /// * If any `param[k]` is already a knot or lies outside the tensor product
    /// * If the insertion would change which knots are visible to the tensor product
    pub fn insert_new_knot(
        &mut self,
        param: &[T],
        level: usize,
        t: usize,
        param_idxs: &[usize],
    ) -> MfaResult<Vec<KnotIdx>> {
        if param.len() != self.dom_dim || param_idxs.len() != self.dom_dim {
            return Err(MfaError::DimensionMismatch(format!(
                "knot insertion at {} parameters for {} dimensions",
                param.len(),
                self.dom_dim
            )));
        }
        // validate every dimension before mutating any
        for k in 0..self.dom_dim {
            self.check_new_knot(k, param[k], t)?;
        }
        (0..self.dom_dim)
            .map(|k| self.insert_new_knot_in_dim(k, param[k], level, t, param_idxs[k]))
            .collect()
    }

    /// Insert knots already present in the global sequences (at `inserted`) into tensor
    /// product `t`, updating only its control points and weights.
    pub fn insert_existing_knot(&mut self, inserted: &[KnotIdx], t: usize) -> MfaResult<()> {
        if inserted.len() != self.dom_dim {
            return Err(MfaError::DimensionMismatch(format!(
                "knot insertion at {} indices for {} dimensions",
                inserted.len(),
                self.dom_dim
            )));
        }
        for k in 0..self.dom_dim {
            self.insert_existing_knot_in_dim(k, inserted[k], t)?;
        }
        Ok(())
    }

    fn check_new_knot(&self, dim: usize, u: T, t: usize) -> MfaResult<()> {
        let tensor = self.tensor(t)?;
        let knots = &self.all_knots[dim];
        if knots.iter().any(|&k| k == u) {
            return Err(MfaError::DuplicateKnot {
                dim,
                value: to_f64(u),
            });
        }
        let (lo, hi) = (knots[tensor.knot_mins[dim]], knots[tensor.knot_maxs[dim]]);
        if !(u > lo && u < hi) {
            return Err(MfaError::ParamOutsideTensor {
                dim,
                tensor: t,
                value: to_f64(u),
                min: to_f64(lo),
                max: to_f64(hi),
            });
        }
        Ok(())
    }

    /// Insert a new knot value `u` at `level` into dimension `dim` of tensor product `t`.
    ///
    /// The global knot sequence grows by one; knot ranges of every tensor product at or
    /// beyond the insertion point shift up, so the range of `t` grows by one.
    pub fn insert_new_knot_in_dim(
        &mut self,
        dim: usize,
        u: T,
        level: usize,
        t: usize,
        param_idx: usize,
    ) -> MfaResult<KnotIdx> {
        self.check_new_knot(dim, u, t)?;
        let (ctrl_pts, weights, new_level) = self.refine_tensor_in_dim(dim, t, u, level, None)?;

        let idx = self.all_knots[dim].partition_point(|&k| k < u);
        self.all_knots[dim].insert(idx, u);
        self.all_knot_levels[dim].insert(idx, level);
        self.all_knot_param_idxs[dim].insert(idx, param_idx);
        for tensor in self.tensor_prods.iter_mut() {
            if tensor.knot_mins[dim] >= idx {
                tensor.knot_mins[dim] += 1;
            }
            if tensor.knot_maxs[dim] >= idx {
                tensor.knot_maxs[dim] += 1;
            }
        }

        self.commit_refinement(dim, t, ctrl_pts, weights, new_level);
        Ok(idx)
    }

    /// Insert the existing global knot `inserted_idx` of dimension `dim` into tensor product
    /// `t`, whose range must strictly contain it.
    pub fn insert_existing_knot_in_dim(
        &mut self,
        dim: usize,
        inserted_idx: KnotIdx,
        t: usize,
    ) -> MfaResult<()> {
        let tensor = self.tensor(t)?;
        let nknots = self.nknots(dim);
        if !(inserted_idx > tensor.knot_mins[dim] && inserted_idx < tensor.knot_maxs[dim]) {
            return Err(MfaError::InvalidKnotRange {
                dim,
                min: tensor.knot_mins[dim],
                max: tensor.knot_maxs[dim],
                nknots,
            });
        }
        let u = self.all_knots[dim][inserted_idx];
        let level = self.all_knot_levels[dim][inserted_idx];
        let (ctrl_pts, weights, new_level) =
            self.refine_tensor_in_dim(dim, t, u, level, Some(inserted_idx))?;
        self.commit_refinement(dim, t, ctrl_pts, weights, new_level);
        Ok(())
    }

    /// Refined control points of tensor product `t` along `dim` for a knot `u` of `level`.
    ///
    /// The knot sequence before insertion is the one visible at the raised level, leaving out
    /// `skip` (the already-inserted knot, if any). It must reproduce the tensor product's
    /// current control-point count.
    fn refine_tensor_in_dim(
        &self,
        dim: usize,
        t: usize,
        u: T,
        level: usize,
        skip: Option<KnotIdx>,
    ) -> MfaResult<(Array2<T>, Array1<T>, usize)> {
        let tensor = self.tensor(t)?;
        let p = self.degree[dim];
        let new_level = tensor.level.max(level);
        let vis = self.level_knots_excluding(dim, new_level, skip);
        let mismatch = |span| MfaError::LevelMismatch {
            dim,
            tensor: t,
            span,
            level: new_level,
        };

        let min_rank = vis
            .rank_of(tensor.knot_mins[dim])
            .ok_or_else(|| mismatch(tensor.knot_mins[dim]))?;
        let max_rank = vis
            .rank_of(tensor.knot_maxs[dim])
            .ok_or_else(|| mismatch(tensor.knot_maxs[dim]))?;
        let n = tensor.nctrl_pts[dim];
        if self.nctrl_for_ranks(dim, min_rank, max_rank, vis.global.len()) != n {
            return Err(mismatch(tensor.knot_mins[dim]));
        }

        let span = basis::find_span(&vis.values, p, u).ok_or_else(|| mismatch(tensor.knot_mins[dim]))?;
        if vis.values[span] == u {
            return Err(MfaError::DuplicateKnot {
                dim,
                value: to_f64(u),
            });
        }
        let offset = self
            .basis_offset(dim, min_rank)
            .ok_or_else(|| mismatch(tensor.knot_mins[dim]))?;
        // the p + 1 affected functions must all belong to this tensor product
        if span < offset + p || span >= offset + n {
            return Err(MfaError::ParamOutsideTensor {
                dim,
                tensor: t,
                value: to_f64(u),
                min: to_f64(self.all_knots[dim][tensor.knot_mins[dim]]),
                max: to_f64(self.all_knots[dim][tensor.knot_maxs[dim]]),
            });
        }
        let alphas = insertion_alphas(&vis.values, p, span, u);

        // one unit per curve along dim
        let mut new_nctrl = tensor.nctrl_pts.clone();
        new_nctrl[dim] += 1;
        let cs: usize = tensor.nctrl_pts[..dim].iter().product();
        let ncurves = tensor.nctrl_total() / n;
        let pt_dim = tensor.ctrl_pts.ncols();

        let curves = map_units(
            ncurves,
            || (),
            |_, j| {
                let co = curve_origin(j, cs, n);
                let pts = Array2::from_shape_fn((n, pt_dim), |(i, c)| tensor.ctrl_pts[[co + i * cs, c]]);
                let w: Vec<T> = (0..n).map(|i| tensor.weights[co + i * cs]).collect();
                curve_knot_ins(&pts, &w, p, span, offset, &alphas)
            },
        );

        let ntot: usize = new_nctrl.iter().product();
        let mut ctrl_pts = Array2::<T>::zeros((ntot, pt_dim));
        let mut weights = Array1::<T>::ones(ntot);
        for (j, (pts, w)) in curves.into_iter().enumerate() {
            let to = curve_origin(j, cs, n + 1);
            for i in 0..=n {
                ctrl_pts.row_mut(to + i * cs).assign(&pts.row(i));
                weights[to + i * cs] = w[i];
            }
        }
        Ok((ctrl_pts, weights, new_level))
    }

    fn commit_refinement(
        &mut self,
        dim: usize,
        t: usize,
        ctrl_pts: Array2<T>,
        weights: Array1<T>,
        level: usize,
    ) {
        let nknots: Vec<usize> = (0..self.dom_dim).map(|k| self.nknots(k)).collect();
        let degree = self.degree.clone();
        let tensor = &mut self.tensor_prods[t];
        tensor.ctrl_pts = ctrl_pts;
        tensor.weights = weights;
        tensor.nctrl_pts[dim] += 1;
        tensor.level = level;
        mark_duplicates_with(&degree, &nknots, tensor);
    }
}
