//! T-mesh: tensor products of control points over shared global knot sequences.
//!
//! Every domain dimension has one global knot sequence. Each knot records the refinement
//! level that introduced it; a tensor product of level `L` sees only knots of level `<= L`
//! (its *visible* knots). Tensor products live in an arena and refer to the knot sequences
//! through an inclusive index range per dimension.
//!
//! Control points are anchored on visible knot lines (odd degree) or visible knot spans
//! (even degree, identified by the span's left knot). The local knot vector of a control
//! point is the `p + 2` visible knots centered on its anchor.
use crate::error::{MfaError, MfaResult};
use crate::volume::VolIterator;
use crate::{basis, to_f64, Real};
use ndarray::{Array1, Array2};
use std::fmt;

pub mod insert;

/// Index into a global knot sequence
pub type KnotIdx = usize;

/// Sentinel weight of a control point that duplicates one owned by an enclosing tensor product
#[inline]
pub fn not_a_weight<T: Real>() -> T {
    -T::one()
}

/// True for the sentinel weight; valid weights are strictly positive
#[inline]
pub fn is_not_a_weight<T: Real>(w: T) -> bool {
    w < T::zero()
}

/// Number of anchor positions trimmed at an end of the knot sequence
#[inline]
fn half_support(p: usize) -> usize {
    (p + 1) / 2
}

/// Knots of one dimension visible at some level, with their global indices
#[derive(Clone, Debug)]
pub struct LevelKnots<T: Real> {
    pub values: Vec<T>,
    pub global: Vec<KnotIdx>,
}

impl<T: Real> LevelKnots<T> {
    /// Position of global knot `idx` among the visible knots
    pub fn rank_of(&self, idx: KnotIdx) -> Option<usize> {
        self.global.binary_search(&idx).ok()
    }

    /// Number of visible knots with global index below `idx`
    pub fn rank_below(&self, idx: KnotIdx) -> usize {
        self.global.partition_point(|&g| g < idx)
    }
}

#[derive(Clone, Debug)]
pub struct TensorProduct<T: Real> {
    /// First global knot index in each dimension
    pub knot_mins: Vec<KnotIdx>,
    /// Last global knot index in each dimension, inclusive
    pub knot_maxs: Vec<KnotIdx>,
    /// Control points per dimension
    pub nctrl_pts: Vec<usize>,
    /// One row per control point, first dimension varying fastest
    pub ctrl_pts: Array2<T>,
    /// One weight per control point
    pub weights: Array1<T>,
    /// Refinement level
    pub level: usize,
}

impl<T: Real> TensorProduct<T> {
    pub fn nctrl_total(&self) -> usize {
        self.nctrl_pts.iter().product()
    }

    /// True if every valid weight is one
    pub fn is_unweighted(&self) -> bool {
        self.weights
            .iter()
            .all(|&w| w == T::one() || is_not_a_weight(w))
    }
}

#[derive(Clone, Debug)]
pub struct Tmesh<T: Real> {
    pub dom_dim: usize,
    /// Degree per dimension
    pub degree: Vec<usize>,
    /// Coordinates per control point
    pub pt_dim: usize,
    /// Global knot sequences
    pub all_knots: Vec<Vec<T>>,
    /// Refinement level of every knot
    pub all_knot_levels: Vec<Vec<usize>>,
    /// Index of the first input parameter at or above every knot
    pub all_knot_param_idxs: Vec<Vec<usize>>,
    pub tensor_prods: Vec<TensorProduct<T>>,
}

impl<T: Real> Tmesh<T> {
    pub fn new(degree: &[usize], pt_dim: usize) -> Self {
        let dom_dim = degree.len();
        Self {
            dom_dim,
            degree: degree.to_vec(),
            pt_dim,
            all_knots: vec![Vec::new(); dom_dim],
            all_knot_levels: vec![Vec::new(); dom_dim],
            all_knot_param_idxs: vec![Vec::new(); dom_dim],
            tensor_prods: Vec::new(),
        }
    }

    /// Allocate level-0 knot sequences sized for `nctrl_pts` and drop all tensor products
    pub fn init_knots(&mut self, nctrl_pts: &[usize]) {
        for k in 0..self.dom_dim {
            let nknots = nctrl_pts[k] + self.degree[k] + 1;
            self.all_knots[k] = vec![T::zero(); nknots];
            self.all_knot_levels[k] = vec![0; nknots];
            self.all_knot_param_idxs[k] = vec![0; nknots];
        }
        self.tensor_prods.clear();
    }

    pub fn nknots(&self, dim: usize) -> usize {
        self.all_knots[dim].len()
    }

    /// Control points a single tensor product over all knots of `dim` would have
    pub fn nctrl_global(&self, dim: usize) -> usize {
        self.nknots(dim) - self.degree[dim] - 1
    }

    pub fn max_level(&self) -> usize {
        self.all_knot_levels
            .iter()
            .flatten()
            .copied()
            .max()
            .unwrap_or(0)
    }

    pub fn tensor(&self, idx: usize) -> MfaResult<&TensorProduct<T>> {
        self.tensor_prods.get(idx).ok_or(MfaError::NoSuchTensor(idx))
    }

    pub fn tensor_mut(&mut self, idx: usize) -> MfaResult<&mut TensorProduct<T>> {
        self.tensor_prods
            .get_mut(idx)
            .ok_or(MfaError::NoSuchTensor(idx))
    }

    #[inline]
    pub fn is_visible(&self, dim: usize, idx: KnotIdx, level: usize) -> bool {
        self.all_knot_levels[dim][idx] <= level
    }

    /// Knots of `dim` visible at `level`
    pub fn level_knots(&self, dim: usize, level: usize) -> LevelKnots<T> {
        self.level_knots_excluding(dim, level, None)
    }

    /// Knots of `dim` visible at `level`, optionally leaving one global index out
    pub fn level_knots_excluding(
        &self,
        dim: usize,
        level: usize,
        skip: Option<KnotIdx>,
    ) -> LevelKnots<T> {
        let mut values = Vec::with_capacity(self.nknots(dim));
        let mut global = Vec::with_capacity(self.nknots(dim));
        for (i, (&k, &l)) in self.all_knots[dim]
            .iter()
            .zip(&self.all_knot_levels[dim])
            .enumerate()
        {
            if l <= level && Some(i) != skip {
                values.push(k);
                global.push(i);
            }
        }
        LevelKnots { values, global }
    }

    /// Control points along `dim` of a tensor product spanning visible ranks
    /// `[min_rank, max_rank]` of a sequence with `nvisible` knots
    pub fn nctrl_for_ranks(&self, dim: usize, min_rank: usize, max_rank: usize, nvisible: usize) -> usize {
        let p = self.degree[dim];
        let lines = max_rank + 1 - min_rank;
        let mut n = if p % 2 == 1 { lines } else { lines - 1 };
        if min_rank == 0 {
            n = n.saturating_sub(half_support(p));
        }
        if max_rank + 1 == nvisible {
            n = n.saturating_sub(half_support(p));
        }
        n
    }

    /// Visible rank of the first anchor of a tensor product whose range starts at `min_rank`
    #[inline]
    pub fn first_anchor_rank(&self, dim: usize, min_rank: usize) -> usize {
        if min_rank == 0 {
            half_support(self.degree[dim])
        } else {
            min_rank
        }
    }

    /// Visible rank of the first knot of the local knot vector of control point 0.
    ///
    /// Control point `j` along `dim` is then basis function `offset + j` of the tensor
    /// product's visible knot sequence.
    pub fn basis_offset(&self, dim: usize, min_rank: usize) -> Option<usize> {
        self.first_anchor_rank(dim, min_rank)
            .checked_sub(half_support(self.degree[dim]))
    }

    /// Append a tensor product over `[knot_mins, knot_maxs]` at `level` and return its index.
    ///
    /// Control points are zeroed and weights set to one. For odd degree, control points on a
    /// range boundary that is not a global boundary duplicate anchors of the enclosing tensor
    /// product and get the sentinel weight.
    ///
    /// # Errors
    /// * If ranges are empty, out of bounds, or end on knots finer than `level`
    /// * If a control point's local knot vector would run off the knot sequence
    pub fn append_tensor(
        &mut self,
        knot_mins: &[KnotIdx],
        knot_maxs: &[KnotIdx],
        level: usize,
    ) -> MfaResult<usize> {
        if knot_mins.len() != self.dom_dim || knot_maxs.len() != self.dom_dim {
            return Err(MfaError::DimensionMismatch(format!(
                "tensor range has {} / {} entries for {} dimensions",
                knot_mins.len(),
                knot_maxs.len(),
                self.dom_dim
            )));
        }

        let mut nctrl_pts = vec![0; self.dom_dim];
        for k in 0..self.dom_dim {
            let (min, max) = (knot_mins[k], knot_maxs[k]);
            let nknots = self.nknots(k);
            let invalid = MfaError::InvalidKnotRange {
                dim: k,
                min,
                max,
                nknots,
            };
            if min >= max || max >= nknots {
                return Err(invalid);
            }
            if !self.is_visible(k, min, level) || !self.is_visible(k, max, level) {
                return Err(invalid);
            }
            let vis = self.level_knots(k, level);
            let (Some(min_rank), Some(max_rank)) = (vis.rank_of(min), vis.rank_of(max)) else {
                return Err(invalid);
            };
            let p = self.degree[k];
            let nvis = vis.global.len();
            // local knot vectors of the boundary control points must fit
            if min_rank != 0 && min_rank < half_support(p) {
                return Err(invalid);
            }
            if max_rank + 1 != nvis && max_rank + half_support(p) >= nvis {
                return Err(invalid);
            }
            nctrl_pts[k] = self.nctrl_for_ranks(k, min_rank, max_rank, nvis);
            if nctrl_pts[k] == 0 {
                return Err(invalid);
            }
        }

        let ntot: usize = nctrl_pts.iter().product();
        let mut tensor = TensorProduct {
            knot_mins: knot_mins.to_vec(),
            knot_maxs: knot_maxs.to_vec(),
            nctrl_pts,
            ctrl_pts: Array2::zeros((ntot, self.pt_dim)),
            weights: Array1::ones(ntot),
            level,
        };
        self.mark_duplicates(&mut tensor);
        self.tensor_prods.push(tensor);
        log::debug!(
            "appended tensor product {} at level {level}: knots {:?}..={:?}",
            self.tensor_prods.len() - 1,
            knot_mins,
            knot_maxs
        );
        Ok(self.tensor_prods.len() - 1)
    }

    /// Raise tensor product `t` to `level`, resizing it for the knots that become visible.
    ///
    /// Control points are zeroed and weights reset to one (sentinels re-marked); callers
    /// refill them, usually with [`Tmesh::sync_from`].
    pub fn relevel_tensor(&mut self, t: usize, level: usize) -> MfaResult<()> {
        let tensor = self.tensor(t)?;
        let mut nctrl_pts = Vec::with_capacity(self.dom_dim);
        for k in 0..self.dom_dim {
            let (min, max) = (tensor.knot_mins[k], tensor.knot_maxs[k]);
            let vis = self.level_knots(k, level);
            let (Some(min_rank), Some(max_rank)) = (vis.rank_of(min), vis.rank_of(max)) else {
                return Err(MfaError::LevelMismatch {
                    dim: k,
                    tensor: t,
                    span: min,
                    level,
                });
            };
            nctrl_pts.push(self.nctrl_for_ranks(k, min_rank, max_rank, vis.global.len()));
        }

        let nknots: Vec<usize> = (0..self.dom_dim).map(|k| self.nknots(k)).collect();
        let degree = self.degree.clone();
        let ntot: usize = nctrl_pts.iter().product();
        let pt_dim = self.pt_dim;
        let tensor = self.tensor_mut(t)?;
        tensor.ctrl_pts = Array2::zeros((ntot, pt_dim));
        tensor.weights = Array1::ones(ntot);
        tensor.nctrl_pts = nctrl_pts;
        tensor.level = level;
        mark_duplicates_with(&degree, &nknots, tensor);
        Ok(())
    }

    /// Copy control points and weights from tensor product `src` into `dst` wherever both
    /// hold a control point with the same anchor and the same local knot vector.
    ///
    /// Sentinel control points of `dst` are left alone. Returns the number of control
    /// points copied.
    pub fn sync_from(&mut self, src: usize, dst: usize) -> MfaResult<usize> {
        let (s, d) = (self.tensor(src)?, self.tensor(dst)?);

        // per dimension: index along src of every control point index along dst
        let mut maps: Vec<Vec<Option<usize>>> = Vec::with_capacity(self.dom_dim);
        for k in 0..self.dom_dim {
            let p = self.degree[k];
            let h = half_support(p);
            let vs = self.level_knots(k, s.level);
            let vd = self.level_knots(k, d.level);
            let s_first = self.first_anchor_rank(k, vs.rank_below(s.knot_mins[k]));
            let d_first = self.first_anchor_rank(k, vd.rank_below(d.knot_mins[k]));
            let map = (0..d.nctrl_pts[k])
                .map(|j| {
                    let rd = d_first + j;
                    let anchor = *vd.global.get(rd)?;
                    let rs = vs.rank_of(anchor)?;
                    let js = rs.checked_sub(s_first)?;
                    if js >= s.nctrl_pts[k] {
                        return None;
                    }
                    let ld = vd.global.get(rd.checked_sub(h)?..rd - h + p + 2)?;
                    let ls = vs.global.get(rs.checked_sub(h)?..rs - h + p + 2)?;
                    (ld == ls).then_some(js)
                })
                .collect();
            maps.push(map);
        }

        let s_strides = crate::strides_of(&s.nctrl_pts);
        let mut copies = Vec::new();
        let mut src_ijk = vec![0; self.dom_dim];
        let mut it = VolIterator::new(&d.nctrl_pts);
        while !it.done() {
            let i = it.cur_iter();
            let matched = (0..self.dom_dim).all(|k| match maps[k][it.idx_dim(k)] {
                Some(js) => {
                    src_ijk[k] = js;
                    true
                }
                None => false,
            });
            if matched && !is_not_a_weight(d.weights[i]) {
                let si = crate::index_of(&src_ijk, &s_strides);
                if !is_not_a_weight(s.weights[si]) {
                    copies.push((i, s.ctrl_pts.row(si).to_owned(), s.weights[si]));
                }
            }
            it.incr_iter();
        }

        let ncopied = copies.len();
        let tensor = self.tensor_mut(dst)?;
        for (i, row, w) in copies {
            tensor.ctrl_pts.row_mut(i).assign(&row);
            tensor.weights[i] = w;
        }
        Ok(ncopied)
    }

    /// Set the sentinel weight on odd-degree control points lying on interior range boundaries
    pub fn mark_duplicates(&self, tensor: &mut TensorProduct<T>) {
        let nknots: Vec<usize> = (0..self.dom_dim).map(|k| self.nknots(k)).collect();
        mark_duplicates_with(&self.degree, &nknots, tensor);
    }

    /// Global knot index of the anchor of control point `ijk` of tensor product `t`
    pub fn ctrl_pt_anchor(&self, t: usize, ijk: &[usize]) -> MfaResult<Vec<KnotIdx>> {
        let tensor = self.tensor(t)?;
        (0..self.dom_dim)
            .map(|k| {
                let vis = self.level_knots(k, tensor.level);
                let min_rank = vis.rank_below(tensor.knot_mins[k]);
                let rank = self.first_anchor_rank(k, min_rank) + ijk[k];
                vis.global.get(rank).copied().ok_or(MfaError::InvalidKnotRange {
                    dim: k,
                    min: tensor.knot_mins[k],
                    max: tensor.knot_maxs[k],
                    nknots: self.nknots(k),
                })
            })
            .collect()
    }

    /// Global indices of the `p + 2` visible knots forming the local knot vector of the
    /// control point anchored at `anchor` in tensor product `t`
    pub fn knot_intersections(&self, anchor: &[KnotIdx], t: usize) -> MfaResult<Vec<Vec<KnotIdx>>> {
        let tensor = self.tensor(t)?;
        (0..self.dom_dim)
            .map(|k| {
                let p = self.degree[k];
                let vis = self.level_knots(k, tensor.level);
                let err = || MfaError::LevelMismatch {
                    dim: k,
                    tensor: t,
                    span: anchor[k],
                    level: tensor.level,
                };
                let rank = vis.rank_of(anchor[k]).ok_or_else(err)?;
                let start = rank.checked_sub(half_support(p)).ok_or_else(err)?;
                vis.global.get(start..start + p + 2).map(|s| s.to_vec()).ok_or_else(err)
            })
            .collect()
    }

    /// Global indices, per dimension, of the anchors at `level` whose local support
    /// contains `param`
    pub fn anchors(&self, param: &[T], level: usize) -> MfaResult<Vec<Vec<KnotIdx>>> {
        (0..self.dom_dim)
            .map(|k| {
                let vis = self.level_knots(k, level);
                let ranks = self.anchor_ranks(k, &vis, param[k])?;
                Ok(vis.global[ranks.0..=ranks.1].to_vec())
            })
            .collect()
    }

    /// Inclusive range of visible ranks of anchors whose support contains `u`
    pub(crate) fn anchor_ranks(&self, dim: usize, vis: &LevelKnots<T>, u: T) -> MfaResult<(usize, usize)> {
        let p = self.degree[dim];
        let span = basis::find_span(&vis.values, p, u).ok_or_else(|| MfaError::ParamOutOfRange {
            dim,
            value: to_f64(u),
            min: to_f64(vis.values.first().copied().unwrap_or_else(T::zero)),
            max: to_f64(vis.values.last().copied().unwrap_or_else(T::one)),
        })?;
        let h = half_support(p);
        let last = vis.global.len() - 1;
        let (lo, hi) = if p % 2 == 1 {
            ((span + 1).saturating_sub(h), span + h)
        } else {
            (span.saturating_sub(p / 2), span + p / 2)
        };
        Ok((lo, hi.min(last)))
    }

    /// True if `anchor` lies inside the per-dimension anchor sets
    pub fn in_anchors(anchor: &[KnotIdx], anchors: &[Vec<KnotIdx>]) -> bool {
        anchor
            .iter()
            .zip(anchors)
            .all(|(a, set)| set.binary_search(a).is_ok())
    }
}

pub(crate) fn mark_duplicates_with<T: Real>(
    degree: &[usize],
    nknots: &[usize],
    tensor: &mut TensorProduct<T>,
) {
    let dom_dim = degree.len();
    let dup_lo: Vec<bool> = (0..dom_dim)
        .map(|k| degree[k] % 2 == 1 && tensor.knot_mins[k] > 0)
        .collect();
    let dup_hi: Vec<bool> = (0..dom_dim)
        .map(|k| degree[k] % 2 == 1 && tensor.knot_maxs[k] + 1 < nknots[k])
        .collect();
    if !dup_lo.iter().chain(&dup_hi).any(|&d| d) {
        return;
    }

    let mut it = VolIterator::new(&tensor.nctrl_pts);
    while !it.done() {
        let ijk = it.ijk();
        let dup = (0..dom_dim).any(|k| {
            (dup_lo[k] && ijk[k] == 0) || (dup_hi[k] && ijk[k] + 1 == tensor.nctrl_pts[k])
        });
        if dup {
            tensor.weights[it.cur_iter()] = not_a_weight();
        }
        it.incr_iter();
    }
}

impl<T: Real> fmt::Display for Tmesh<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for k in 0..self.dom_dim {
            write!(f, "dim {k} knots [level]:")?;
            for (u, l) in self.all_knots[k].iter().zip(&self.all_knot_levels[k]) {
                write!(f, " {u} [{l}]")?;
            }
            writeln!(f)?;
        }
        for (i, t) in self.tensor_prods.iter().enumerate() {
            writeln!(
                f,
                "tensor {i}: level {} knots {:?}..={:?} nctrl {:?}",
                t.level, t.knot_mins, t.knot_maxs, t.nctrl_pts
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::basis::uniform_knots;

    /// Single dimension, degree `p`, uniform knots for `nctrl` control points
    fn mesh_1d(p: usize, nctrl: usize) -> Tmesh<f64> {
        let mut tmesh = Tmesh::new(&[p], 1);
        tmesh.init_knots(&[nctrl]);
        tmesh.all_knots[0] = uniform_knots(p, nctrl);
        let last = tmesh.nknots(0) - 1;
        tmesh.append_tensor(&[0], &[last], 0).unwrap();
        tmesh
    }

    #[test]
    fn test_full_tensor_control_point_count() {
        for p in 1..=5 {
            let tmesh = mesh_1d(p, 9);
            assert_eq!(tmesh.tensor_prods[0].nctrl_pts, vec![9]);
            assert_eq!(tmesh.nctrl_global(0), 9);
        }
    }

    #[test]
    fn test_anchor_and_local_knots_of_full_tensor() {
        for p in 1..=4 {
            let tmesh = mesh_1d(p, 8);
            for j in 0..8 {
                let anchor = tmesh.ctrl_pt_anchor(0, &[j]).unwrap();
                let local = tmesh.knot_intersections(&anchor, 0).unwrap();
                // control point j owns knots j..=j+p+1
                assert_eq!(local[0], (j..j + p + 2).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_level_visibility() {
        let mut tmesh = mesh_1d(2, 5);
        // insert a finer knot by hand
        tmesh.all_knots[0].insert(4, 0.5);
        tmesh.all_knot_levels[0].insert(4, 1);
        tmesh.all_knot_param_idxs[0].insert(4, 0);
        assert_eq!(tmesh.level_knots(0, 0).values.len(), 8);
        assert_eq!(tmesh.level_knots(0, 1).values.len(), 9);
        assert_eq!(tmesh.max_level(), 1);
        let vis = tmesh.level_knots(0, 0);
        assert_eq!(vis.rank_of(4), None);
        assert_eq!(vis.rank_below(5), 4);
    }

    #[test]
    fn test_append_interior_tensor_and_duplicates() {
        let mut tmesh = mesh_1d(3, 10);
        // knots 0..=13, interior lines 4..=9
        let t = tmesh.append_tensor(&[4], &[8], 0).unwrap();
        let tensor = &tmesh.tensor_prods[t];
        assert_eq!(tensor.nctrl_pts, vec![5]);
        assert!(is_not_a_weight(tensor.weights[0]));
        assert!(is_not_a_weight(tensor.weights[4]));
        assert_eq!(tensor.weights[2], 1.0);
        // boundary local knot vectors would run off the sequence
        assert!(tmesh.append_tensor(&[1], &[8], 0).is_err());
        assert!(tmesh.append_tensor(&[8], &[8], 0).is_err());
    }

    #[test]
    fn test_relevel_and_sync_from_base() {
        let mut tmesh = mesh_1d(3, 10);
        for (j, v) in tmesh.tensor_prods[0].ctrl_pts.iter_mut().enumerate() {
            *v = j as f64;
        }
        let t = tmesh.append_tensor(&[4], &[8], 0).unwrap();
        // interior boundary points are sentinels, the 3 in between match base points 3..=5
        assert_eq!(tmesh.sync_from(0, t).unwrap(), 3);
        let tensor = &tmesh.tensor_prods[t];
        assert_eq!(tensor.ctrl_pts[[1, 0]], 3.0);
        assert_eq!(tensor.ctrl_pts[[3, 0]], 5.0);
        assert_eq!(tensor.ctrl_pts[[0, 0]], 0.0);

        // a level-1 knot inside the range adds one control point after releveling
        let mid = 0.5 * (tmesh.all_knots[0][6] + tmesh.all_knots[0][7]);
        tmesh.all_knots[0].insert(7, mid);
        tmesh.all_knot_levels[0].insert(7, 1);
        tmesh.all_knot_param_idxs[0].insert(7, 0);
        tmesh.tensor_prods[t].knot_maxs[0] += 1;
        tmesh.relevel_tensor(t, 1).unwrap();
        let tensor = &tmesh.tensor_prods[t];
        assert_eq!(tensor.nctrl_pts, vec![6]);
        assert_eq!(tensor.level, 1);
        assert!(tensor.ctrl_pts.iter().all(|&v| v == 0.0));
        assert!(is_not_a_weight(tensor.weights[0]) && is_not_a_weight(tensor.weights[5]));
    }

    #[test]
    fn test_anchors_window() {
        let tmesh = mesh_1d(3, 7);
        // knots: 0 0 0 0 .25 .5 .75 1 1 1 1, span of 0.3 is 4
        let anchors = tmesh.anchors(&[0.3], 0).unwrap();
        assert_eq!(anchors[0], vec![3, 4, 5, 6]);
        // exactly the control points whose local knot vectors contain 0.3
        for j in 0..7 {
            let anchor = tmesh.ctrl_pt_anchor(0, &[j]).unwrap();
            let local = &tmesh.knot_intersections(&anchor, 0).unwrap()[0];
            let k = &tmesh.all_knots[0];
            let covers = k[local[0]] <= 0.3 && 0.3 < k[local[local.len() - 1]];
            assert_eq!(covers, Tmesh::<f64>::in_anchors(&anchor, &anchors));
        }
    }
}
