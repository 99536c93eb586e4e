//! Flattened iteration over (sub)volumes of a first-dimension-fastest grid, and the
//! curve offsets used by the separable encoder and knot insertion.
use crate::strides_of;

/// Iterator over a box of multi-indices, first dimension varying fastest.
///
/// Optionally the box is a sub-volume `[starts, starts + npts)` of an enclosing volume of
/// extent `all_npts`, and [`VolIterator::full_idx`] gives the linear index in the enclosing
/// volume.
///
/// After each [`VolIterator::incr_iter`], [`VolIterator::done`] reports which dimensions
/// rolled over, and [`VolIterator::prev_idx_dim`] the per-dimension index before the step;
/// together they drive dimension-by-dimension accumulation in the decoder.
#[derive(Clone, Debug)]
pub struct VolIterator {
    /// Extent of the iterated box in each dimension
    npts: Vec<usize>,
    /// Offset of the box in the enclosing volume
    starts: Vec<usize>,
    /// Strides of the enclosing volume
    ds: Vec<usize>,
    idx_dim: Vec<usize>,
    prev_idx_dim: Vec<usize>,
    done_dim: Vec<bool>,
    cur_iter: usize,
    tot_iters: usize,
}

impl VolIterator {
    /// Iterate a full volume
    pub fn new(npts: &[usize]) -> Self {
        Self::new_sub(npts, &vec![0; npts.len()], npts)
    }

    /// Iterate the sub-volume `[starts, starts + npts)` of a volume with extent `all_npts`
    pub fn new_sub(npts: &[usize], starts: &[usize], all_npts: &[usize]) -> Self {
        let ndims = npts.len();
        Self {
            npts: npts.to_vec(),
            starts: starts.to_vec(),
            ds: strides_of(all_npts),
            idx_dim: vec![0; ndims],
            prev_idx_dim: vec![0; ndims],
            done_dim: vec![false; ndims],
            cur_iter: 0,
            tot_iters: npts.iter().product(),
        }
    }

    /// True once every multi-index has been visited
    #[inline]
    pub fn done(&self) -> bool {
        self.cur_iter >= self.tot_iters
    }

    /// True if dimension `k` rolled over during the last increment
    #[inline]
    pub fn done_dim(&self, k: usize) -> bool {
        self.done_dim[k]
    }

    #[inline]
    pub fn idx_dim(&self, k: usize) -> usize {
        self.idx_dim[k]
    }

    #[inline]
    pub fn prev_idx_dim(&self, k: usize) -> usize {
        self.prev_idx_dim[k]
    }

    #[inline]
    pub fn cur_iter(&self) -> usize {
        self.cur_iter
    }

    #[inline]
    pub fn tot_iters(&self) -> usize {
        self.tot_iters
    }

    /// Linear index of the current multi-index in the enclosing volume
    #[inline]
    pub fn full_idx(&self) -> usize {
        let mut i = 0;
        for k in 0..self.npts.len() {
            i += (self.starts[k] + self.idx_dim[k]) * self.ds[k];
        }
        i
    }

    /// Current multi-index relative to the start of the box
    #[inline]
    pub fn ijk(&self) -> &[usize] {
        &self.idx_dim
    }

    /// Advance to the next multi-index
    pub fn incr_iter(&mut self) {
        let ndims = self.npts.len();
        self.prev_idx_dim.copy_from_slice(&self.idx_dim);
        self.done_dim.iter_mut().for_each(|d| *d = false);
        self.cur_iter += 1;
        for k in 0..ndims {
            self.idx_dim[k] += 1;
            if self.idx_dim[k] < self.npts[k] {
                break;
            }
            self.done_dim[k] = true;
            if k + 1 < ndims {
                self.idx_dim[k] = 0;
            }
        }
    }

    /// Multi-index of linear index `idx` in a volume of extent `npts`
    pub fn idx_ijk(idx: usize, npts: &[usize], ijk: &mut [usize]) {
        let mut rem = idx;
        for k in 0..npts.len() {
            ijk[k] = rem % npts[k];
            rem /= npts[k];
        }
    }
}

/// Linear index of the first point of curve `j` along dimension `k`.
///
/// `stride` is the product of the extents of the dimensions before `k` and `n_k` the extent
/// of dimension `k` itself; consecutive points of the curve are `stride` apart.
#[inline]
pub fn curve_origin(j: usize, stride: usize, n_k: usize) -> usize {
    j % stride + (j / stride) * stride * n_k
}

/// Multi-index table of a box of extent `npts`, one row of `npts.len()` entries per
/// linear index
pub fn index_table(npts: &[usize]) -> Vec<usize> {
    let ndims = npts.len();
    let mut it = VolIterator::new(npts);
    let mut table = Vec::with_capacity(it.tot_iters() * ndims);
    while !it.done() {
        table.extend_from_slice(it.ijk());
        it.incr_iter();
    }
    table
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_full_volume_order() {
        let mut it = VolIterator::new(&[3, 2]);
        let mut seen = Vec::new();
        while !it.done() {
            seen.push((it.idx_dim(0), it.idx_dim(1), it.full_idx()));
            it.incr_iter();
        }
        assert_eq!(
            seen,
            vec![(0, 0, 0), (1, 0, 1), (2, 0, 2), (0, 1, 3), (1, 1, 4), (2, 1, 5)]
        );
    }

    #[test]
    fn test_done_dim_and_prev_idx() {
        let mut it = VolIterator::new(&[2, 2]);
        it.incr_iter();
        assert!(!it.done_dim(0));
        it.incr_iter();
        // dimension 0 wrapped while dimension 1 advanced from 0
        assert!(it.done_dim(0));
        assert!(!it.done_dim(1));
        assert_eq!(it.prev_idx_dim(1), 0);
        it.incr_iter();
        it.incr_iter();
        assert!(it.done());
        assert!(it.done_dim(0) && it.done_dim(1));
        assert_eq!(it.prev_idx_dim(1), 1);
    }

    #[test]
    fn test_sub_volume() {
        let mut it = VolIterator::new_sub(&[2, 2], &[1, 1], &[4, 3]);
        let mut idx = Vec::new();
        while !it.done() {
            idx.push(it.full_idx());
            it.incr_iter();
        }
        assert_eq!(idx, vec![5, 6, 9, 10]);
    }

    #[test]
    fn test_curve_origin() {
        // 4 x 3 x 2 grid, curves along dimension 1
        let stride = 4;
        let origins: Vec<usize> = (0..8).map(|j| curve_origin(j, stride, 3)).collect();
        assert_eq!(origins, vec![0, 1, 2, 3, 12, 13, 14, 15]);
    }

    #[test]
    fn test_index_table_roundtrip() {
        let npts = [3, 4, 2];
        let table = index_table(&npts);
        let mut ijk = [0; 3];
        for i in 0..24 {
            VolIterator::idx_ijk(i, &npts, &mut ijk);
            assert_eq!(&table[3 * i..3 * i + 3], &ijk[..]);
        }
    }
}
