//! B-spline basis-function evaluation: span search, nonzero values, derivatives, and
//! single-function evaluation over local knot vectors.
//!
//! Algorithms follow Piegl & Tiller, *The NURBS Book*: A2.1 (span), A2.2 (values),
//! A2.3 (derivatives), A2.4 (one function).
//!
//! Level-aware variants treat a knot as present only if its refinement level is at or below
//! the level of the tensor product being evaluated, so one global knot sequence can serve
//! every level of the T-mesh.
use crate::{cast, Real};
use ndarray::{ArrayViewMut1, ArrayViewMut2};

/// Per-worker scratch for basis evaluation, sized for the largest degree in use.
///
/// Never shared between threads; each worker builds its own and passes it by `&mut`.
#[derive(Clone, Debug)]
pub struct BasisScratch<T: Real> {
    /// u - knot distances to the left of the span
    left: Vec<T>,
    /// knot - u distances to the right of the span
    right: Vec<T>,
    /// Triangle of basis values (upper) and reciprocal knot differences (lower)
    ndu: Vec<Vec<T>>,
    /// Two alternating rows of derivative coefficients
    a: [Vec<T>; 2],
    /// Triangular table for single-function evaluation
    single: Vec<T>,
    degree: usize,
}

impl<T: Real> BasisScratch<T> {
    pub fn new(degree: usize) -> Self {
        let q = degree + 1;
        Self {
            left: vec![T::zero(); q],
            right: vec![T::zero(); q],
            ndu: vec![vec![T::zero(); q]; q],
            a: [vec![T::zero(); q], vec![T::zero(); q]],
            single: vec![T::zero(); q],
            degree,
        }
    }

    /// Scratch large enough for every degree in `degrees`
    pub fn for_degrees(degrees: &[usize]) -> Self {
        Self::new(degrees.iter().copied().max().unwrap_or(0))
    }

    /// Grow the buffers if `degree` exceeds the current capacity
    pub fn ensure_degree(&mut self, degree: usize) {
        if degree > self.degree {
            *self = Self::new(degree);
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }
}

/// Knot span index `s` with `knots[s] <= u < knots[s + 1]`, restricted to `[p, nctrl - 1]`.
///
/// `u` equal to the last knot maps to the last nonempty span. Returns `None` when `u` is
/// outside `[knots[p], knots[nctrl]]` or not finite.
pub fn find_span<T: Real>(knots: &[T], p: usize, u: T) -> Option<usize> {
    if knots.len() < 2 * p + 2 {
        return None;
    }
    let nctrl = knots.len() - p - 1;
    if !(u >= knots[p] && u <= knots[nctrl]) {
        return None;
    }

    // Bisection for the last knot at or below u
    let count = knots[p..=nctrl].partition_point(|&k| k <= u);
    let span = p + count - 1;
    Some(span.min(nctrl - 1))
}

/// Nonzero basis functions of degree `p` at `u` in knot span `span`, written to `out[..=p]`
/// (P&T A2.2).
pub fn basis_funs<T: Real>(
    knots: &[T],
    p: usize,
    span: usize,
    u: T,
    out: &mut [T],
    scratch: &mut BasisScratch<T>,
) {
    scratch.ensure_degree(p);
    let left = &mut scratch.left;
    let right = &mut scratch.right;
    out[0] = T::one();
    for j in 1..=p {
        left[j] = u - knots[span + 1 - j];
        right[j] = knots[span + j] - u;
        let mut saved = T::zero();
        for r in 0..j {
            let temp = out[r] / (right[r + 1] + left[j - r]);
            out[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        out[j] = saved;
    }
}

/// Fill one row of a basis matrix: nonzero values land in columns `span - p ..= span`,
/// every other column is zeroed.
pub fn basis_funs_row<T: Real>(
    knots: &[T],
    p: usize,
    span: usize,
    u: T,
    mut row: ArrayViewMut1<T>,
    scratch: &mut BasisScratch<T>,
) {
    let mut vals = std::mem::take(&mut scratch.single);
    vals.resize(p + 1, T::zero());
    basis_funs(knots, p, span, u, &mut vals, scratch);
    row.fill(T::zero());
    for j in 0..=p {
        row[span - p + j] = vals[j];
    }
    scratch.single = vals;
}

/// Index of the nearest knot strictly left of `idx` that is visible at `level`
#[inline]
pub fn prev_visible(levels: &[usize], idx: usize, level: usize) -> Option<usize> {
    (0..idx).rev().find(|&i| levels[i] <= level)
}

/// Index of the nearest knot strictly right of `idx` that is visible at `level`
#[inline]
pub fn next_visible(levels: &[usize], idx: usize, level: usize) -> Option<usize> {
    (idx + 1..levels.len()).find(|&i| levels[i] <= level)
}

/// Level-aware [`basis_funs`]: knots finer than `level` are skipped when walking left and
/// right of `span`, which must itself be visible.
///
/// Returns `None` if the knot sequence runs out of visible knots.
pub fn basis_funs_level<T: Real>(
    knots: &[T],
    levels: &[usize],
    level: usize,
    p: usize,
    span: usize,
    u: T,
    out: &mut [T],
    scratch: &mut BasisScratch<T>,
) -> Option<()> {
    scratch.ensure_degree(p);
    let left = &mut scratch.left;
    let right = &mut scratch.right;

    let mut li = span;
    let mut ri = span;
    for j in 1..=p {
        if j > 1 {
            li = prev_visible(levels, li, level)?;
        }
        ri = next_visible(levels, ri, level)?;
        left[j] = u - knots[li];
        right[j] = knots[ri] - u;
    }

    out[0] = T::one();
    for j in 1..=p {
        let mut saved = T::zero();
        for r in 0..j {
            let temp = out[r] / (right[r + 1] + left[j - r]);
            out[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        out[j] = saved;
    }
    Some(())
}

/// Basis functions and derivatives up to order `nders` at `u` (P&T A2.3).
///
/// `ders[[k, j]]` receives the k-th derivative of basis function `span - p + j`, so `ders`
/// must have at least `nders + 1` rows and `p + 1` columns. Derivatives above `p` are zero.
/// Knot differences are stored as reciprocals so the inner loops only multiply.
pub fn der_basis_funs<T: Real>(
    knots: &[T],
    p: usize,
    span: usize,
    u: T,
    nders: usize,
    mut ders: ArrayViewMut2<T>,
    scratch: &mut BasisScratch<T>,
) {
    scratch.ensure_degree(p);
    let BasisScratch {
        left, right, ndu, a, ..
    } = scratch;

    ndu[0][0] = T::one();
    for j in 1..=p {
        left[j] = u - knots[span + 1 - j];
        right[j] = knots[span + j] - u;
        let mut saved = T::zero();
        for r in 0..j {
            // lower triangle: reciprocal knot differences
            ndu[j][r] = T::one() / (right[r + 1] + left[j - r]);
            let temp = ndu[r][j - 1] * ndu[j][r];
            // upper triangle: basis functions
            ndu[r][j] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        ndu[j][j] = saved;
    }

    for j in 0..=p {
        ders[[0, j]] = ndu[j][p];
    }
    for k in p + 1..=nders {
        for j in 0..=p {
            ders[[k, j]] = T::zero();
        }
    }
    let nders_eff = nders.min(p);
    if nders_eff == 0 {
        return;
    }

    if nders_eff == 1 {
        // First derivative only: difference of the degree p-1 functions
        let pf: T = cast(p);
        for r in 0..=p {
            let mut d = T::zero();
            if r > 0 {
                d = d + ndu[r - 1][p - 1] * ndu[p][r - 1];
            }
            if r < p {
                d = d - ndu[r][p - 1] * ndu[p][r];
            }
            ders[[1, r]] = d * pf;
        }
        return;
    }

    for r in 0..=p {
        let (mut s1, mut s2) = (0, 1);
        a[0][0] = T::one();
        for k in 1..=nders_eff {
            let mut d = T::zero();
            let pk = p - k;
            if r >= k {
                let rk = r - k;
                a[s2][0] = a[s1][0] * ndu[pk + 1][rk];
                d = a[s2][0] * ndu[rk][pk];
            }
            // j runs over a[s2][1..k) restricted to functions inside the triangle
            let j1 = if r + 1 >= k { 1 } else { k - r };
            let j2 = if r <= pk + 1 { k - 1 } else { p - r };
            for j in j1..=j2 {
                let rkj = r + j - k;
                a[s2][j] = (a[s1][j] - a[s1][j - 1]) * ndu[pk + 1][rkj];
                d = d + a[s2][j] * ndu[rkj][pk];
            }
            if r <= pk {
                a[s2][k] = -a[s1][k - 1] * ndu[pk + 1][r];
                d = d + a[s2][k] * ndu[r][pk];
            }
            ders[[k, r]] = d;
            std::mem::swap(&mut s1, &mut s2);
        }
    }

    // Multiply through by p! / (p - k)!
    let mut fac: T = cast(p);
    for k in 1..=nders_eff {
        for j in 0..=p {
            ders[[k, j]] = ders[[k, j]] * fac;
        }
        fac = fac * cast::<T, _>(p - k);
    }
}

/// Value of the single basis function `i` of degree `p` at `u` over the global knot
/// sequence (P&T A2.4).
pub fn one_basis_fun<T: Real>(knots: &[T], p: usize, i: usize, u: T, scratch: &mut BasisScratch<T>) -> T {
    one_basis_fun_local(&knots[i..i + p + 2], p, u, scratch)
}

/// Value at `u` of the degree `p` basis function defined by the `p + 2` knots of `loc`.
///
/// At the right end of a clamped sequence (all of the last `p + 1` local knots equal to
/// `u`) the function is 1, so the last function of a curve interpolates its end point.
pub fn one_basis_fun_local<T: Real>(loc: &[T], p: usize, u: T, scratch: &mut BasisScratch<T>) -> T {
    if u == loc[p + 1] && loc[1..=p + 1].iter().all(|&k| k == u) {
        return T::one();
    }
    if u < loc[0] || u >= loc[p + 1] {
        return T::zero();
    }

    scratch.ensure_degree(p);
    let n = &mut scratch.single;
    for j in 0..=p {
        n[j] = if u >= loc[j] && u < loc[j + 1] {
            T::one()
        } else {
            T::zero()
        };
    }
    for k in 1..=p {
        let mut saved = if n[0] == T::zero() {
            T::zero()
        } else {
            (u - loc[0]) * n[0] / (loc[k] - loc[0])
        };
        for j in 0..p - k + 1 {
            let uleft = loc[j + 1];
            let uright = loc[j + k + 1];
            if n[j + 1] == T::zero() {
                n[j] = saved;
                saved = T::zero();
            } else {
                let temp = n[j + 1] / (uright - uleft);
                n[j] = saved + (uright - u) * temp;
                saved = (u - uleft) * temp;
            }
        }
    }
    n[0]
}

/// Nonzero basis functions at `u` computed one function at a time from local knot windows.
///
/// Matches [`basis_funs`]; used where control points are visited individually.
pub fn basis_funs_local<T: Real>(
    knots: &[T],
    p: usize,
    span: usize,
    u: T,
    out: &mut [T],
    scratch: &mut BasisScratch<T>,
) {
    for r in 0..=p {
        out[r] = one_basis_fun(knots, p, span - p + r, u, scratch);
    }
}

/// Clamped knot sequence with equally spaced interior knots for `nctrl` control points
pub fn uniform_knots<T: Real>(p: usize, nctrl: usize) -> Vec<T> {
    let nknots = nctrl + p + 1;
    let nspans = nctrl - p;
    let step = T::one() / cast::<T, _>(nspans);
    (0..nknots)
        .map(|i| {
            if i <= p {
                T::zero()
            } else if i >= nctrl {
                T::one()
            } else {
                cast::<T, _>(i - p) * step
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::*;
    use ndarray::Array2;

    /// Clamped knots with random interior spacing
    fn random_knots(p: usize, nctrl: usize) -> Vec<f64> {
        let mut rng = rng_fixed_seed();
        let interior = random_params(&mut rng, nctrl - p - 1);
        let mut knots = vec![0.0; p + 1];
        knots.extend(interior);
        knots.extend(vec![1.0; p + 1]);
        knots
    }

    #[test]
    fn test_find_span_containment() {
        for p in 1..=4 {
            let knots = random_knots(p, 12);
            let nctrl = knots.len() - p - 1;
            let mut rng = rng_fixed_seed();
            for u in random_params(&mut rng, 200) {
                let span = find_span(&knots, p, u).unwrap();
                assert!(knots[span] <= u && u < knots[span + 1]);
                assert!(span >= p && span < nctrl);
            }
            // end points
            assert_eq!(find_span(&knots, p, 0.0), Some(p));
            assert_eq!(find_span(&knots, p, 1.0), Some(nctrl - 1));
            // outside
            assert_eq!(find_span(&knots, p, -1e-9), None);
            assert_eq!(find_span(&knots, p, 1.0 + 1e-9), None);
            assert_eq!(find_span(&knots, p, f64::NAN), None);
        }
    }

    #[test]
    fn test_partition_of_unity() {
        for p in 0..=5 {
            let nctrl = p + 7;
            let knots = random_knots(p, nctrl);
            let mut scratch = BasisScratch::new(p);
            let mut out = vec![0.0; p + 1];
            let mut rng = rng_fixed_seed();
            let mut us = random_params(&mut rng, 100);
            us.push(0.0);
            us.push(1.0);
            for u in us {
                let span = find_span(&knots, p, u).unwrap();
                basis_funs(&knots, p, span, u, &mut out, &mut scratch);
                let sum: f64 = out.iter().sum();
                assert!((sum - 1.0).abs() < 1e-12);
                assert!(out.iter().all(|&x| x >= -1e-15));
            }
        }
    }

    #[test]
    fn test_basis_row_and_end_interpolation() {
        let p = 3;
        let knots = uniform_knots::<f64>(p, 7);
        let mut scratch = BasisScratch::new(p);
        let mut n = Array2::<f64>::zeros((2, 7));
        basis_funs_row(&knots, p, find_span(&knots, p, 0.0).unwrap(), 0.0, n.row_mut(0), &mut scratch);
        basis_funs_row(&knots, p, find_span(&knots, p, 1.0).unwrap(), 1.0, n.row_mut(1), &mut scratch);
        assert!((n[[0, 0]] - 1.0).abs() < 1e-15);
        assert!((n[[1, 6]] - 1.0).abs() < 1e-15);
        assert!((n.row(0).sum() - 1.0).abs() < 1e-15);
        assert!((n.row(1).sum() - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_one_basis_fun_matches_basis_funs() {
        for p in 1..=4 {
            let knots = random_knots(p, 10);
            let mut scratch = BasisScratch::new(p);
            let mut all = vec![0.0; p + 1];
            let mut single = vec![0.0; p + 1];
            let mut rng = rng_fixed_seed();
            let mut us = random_params(&mut rng, 50);
            us.push(0.0);
            us.push(1.0);
            for u in us {
                let span = find_span(&knots, p, u).unwrap();
                basis_funs(&knots, p, span, u, &mut all, &mut scratch);
                basis_funs_local(&knots, p, span, u, &mut single, &mut scratch);
                for j in 0..=p {
                    assert!((all[j] - single[j]).abs() < 1e-12, "p={p} u={u} j={j}");
                }
            }
        }
    }

    #[test]
    fn test_level_aware_matches_visible_subsequence() {
        let p = 2;
        // knots at level 1 are invisible to level 0
        let knots = vec![0.0, 0.0, 0.0, 0.2, 0.3, 0.5, 0.6, 0.8, 1.0, 1.0, 1.0];
        let levels = vec![0, 0, 0, 0, 1, 0, 1, 0, 0, 0, 0];
        let visible: Vec<f64> = knots
            .iter()
            .zip(&levels)
            .filter(|(_, l)| **l == 0)
            .map(|(&k, _)| k)
            .collect();
        let mut scratch = BasisScratch::new(p);
        let mut a = vec![0.0; p + 1];
        let mut b = vec![0.0; p + 1];
        let mut rng = rng_fixed_seed();
        for u in random_params(&mut rng, 100) {
            // global span walked down to a visible knot
            let mut span = find_span(&knots, p, u).unwrap();
            while levels[span] > 0 {
                span -= 1;
            }
            basis_funs_level(&knots, &levels, 0, p, span, u, &mut a, &mut scratch).unwrap();
            let vspan = find_span(&visible, p, u).unwrap();
            basis_funs(&visible, p, vspan, u, &mut b, &mut scratch);
            for j in 0..=p {
                assert!((a[j] - b[j]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_derivatives_finite_difference() {
        for p in 1..=4 {
            let knots = random_knots(p, 9);
            let nders = p.min(2);
            let mut scratch = BasisScratch::new(p);
            let mut ders = Array2::<f64>::zeros((nders + 1, p + 1));
            let mut lo = vec![0.0; p + 1];
            let mut hi = vec![0.0; p + 1];
            let h = 1e-6;
            let mut rng = rng_fixed_seed();
            for u in random_params(&mut rng, 40) {
                let span = find_span(&knots, p, u).unwrap();
                // stay inside the span so the finite difference is smooth
                if u - h < knots[span] || u + h >= knots[span + 1] {
                    continue;
                }
                der_basis_funs(&knots, p, span, u, nders, ders.view_mut(), &mut scratch);
                basis_funs(&knots, p, span, u - h, &mut lo, &mut scratch);
                basis_funs(&knots, p, span, u + h, &mut hi, &mut scratch);
                let dsum: f64 = ders.row(1).sum();
                assert!(dsum.abs() < 1e-8);
                for j in 0..=p {
                    let fd = (hi[j] - lo[j]) / (2.0 * h);
                    assert!((ders[[1, j]] - fd).abs() < 1e-4 * (1.0 + fd.abs()));
                }
            }
        }
    }

    #[test]
    fn test_first_derivative_path_matches_general() {
        let p = 3;
        let knots = random_knots(p, 8);
        let mut scratch = BasisScratch::new(p);
        let mut d1 = Array2::<f64>::zeros((2, p + 1));
        let mut d3 = Array2::<f64>::zeros((4, p + 1));
        let mut rng = rng_fixed_seed();
        for u in random_params(&mut rng, 30) {
            let span = find_span(&knots, p, u).unwrap();
            der_basis_funs(&knots, p, span, u, 1, d1.view_mut(), &mut scratch);
            der_basis_funs(&knots, p, span, u, 3, d3.view_mut(), &mut scratch);
            for j in 0..=p {
                assert!((d1[[0, j]] - d3[[0, j]]).abs() < 1e-12);
                assert!((d1[[1, j]] - d3[[1, j]]).abs() < 1e-9);
            }
            // derivatives of a partition of unity vanish at every order
            for k in 1..=3 {
                let scale = d3.row(k).iter().fold(1.0_f64, |m, x| m.max(x.abs()));
                assert!(d3.row(k).sum().abs() < 1e-9 * scale);
            }
        }
    }

    #[test]
    fn test_uniform_knots() {
        let knots = uniform_knots::<f64>(2, 5);
        assert_eq!(knots, vec![0.0, 0.0, 0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0, 1.0, 1.0]);
    }
}
