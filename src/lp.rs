//! Feasibility linear programs used by the rational-weight fallback.
//!
//! The weight solver looks for a combination `w = Σ c_j v_j` of eigenvectors `v_j` with every
//! entry inside `[min_weight, max_weight]`. That is a box-constrained feasibility problem with
//! free coefficients, expressed here as `2N` inequality rows
//! (`v·c <= max`, `-v·c <= -min`) and columns added one eigenvector at a time.
//!
//! [`LpSolver`] is the seam for plugging in an external solver; [`DenseSimplex`] is a
//! self-contained phase-one tableau simplex.

#![allow(clippy::needless_range_loop)]

use ndarray::{Array1, Array2, ArrayView1};

/// Outcome of a feasibility solve
#[derive(Clone, Debug, PartialEq)]
pub enum LpStatus {
    /// One coefficient per column
    Feasible(Vec<f64>),
    Infeasible,
    IterationLimit,
}

/// Box-constrained combination problem over incrementally added columns
#[derive(Clone, Debug)]
pub struct BoxLp {
    /// Entries per column (number of weights)
    n: usize,
    lower: f64,
    upper: f64,
    columns: Vec<Array1<f64>>,
}

impl BoxLp {
    pub fn new(n: usize, lower: f64, upper: f64) -> Self {
        Self {
            n,
            lower,
            upper,
            columns: Vec::new(),
        }
    }

    /// Append a column; entries beyond `n` are ignored and missing entries are zero
    pub fn add_column(&mut self, col: ArrayView1<f64>) {
        let mut c = Array1::zeros(self.n);
        for (dst, &src) in c.iter_mut().zip(col.iter()) {
            *dst = src;
        }
        self.columns.push(c);
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn nweights(&self) -> usize {
        self.n
    }

    /// Inequality rows `a x <= b`: rows `0..n` bound from above, rows `n..2n` from below
    pub fn constraint_rows(&self) -> (Array2<f64>, Array1<f64>) {
        let nc = self.columns.len();
        let mut a = Array2::zeros((2 * self.n, nc));
        let mut b = Array1::zeros(2 * self.n);
        for i in 0..self.n {
            for j in 0..nc {
                a[[i, j]] = self.columns[j][i];
                a[[self.n + i, j]] = -self.columns[j][i];
            }
            b[i] = self.upper;
            b[self.n + i] = -self.lower;
        }
        (a, b)
    }

    /// Combination `Σ c_j column_j`
    pub fn combine(&self, coeffs: &[f64]) -> Array1<f64> {
        let mut w = Array1::zeros(self.n);
        for (&c, col) in coeffs.iter().zip(&self.columns) {
            w.scaled_add(c, col);
        }
        w
    }

    /// True if `coeffs` satisfies every row within `tol`
    pub fn is_feasible(&self, coeffs: &[f64], tol: f64) -> bool {
        self.combine(coeffs)
            .iter()
            .all(|&w| w >= self.lower - tol && w <= self.upper + tol)
    }
}

/// Pluggable feasibility solver
pub trait LpSolver: Send + Sync {
    fn solve(&self, lp: &BoxLp) -> LpStatus;
}

/// Dense tableau simplex; only phase one is needed for feasibility.
///
/// Free coefficients are split as `c = c⁺ - c⁻`, rows with negative right-hand side get an
/// artificial variable, and Bland's rule prevents cycling.
#[derive(Clone, Copy, Debug)]
pub struct DenseSimplex {
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for DenseSimplex {
    fn default() -> Self {
        Self {
            max_iter: 10_000,
            tol: 1e-9,
        }
    }
}

impl LpSolver for DenseSimplex {
    fn solve(&self, lp: &BoxLp) -> LpStatus {
        let (a, b) = lp.constraint_rows();
        let m = a.nrows();
        let nc = lp.ncols();
        if m == 0 || nc == 0 {
            return LpStatus::Infeasible;
        }

        // Standard form with slack and artificial variables; the last row is the
        // phase-one objective and the last column the right-hand side
        let nx = 2 * nc;
        let n_slack = m;
        let n_artificial = b.iter().filter(|&&bi| bi < 0.0).count();
        let n_total = nx + n_slack + n_artificial;
        let rhs = n_total;
        let obj = m;

        let mut tableau = Array2::<f64>::zeros((m + 1, n_total + 1));
        let mut basis = vec![0_usize; m];
        let mut art_idx = nx + n_slack;
        for i in 0..m {
            let mult = if b[i] < 0.0 { -1.0 } else { 1.0 };
            for j in 0..nc {
                tableau[[i, j]] = mult * a[[i, j]];
                tableau[[i, nc + j]] = -mult * a[[i, j]];
            }
            tableau[[i, nx + i]] = mult;
            tableau[[i, rhs]] = mult * b[i];
            if mult < 0.0 {
                tableau[[i, art_idx]] = 1.0;
                basis[i] = art_idx;
                art_idx += 1;
            } else {
                basis[i] = nx + i;
            }
        }

        // Minimize the sum of artificials, made canonical against the starting basis
        for j in nx + n_slack..n_total {
            tableau[[obj, j]] = 1.0;
        }
        for i in 0..m {
            if basis[i] >= nx + n_slack {
                let row = tableau.row(i).to_owned();
                tableau.row_mut(obj).scaled_add(-1.0, &row);
            }
        }

        let scale = 1.0 + b.iter().map(|x| x.abs()).sum::<f64>();
        let mut nit = 0;
        loop {
            if nit >= self.max_iter {
                return LpStatus::IterationLimit;
            }

            // Entering variable: lowest index with negative reduced cost
            let Some(pivot_col) = (0..n_total).find(|&j| tableau[[obj, j]] < -self.tol) else {
                break;
            };

            // Leaving variable: minimum ratio, ties to the smallest basic index
            let mut pivot: Option<(usize, f64)> = None;
            for i in 0..m {
                if tableau[[i, pivot_col]] > self.tol {
                    let ratio = tableau[[i, rhs]] / tableau[[i, pivot_col]];
                    let better = match pivot {
                        None => true,
                        Some((pr, best)) => {
                            ratio < best - self.tol || ((ratio - best).abs() <= self.tol && basis[i] < basis[pr])
                        }
                    };
                    if better {
                        pivot = Some((i, ratio));
                    }
                }
            }
            let Some((pivot_row, _)) = pivot else {
                return LpStatus::Infeasible;
            };

            let pivot_val = tableau[[pivot_row, pivot_col]];
            tableau.row_mut(pivot_row).mapv_inplace(|x| x / pivot_val);
            let prow = tableau.row(pivot_row).to_owned();
            for i in 0..=m {
                if i != pivot_row {
                    let factor = tableau[[i, pivot_col]];
                    if factor != 0.0 {
                        tableau.row_mut(i).scaled_add(-factor, &prow);
                    }
                }
            }
            basis[pivot_row] = pivot_col;
            nit += 1;
        }

        // Feasible iff every artificial left in the basis is at zero
        for (i, &bv) in basis.iter().enumerate() {
            if bv >= nx + n_slack && tableau[[i, rhs]].abs() > self.tol * scale {
                return LpStatus::Infeasible;
            }
        }

        let mut x = vec![0.0; nx];
        for (i, &bv) in basis.iter().enumerate() {
            if bv < nx {
                x[bv] = tableau[[i, rhs]];
            }
        }
        LpStatus::Feasible((0..nc).map(|j| x[j] - x[nc + j]).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_single_positive_column() {
        let mut lp = BoxLp::new(3, 1.0, 1e4);
        lp.add_column(array![1.0, 2.0, 0.5].view());
        match DenseSimplex::default().solve(&lp) {
            LpStatus::Feasible(c) => assert!(lp.is_feasible(&c, 1e-9)),
            other => panic!("expected feasible, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_column_scales_through_zero() {
        // the free coefficient must go negative
        let mut lp = BoxLp::new(2, 1.0, 1e4);
        lp.add_column(array![-2.0, -3.0].view());
        match DenseSimplex::default().solve(&lp) {
            LpStatus::Feasible(c) => {
                assert!(c[0] < 0.0);
                assert!(lp.is_feasible(&c, 1e-9));
            }
            other => panic!("expected feasible, got {other:?}"),
        }
    }

    #[test]
    fn test_mixed_sign_column_is_infeasible() {
        let mut lp = BoxLp::new(2, 1.0, 1e4);
        lp.add_column(array![1.0, -1.0].view());
        assert_eq!(DenseSimplex::default().solve(&lp), LpStatus::Infeasible);
    }

    #[test]
    fn test_expanding_columns_restores_feasibility() {
        let mut lp = BoxLp::new(4, 1.0, 1e4);
        lp.add_column(array![0.5, -0.5, 0.5, -0.5].view());
        assert_eq!(DenseSimplex::default().solve(&lp), LpStatus::Infeasible);
        lp.add_column(array![0.5, 0.5, 0.5, 0.5].view());
        match DenseSimplex::default().solve(&lp) {
            LpStatus::Feasible(c) => {
                assert_eq!(c.len(), 2);
                assert!(lp.is_feasible(&c, 1e-9));
            }
            other => panic!("expected feasible, got {other:?}"),
        }
    }

    #[test]
    fn test_upper_bound_binds() {
        // entries differing by more than the bound ratio cannot be placed in the box
        let mut lp = BoxLp::new(2, 1.0, 10.0);
        lp.add_column(array![1.0, 100.0].view());
        assert_eq!(DenseSimplex::default().solve(&lp), LpStatus::Infeasible);
    }

    #[test]
    fn test_iteration_limit() {
        let mut lp = BoxLp::new(3, 1.0, 1e4);
        lp.add_column(array![1.0, 2.0, 0.5].view());
        let simplex = DenseSimplex {
            max_iter: 0,
            ..Default::default()
        };
        assert_eq!(simplex.solve(&lp), LpStatus::IterationLimit);
    }
}
