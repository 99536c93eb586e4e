//! Rational weights for one curve of the last encoded dimension.
//!
//! Following Ma & Kruth (1995), the weights minimizing the rational least-squares residual
//! are the eigenvector of the smallest eigenvalue of
//! `M = NᵗQ²N - NᵗQN (NᵗN)⁻¹ NᵗQN`, where `Q` is the diagonal of sampled range values.
//! When that eigenvector changes sign, combinations of the leading eigenvectors are searched
//! with a feasibility LP for one whose entries all lie in `[min_weight, max_weight]`.
use crate::config::WeightOptions;
use crate::linalg::{symmetric_eigen, LinalgError, SymmetricFactor};
use crate::lp::{BoxLp, LpSolver, LpStatus};
use crate::{cast, to_f64, Real};
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Weights of one curve and whether they had to fall back to ones
#[derive(Clone, Debug)]
pub struct CurveWeights<T: Real> {
    pub weights: Array1<T>,
    pub degraded: bool,
}

impl<T: Real> CurveWeights<T> {
    fn uniform(n: usize) -> Self {
        Self {
            weights: Array1::ones(n),
            degraded: true,
        }
    }
}

/// The matrix `M` of the weight eigenproblem, symmetrized against roundoff
pub fn weight_matrix<T: Real>(
    n: &Array2<T>,
    ntn: &SymmetricFactor,
    q: ArrayView1<T>,
) -> Result<Array2<T>, LinalgError> {
    // rows of N scaled by the sampled values
    let mut nq = n.clone();
    for (mut row, &qi) in nq.axis_iter_mut(Axis(0)).zip(q.iter()) {
        row.mapv_inplace(|x| x * qi);
    }
    let ntqn = n.t().dot(&nq);
    let ntq2n = nq.t().dot(&nq);
    let x = ntn.solve(&ntqn)?;
    let m = ntq2n - ntqn.dot(&x);
    let half: T = cast(0.5);
    Ok(Array2::from_shape_fn(m.dim(), |(i, j)| (m[[i, j]] + m[[j, i]]) * half))
}

/// Solve the rational weights of one curve.
///
/// Degenerate eigenvalues and infeasible LPs are not errors: the curve gets uniform weights,
/// a warning is logged and the result is flagged as degraded.
///
/// # Errors
/// * If the linear solve against `NᵗN` or the eigendecomposition fails outright
pub fn solve_weights<T: Real>(
    n: &Array2<T>,
    ntn: &SymmetricFactor,
    q: ArrayView1<T>,
    opts: &WeightOptions,
    lp: &dyn LpSolver,
    curve: usize,
) -> Result<CurveWeights<T>, LinalgError> {
    let nw = n.ncols();
    let m = weight_matrix(n, ntn, q)?;
    let (evals, evecs) = symmetric_eigen(&m)?;

    // scale of M: the larger of its largest eigenvalue and the largest diagonal entry of NᵗQ²N
    let diag = (0..nw)
        .map(|j| {
            n.column(j)
                .iter()
                .zip(q.iter())
                .map(|(&nij, &qi)| to_f64(nij * qi).powi(2))
                .sum::<f64>()
        })
        .fold(0.0_f64, f64::max);
    let scale = evals.iter().fold(diag, |a, &v| a.max(to_f64(v).abs()));
    let tol = opts.eigval_rtol * scale;
    if degenerate(evals.view(), tol) {
        log::warn!("curve {curve}: eigenvalues of the weight matrix are not positive and distinct; using uniform weights");
        return Ok(CurveWeights::uniform(nw));
    }

    // smallest eigenvector single-signed: it is the weight vector
    let v0 = evecs.column(0);
    if v0.iter().all(|&x| x > T::zero()) || v0.iter().all(|&x| x < T::zero()) {
        return Ok(CurveWeights {
            weights: normalize(v0.mapv(|x| x.abs())),
            degraded: false,
        });
    }

    match positive_combination(&evecs, opts, lp, curve) {
        Some(weights) => Ok(CurveWeights {
            weights,
            degraded: false,
        }),
        None => {
            log::warn!("curve {curve}: no positive combination of eigenvectors found; using uniform weights");
            Ok(CurveWeights::uniform(nw))
        }
    }
}

/// True if an eigenvalue is not above `tol` or lies within `tol` of its neighbor.
/// `evals` is ascending.
fn degenerate<T: Real>(evals: ArrayView1<T>, tol: f64) -> bool {
    let vals: Vec<f64> = evals.iter().map(|&v| to_f64(v)).collect();
    vals.iter().any(|&v| v <= tol) || vals.windows(2).any(|w| (w[1] - w[0]).abs() <= tol)
}

/// Grow the eigenspace one vector at a time (columns of `evecs`, ascending eigenvalue) until
/// the LP finds a combination with every entry in `[min_weight, max_weight]`.
///
/// Returns the combination scaled to unit maximum, or `None` if every prefix is infeasible.
fn positive_combination<T: Real>(
    evecs: &Array2<T>,
    opts: &WeightOptions,
    lp: &dyn LpSolver,
    curve: usize,
) -> Option<Array1<T>> {
    let nw = evecs.nrows();
    let clamp = |j: usize| -> Array1<f64> {
        evecs.column(j).mapv(|x| {
            let x = to_f64(x);
            if x.abs() < opts.min_eigvec_entry {
                0.0
            } else {
                x
            }
        })
    };
    let mut problem = BoxLp::new(nw, opts.min_weight, opts.max_weight);
    problem.add_column(clamp(0).view());
    for j in 1..evecs.ncols() {
        problem.add_column(clamp(j).view());
        match lp.solve(&problem) {
            LpStatus::Feasible(coeffs) => {
                let w: Array1<T> = problem.combine(&coeffs).mapv(|x| cast::<T, _>(x));
                if w.iter().all(|&x| x > T::zero()) {
                    log::debug!("curve {curve}: positive weights from {} eigenvectors", j + 1);
                    return Some(normalize(w));
                }
            }
            LpStatus::Infeasible => {}
            LpStatus::IterationLimit => {
                log::debug!("curve {curve}: LP iteration limit with {} eigenvectors", j + 1);
            }
        }
    }
    None
}

/// Scale so the largest weight is one
fn normalize<T: Real>(w: Array1<T>) -> Array1<T> {
    let max = w.iter().fold(T::zero(), |a, &b| a.max(b));
    w.mapv(|x| x / max)
}
