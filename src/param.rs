//! Input point sets and their parameterization.
//!
//! A structured point set is a full grid addressed by multi-index, with one parameter vector
//! per domain dimension. An unstructured point set carries one parameter row per point and
//! can only be decoded, not encoded.
use crate::config::Parameterization;
use crate::error::{MfaError, MfaResult};
use crate::utils::linspace;
use crate::volume::VolIterator;
use crate::{strides_of, to_f64, Real};
use ndarray::{Array1, Array2};

/// Parameters of a point set, each in `[0, 1]`
#[derive(Clone, Debug)]
pub enum Param<T: Real> {
    /// One sorted parameter vector per domain dimension
    Grid(Vec<Vec<T>>),
    /// One row of parameters per point
    List(Array2<T>),
}

impl<T: Real> Param<T> {
    /// Parameterize a structured grid.
    ///
    /// With [`Parameterization::Domain`], parameters along dimension `k` are the normalized
    /// values of domain column `k` along the grid axis; degenerate axes fall back to uniform
    /// spacing.
    pub fn from_domain(
        domain: &Array2<T>,
        ndom_pts: &[usize],
        kind: Parameterization,
    ) -> MfaResult<Self> {
        let dom_dim = ndom_pts.len();
        if domain.ncols() < dom_dim && kind == Parameterization::Domain {
            return Err(MfaError::DimensionMismatch(format!(
                "domain parameterization needs {dom_dim} coordinate columns, found {}",
                domain.ncols()
            )));
        }
        let strides = strides_of(ndom_pts);
        let grid = (0..dom_dim)
            .map(|k| {
                let n = ndom_pts[k];
                let uniform = linspace(T::zero(), T::one(), n);
                if kind == Parameterization::Uniform {
                    return uniform;
                }
                let x0 = domain[[0, k]];
                let x1 = domain[[(n - 1) * strides[k], k]];
                let range = x1 - x0;
                if range == T::zero() || !range.is_finite() {
                    return uniform;
                }
                let mut u: Vec<T> = (0..n)
                    .map(|i| (domain[[i * strides[k], k]] - x0) / range)
                    .collect();
                // pin the ends against rounding
                u[0] = T::zero();
                u[n - 1] = T::one();
                u
            })
            .collect();
        let params = Param::Grid(grid);
        params.validate()?;
        Ok(params)
    }

    pub fn dom_dim(&self) -> usize {
        match self {
            Param::Grid(g) => g.len(),
            Param::List(l) => l.ncols(),
        }
    }

    /// Parameter vector of dimension `k` for gridded parameters
    pub fn grid(&self, k: usize) -> Option<&[T]> {
        match self {
            Param::Grid(g) => g.get(k).map(|v| &v[..]),
            Param::List(_) => None,
        }
    }

    /// Every parameter in `[0, 1]` and, for grids, nondecreasing along each dimension
    fn validate(&self) -> MfaResult<()> {
        let out_of_range = |dim: usize, u: T| MfaError::ParamOutOfRange {
            dim,
            value: to_f64(u),
            min: 0.0,
            max: 1.0,
        };
        let bad = |u: T| !(u >= T::zero() && u <= T::one());
        match self {
            Param::Grid(g) => {
                for (dim, u) in g.iter().enumerate() {
                    if let Some(&x) = u.iter().find(|&&x| bad(x)) {
                        return Err(out_of_range(dim, x));
                    }
                    if let Some(i) = u.windows(2).position(|w| w[1] < w[0]) {
                        return Err(MfaError::UnsortedParams { dim, index: i + 1 });
                    }
                }
            }
            Param::List(l) => {
                for (dim, col) in l.columns().into_iter().enumerate() {
                    if let Some(&x) = col.iter().find(|&&x| bad(x)) {
                        return Err(out_of_range(dim, x));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Samples with their parameters.
///
/// Rows of `domain` are points; for structured sets they follow the grid with the first
/// dimension varying fastest.
#[derive(Clone, Debug)]
pub struct PointSet<T: Real> {
    pub domain: Array2<T>,
    pub params: Param<T>,
    /// Grid extent per dimension; empty for unstructured sets
    ndom_pts: Vec<usize>,
}

impl<T: Real> PointSet<T> {
    /// Structured point set with domain parameterization
    ///
    /// # Errors
    /// * If the number of rows does not match the grid size
    /// * If any grid dimension has fewer than two points
    pub fn structured(domain: Array2<T>, ndom_pts: &[usize]) -> MfaResult<Self> {
        Self::structured_with(domain, ndom_pts, Parameterization::Domain)
    }

    pub fn structured_with(
        domain: Array2<T>,
        ndom_pts: &[usize],
        kind: Parameterization,
    ) -> MfaResult<Self> {
        check_grid(&domain, ndom_pts)?;
        let params = Param::from_domain(&domain, ndom_pts, kind)?;
        Ok(Self {
            domain,
            params,
            ndom_pts: ndom_pts.to_vec(),
        })
    }

    /// Structured point set with caller-supplied parameter vectors
    pub fn with_grid_params(domain: Array2<T>, params: Vec<Vec<T>>) -> MfaResult<Self> {
        let ndom_pts: Vec<usize> = params.iter().map(|p| p.len()).collect();
        check_grid(&domain, &ndom_pts)?;
        let params = Param::Grid(params);
        params.validate()?;
        Ok(Self {
            domain,
            params,
            ndom_pts,
        })
    }

    /// Unstructured point set, one parameter row per domain row
    pub fn unstructured(domain: Array2<T>, params: Array2<T>) -> MfaResult<Self> {
        if params.nrows() != domain.nrows() {
            return Err(MfaError::DimensionMismatch(format!(
                "{} parameter rows for {} points",
                params.nrows(),
                domain.nrows()
            )));
        }
        let params = Param::List(params);
        params.validate()?;
        Ok(Self {
            domain,
            params,
            ndom_pts: Vec::new(),
        })
    }

    /// Point set with the same parameters and a zeroed domain of `pt_dim` columns
    pub fn like(&self, pt_dim: usize) -> Self {
        Self {
            domain: Array2::zeros((self.npts(), pt_dim)),
            params: self.params.clone(),
            ndom_pts: self.ndom_pts.clone(),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self.params, Param::Grid(_))
    }

    pub fn npts(&self) -> usize {
        self.domain.nrows()
    }

    pub fn dom_dim(&self) -> usize {
        self.params.dom_dim()
    }

    pub fn pt_dim(&self) -> usize {
        self.domain.ncols()
    }

    pub fn ndom_pts(&self) -> &[usize] {
        &self.ndom_pts
    }

    /// Grid multi-index of point `idx`; meaningless for unstructured sets
    pub fn ijk(&self, idx: usize, ijk: &mut [usize]) {
        VolIterator::idx_ijk(idx, &self.ndom_pts, ijk);
    }

    /// Parameters of point `idx`
    pub fn pt_params(&self, idx: usize, out: &mut [T]) {
        match &self.params {
            Param::Grid(g) => {
                let mut rem = idx;
                for k in 0..g.len() {
                    out[k] = g[k][rem % self.ndom_pts[k]];
                    rem /= self.ndom_pts[k];
                }
            }
            Param::List(l) => {
                for k in 0..l.ncols() {
                    out[k] = l[[idx, k]];
                }
            }
        }
    }

    /// max - min of each domain column in `[min_dim, max_dim]`
    pub fn extents(&self, min_dim: usize, max_dim: usize) -> Array1<T> {
        Array1::from_iter((min_dim..=max_dim).map(|j| {
            let col = self.domain.column(j);
            let lo = col.iter().fold(T::infinity(), |a, &b| a.min(b));
            let hi = col.iter().fold(T::neg_infinity(), |a, &b| a.max(b));
            hi - lo
        }))
    }
}

fn check_grid<T: Real>(domain: &Array2<T>, ndom_pts: &[usize]) -> MfaResult<()> {
    if ndom_pts.is_empty() {
        return Err(MfaError::DimensionMismatch("empty grid".to_string()));
    }
    if let Some(k) = ndom_pts.iter().position(|&n| n < 2) {
        return Err(MfaError::TooFewPoints {
            dim: k,
            degree: 0,
            npts: ndom_pts[k],
        });
    }
    let npts: usize = ndom_pts.iter().product();
    if domain.nrows() != npts {
        return Err(MfaError::DimensionMismatch(format!(
            "grid of {npts} points but {} domain rows",
            domain.nrows()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::*;

    #[test]
    fn test_domain_parameterization() {
        let x = vec![0.0_f64, 1.0, 3.0, 4.0];
        let y = linspace(-2.0_f64, 2.0, 3);
        let domain = sample_grid(&[x, y], |p| p[0] * p[1]);
        let ps = PointSet::structured(domain, &[4, 3]).unwrap();
        assert_eq!(ps.params.grid(0).unwrap(), &[0.0, 0.25, 0.75, 1.0]);
        assert_eq!(ps.params.grid(1).unwrap(), &[0.0, 0.5, 1.0]);

        let mut u = [0.0; 2];
        ps.pt_params(6, &mut u);
        assert_eq!(u, [0.75, 0.5]);
        let mut ijk = [0; 2];
        ps.ijk(6, &mut ijk);
        assert_eq!(ijk, [2, 1]);
    }

    #[test]
    fn test_uniform_parameterization_and_extents() {
        let x = vec![0.0_f64, 1.0, 3.0];
        let domain = sample_grid(&[x], |p| 2.0 * p[0]);
        let ps = PointSet::structured_with(domain, &[3], Parameterization::Uniform).unwrap();
        assert_eq!(ps.params.grid(0).unwrap(), &[0.0, 0.5, 1.0]);
        let ext = ps.extents(0, 1);
        assert_eq!(ext.to_vec(), vec![3.0, 6.0]);
    }

    #[test]
    fn test_rejects_bad_input() {
        let domain = Array2::<f64>::zeros((5, 2));
        assert!(PointSet::structured(domain.clone(), &[2, 2]).is_err());
        assert!(PointSet::structured(domain.clone(), &[5, 1]).is_err());
        let params = Array2::from_elem((5, 1), 1.5);
        assert!(PointSet::unstructured(domain, params).is_err());
    }

    #[test]
    fn test_rejects_non_monotone_axis() {
        let x = vec![0.0_f64, 3.0, 1.0, 4.0];
        let domain = sample_grid(&[x], |p| p[0]);
        assert!(matches!(
            PointSet::structured(domain.clone(), &[4]),
            Err(MfaError::UnsortedParams { dim: 0, index: 2 })
        ));
        // uniform parameters ignore the domain values
        assert!(PointSet::structured_with(domain, &[4], Parameterization::Uniform).is_ok());

        // a decreasing axis normalizes to increasing parameters
        let x = vec![4.0_f64, 3.0, 1.0, 0.0];
        let ps = PointSet::structured(sample_grid(&[x], |p| p[0]), &[4]).unwrap();
        assert_eq!(ps.params.grid(0).unwrap(), &[0.0, 0.25, 0.75, 1.0]);
    }

    #[test]
    fn test_rejects_unsorted_grid_params() {
        let domain = Array2::<f64>::zeros((3, 2));
        let params = vec![vec![0.0, 0.6, 0.4]];
        assert!(matches!(
            PointSet::with_grid_params(domain.clone(), params),
            Err(MfaError::UnsortedParams { dim: 0, index: 2 })
        ));
        let params = vec![vec![0.0, 0.5, 1.2]];
        assert!(matches!(
            PointSet::with_grid_params(domain, params),
            Err(MfaError::ParamOutOfRange { dim: 0, .. })
        ));
    }
}
