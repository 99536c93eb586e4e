//! Model descriptor: degrees, the T-mesh, the output-coordinate range it approximates, and
//! the cached basis matrices of the point set it was encoded from.
use crate::basis::{self, uniform_knots};
use crate::config::KnotPlacement;
use crate::error::{MfaError, MfaResult};
use crate::param::PointSet;
use crate::tmesh::{KnotIdx, Tmesh};
use crate::{cast, to_f64, Real};
use ndarray::Array2;

#[derive(Clone, Debug)]
pub struct ModelData<T: Real> {
    pub dom_dim: usize,
    /// Degree per dimension
    pub p: Vec<usize>,
    /// First column of the point set this model approximates
    pub min_dim: usize,
    /// Last column, inclusive; it is the rationally weighted range coordinate
    pub max_dim: usize,
    pub tmesh: Tmesh<T>,
    /// Basis matrices (points x control points) of the encoded point set, per dimension
    pub basis: Vec<Array2<T>>,
    /// Parameter vectors the basis matrices were evaluated at, per dimension
    pub basis_params: Vec<Vec<T>>,
    /// Largest absolute error seen by the last adaptive round
    pub max_err: T,
}

impl<T: Real> ModelData<T> {
    /// Model with uniform knots and one zeroed tensor product over all of them.
    ///
    /// # Errors
    /// * If `degree` and `nctrl_pts` differ in length or are empty
    /// * If any dimension has no more control points than its degree
    /// * If `max_dim < min_dim`
    pub fn new(degree: &[usize], nctrl_pts: &[usize], min_dim: usize, max_dim: usize) -> MfaResult<Self> {
        let dom_dim = degree.len();
        if dom_dim == 0 || nctrl_pts.len() != dom_dim {
            return Err(MfaError::DimensionMismatch(format!(
                "{} degrees for {} control point counts",
                dom_dim,
                nctrl_pts.len()
            )));
        }
        if max_dim < min_dim {
            return Err(MfaError::DimensionMismatch(format!(
                "coordinate range [{min_dim}, {max_dim}] is empty"
            )));
        }
        for k in 0..dom_dim {
            if nctrl_pts[k] <= degree[k] {
                return Err(MfaError::TooFewControlPoints {
                    dim: k,
                    degree: degree[k],
                    found: nctrl_pts[k],
                });
            }
        }

        let mut tmesh = Tmesh::new(degree, max_dim - min_dim + 1);
        tmesh.init_knots(nctrl_pts);
        for k in 0..dom_dim {
            tmesh.all_knots[k] = uniform_knots(degree[k], nctrl_pts[k]);
        }
        let mut model = Self {
            dom_dim,
            p: degree.to_vec(),
            min_dim,
            max_dim,
            tmesh,
            basis: Vec::new(),
            basis_params: Vec::new(),
            max_err: T::zero(),
        };
        model.append_base_tensor()?;
        Ok(model)
    }

    /// Coordinates per control point
    pub fn pt_dim(&self) -> usize {
        self.max_dim - self.min_dim + 1
    }

    fn append_base_tensor(&mut self) -> MfaResult<usize> {
        let mins = vec![0; self.dom_dim];
        let maxs: Vec<KnotIdx> = (0..self.dom_dim).map(|k| self.tmesh.nknots(k) - 1).collect();
        self.tmesh.append_tensor(&mins, &maxs, 0)
    }

    /// Place knots for the current control-point counts of tensor product 0 against the
    /// parameters of `input`, resetting the T-mesh to that single tensor product.
    ///
    /// Parametric placement interpolates interior knots between input parameters so every
    /// span holds input points (P&T eq. 9.68-9.69 generalized to fewer control points than
    /// points).
    pub fn set_knots(&mut self, input: &PointSet<T>, placement: KnotPlacement) -> MfaResult<()> {
        if input.dom_dim() != self.dom_dim {
            return Err(MfaError::DimensionMismatch(format!(
                "point set has {} domain dimensions, model has {}",
                input.dom_dim(),
                self.dom_dim
            )));
        }
        let nctrl_pts = self.tmesh.tensor(0)?.nctrl_pts.clone();
        self.tmesh.init_knots(&nctrl_pts);

        for k in 0..self.dom_dim {
            let p = self.p[k];
            let nctrl = nctrl_pts[k];
            let params = input.params.grid(k);
            if let Some(params) = params {
                if params.len() <= p {
                    return Err(MfaError::TooFewPoints {
                        dim: k,
                        degree: p,
                        npts: params.len(),
                    });
                }
                if nctrl > params.len() {
                    log::warn!(
                        "dimension {k}: {nctrl} control points exceed {} input points",
                        params.len()
                    );
                }
            }

            let knots = match (placement, params) {
                (KnotPlacement::Parametric, Some(params)) if nctrl <= params.len() => {
                    parametric_knots(p, nctrl, params)
                }
                _ => uniform_knots(p, nctrl),
            };
            self.tmesh.all_knot_param_idxs[k] = match params {
                Some(params) => knots.iter().map(|&u| param_idx(params, u)).collect(),
                None => vec![0; knots.len()],
            };
            self.tmesh.all_knots[k] = knots;
        }

        self.append_base_tensor()?;
        self.basis.clear();
        self.basis_params.clear();
        Ok(())
    }

    /// Span of `u` in the global knot sequence of `dim`
    pub fn find_span(&self, dim: usize, u: T) -> MfaResult<KnotIdx> {
        let knots = &self.tmesh.all_knots[dim];
        basis::find_span(knots, self.p[dim], u).ok_or_else(|| MfaError::ParamOutOfRange {
            dim,
            value: to_f64(u),
            min: to_f64(knots[0]),
            max: to_f64(knots[knots.len() - 1]),
        })
    }

    /// Span of `u` in the global knot sequence of `dim`, as seen by tensor product `t`.
    ///
    /// Knots finer than the tensor product are skipped by walking left to the nearest
    /// visible knot.
    ///
    /// # Errors
    /// * If `u` lies outside the knot range of the tensor product
    /// * If no visible knot starts the span inside the tensor product's range
    pub fn find_span_tensor(&self, dim: usize, u: T, t: usize) -> MfaResult<KnotIdx> {
        let tensor = self.tmesh.tensor(t)?;
        let knots = &self.tmesh.all_knots[dim];
        let levels = &self.tmesh.all_knot_levels[dim];
        let (min, max) = (tensor.knot_mins[dim], tensor.knot_maxs[dim]);
        if !(u >= knots[min] && u <= knots[max]) {
            return Err(MfaError::ParamOutsideTensor {
                dim,
                tensor: t,
                value: to_f64(u),
                min: to_f64(knots[min]),
                max: to_f64(knots[max]),
            });
        }

        let mut span = self.find_span(dim, u)?;
        while levels[span] > tensor.level && span > min {
            span -= 1;
        }
        if levels[span] > tensor.level || span < min {
            return Err(MfaError::LevelMismatch {
                dim,
                tensor: t,
                span,
                level: tensor.level,
            });
        }
        Ok(span)
    }
}

/// Index of the first parameter at or above `u`
pub fn param_idx<T: Real>(params: &[T], u: T) -> usize {
    params.partition_point(|&x| x < u)
}

/// Clamped knots whose interior values interpolate the input parameters
pub fn parametric_knots<T: Real>(p: usize, nctrl: usize, params: &[T]) -> Vec<T> {
    let nknots = nctrl + p + 1;
    let mut knots = vec![T::zero(); nknots];
    for k in knots.iter_mut().skip(nctrl) {
        *k = T::one();
    }
    let npts = params.len();
    let d: T = cast::<T, _>(npts - 1) / cast::<T, _>(nctrl - p);
    for j in 1..nctrl - p {
        let jd = cast::<T, _>(j) * d;
        let i = jd.floor();
        let a = jd - i;
        let i = i.to_usize().unwrap_or(0).min(npts - 2);
        knots[p + j] = (T::one() - a) * params[i] + a * params[i + 1];
    }
    knots
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::*;

    #[test]
    fn test_new_validates() {
        assert!(ModelData::<f64>::new(&[3], &[3], 0, 1).is_err());
        assert!(ModelData::<f64>::new(&[3, 2], &[5], 0, 1).is_err());
        assert!(ModelData::<f64>::new(&[3], &[5], 2, 1).is_err());
        let model = ModelData::<f64>::new(&[3, 2], &[5, 4], 0, 2).unwrap();
        assert_eq!(model.pt_dim(), 3);
        assert_eq!(model.tmesh.tensor_prods.len(), 1);
        assert_eq!(model.tmesh.tensor_prods[0].nctrl_pts, vec![5, 4]);
        assert_eq!(model.tmesh.tensor_prods[0].ctrl_pts.dim(), (20, 3));
    }

    #[test]
    fn test_parametric_knots_follow_params() {
        // clustered parameters pull interior knots toward the cluster
        let params: Vec<f64> = linspace(0.0_f64, 1.0, 21).iter().map(|u| u * u).collect();
        let knots = parametric_knots(2, 6, &params);
        assert_eq!(knots.len(), 9);
        assert_eq!(&knots[..3], &[0.0; 3]);
        assert_eq!(&knots[6..], &[1.0; 3]);
        for j in 3..6 {
            assert!(knots[j] > knots[j - 1]);
        }
        // d = 20 / 4 = 5, first interior knot lands exactly on params[5]
        assert!((knots[3] - params[5]).abs() < 1e-15);
    }

    #[test]
    fn test_set_knots_param_idxs() {
        let x = linspace(0.0_f64, 1.0, 11);
        let domain = sample_grid(&[x], |p| p[0]);
        let input = PointSet::structured(domain, &[11]).unwrap();
        let mut model = ModelData::new(&[2], &[5], 0, 1).unwrap();
        model.set_knots(&input, KnotPlacement::Uniform).unwrap();
        // knots 0 0 0 1/3 2/3 1 1 1
        assert_eq!(model.tmesh.all_knot_param_idxs[0], vec![0, 0, 0, 4, 7, 10, 10, 10]);
    }

    #[test]
    fn test_find_span_tensor_skips_finer_knots() {
        let mut model = ModelData::<f64>::new(&[2], &[5], 0, 0).unwrap();
        // knots 0 0 0 1/3 2/3 1 1 1; refine the base, then add a coarse tensor over [0, 2/3]
        model.tmesh.insert_new_knot_in_dim(0, 0.5, 1, 0, 0).unwrap();
        model.tmesh.tensor_prods[0].level = 1;
        let t = model.tmesh.append_tensor(&[2], &[5], 0).unwrap();

        // 0.55 lies after the level-1 knot 0.5 (index 4), which tensor t cannot see
        assert_eq!(model.find_span(0, 0.55).unwrap(), 4);
        assert_eq!(model.find_span_tensor(0, 0.55, 0).unwrap(), 4);
        assert_eq!(model.find_span_tensor(0, 0.55, t).unwrap(), 3);
        assert!(model.find_span_tensor(0, 0.1, t).is_ok());
        assert!(matches!(
            model.find_span_tensor(0, 0.9, t),
            Err(MfaError::ParamOutsideTensor { .. })
        ));
    }
}
