//! Convenience methods for constructing sample grids in a way that echoes,
//! but does not exactly match, methods common in scripting languages.
use crate::{cast, Real};
use itertools::Itertools;
use ndarray::Array2;

/// Generates evenly spaced values from start to stop,
/// including the endpoint.
pub fn linspace<T>(start: T, stop: T, n: usize) -> Vec<T>
where
    T: Real,
{
    if n < 2 {
        return vec![start; n];
    }
    let dx: T = (stop - start) / cast::<T, _>(n - 1);
    (0..n).map(|i| start + cast::<T, _>(i) * dx).collect()
}

/// Generates a meshgrid with the first coordinate varying fastest
/// (x0, y0, z0, x1, y0, z0, ..., xn, yn, zn), matching control-point order.
pub fn meshgrid<T>(x: Vec<&Vec<T>>) -> Vec<Vec<T>>
where
    T: Real,
{
    x.into_iter()
        .rev()
        .multi_cartesian_product()
        .map(|xx| xx.iter().rev().map(|y| **y).collect())
        .collect()
}

/// Builds a structured sample matrix from grid axes and a field evaluated at each grid point.
///
/// Columns are the grid coordinates followed by the field value, rows follow [`meshgrid`] order.
pub fn sample_grid<T, F>(axes: &[Vec<T>], f: F) -> Array2<T>
where
    T: Real,
    F: Fn(&[T]) -> T,
{
    let ndims = axes.len();
    let pts = meshgrid(axes.iter().collect());
    let mut domain = Array2::<T>::zeros((pts.len(), ndims + 1));
    for (i, pt) in pts.iter().enumerate() {
        for j in 0..ndims {
            domain[[i, j]] = pt[j];
        }
        domain[[i, ndims]] = f(pt);
    }
    domain
}
