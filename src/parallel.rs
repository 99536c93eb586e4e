//! Fork-join fan-out over independent units (curves, points) with worker-local scratch.
//!
//! With the `parallel` feature, units are distributed over the rayon thread pool and each
//! worker builds its own scratch once through `map_init`. Without it, the same closure runs
//! sequentially over a single scratch value.
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Map `f` over `0..n`, giving every call exclusive access to a worker-local scratch value.
///
/// Results are returned in unit order.
pub(crate) fn map_units<S, R, I, F>(n: usize, init: I, f: F) -> Vec<R>
where
    I: Fn() -> S + Sync + Send,
    F: Fn(&mut S, usize) -> R + Sync + Send,
    R: Send,
{
    #[cfg(feature = "parallel")]
    {
        (0..n).into_par_iter().map_init(init, f).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        map_units_seq(n, init, f)
    }
}

/// Sequential [`map_units`] over a single scratch value
#[cfg_attr(feature = "parallel", allow(dead_code))]
pub(crate) fn map_units_seq<S, R, I, F>(n: usize, init: I, f: F) -> Vec<R>
where
    I: Fn() -> S,
    F: Fn(&mut S, usize) -> R,
{
    let mut scratch = init();
    (0..n).map(|i| f(&mut scratch, i)).collect()
}
