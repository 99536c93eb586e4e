//! Adaptive refinement: encode, measure the error at every sample, split the knot spans
//! where it is too large, and repeat.
//!
//! Every round re-encodes tensor product 0 over the full global knot set, then refreshes the
//! finer tensor products from it at identical anchors, so the T-mesh as a whole always
//! represents the latest fit. New knots are span midpoints inserted at one level above the
//! current finest, and each round appends one tensor product at that level around them.
use super::{EncodeSummary, Encoder};
use crate::config::{AdaptiveOptions, EncodeOptions};
use crate::decode::Decoder;
use crate::error::{MfaError, MfaResult};
use crate::model::param_idx;
use crate::tmesh::KnotIdx;
use crate::volume::VolIterator;
use crate::{cast, to_f64, Real};

/// How an adaptive encode ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdaptiveOutcome {
    /// Every sample is within the error limit
    Converged { rounds: usize },
    /// Further splitting would need at least as many control points as samples in some
    /// dimension, or no span over the limit can be split between samples
    ControlPointsExceedSamples { rounds: usize },
    /// The round cap was reached first
    RoundLimit { rounds: usize },
}

impl AdaptiveOutcome {
    /// Encode rounds performed
    pub fn rounds(&self) -> usize {
        match *self {
            AdaptiveOutcome::Converged { rounds }
            | AdaptiveOutcome::ControlPointsExceedSamples { rounds }
            | AdaptiveOutcome::RoundLimit { rounds } => rounds,
        }
    }

    pub fn converged(&self) -> bool {
        matches!(self, AdaptiveOutcome::Converged { .. })
    }
}

/// Knot span along one dimension chosen for splitting
#[derive(Clone, Copy, Debug)]
struct Split<T> {
    mid: T,
    param_idx: usize,
}

impl<'a, T: Real> Encoder<'a, T> {
    /// Refine the model until every sample is within `opts.err_limit`.
    ///
    /// The model must hold knots for the input already (see [`crate::ModelData::set_knots`]);
    /// its initial control-point counts are those of the global knot sequences.
    ///
    /// # Errors
    /// * If the input is unstructured or does not match the model
    /// * If `opts.extents` does not have one entry per model coordinate
    /// * If an encode or knot insertion fails
    pub fn adaptive_encode(&mut self, opts: &AdaptiveOptions<T>) -> MfaResult<AdaptiveOutcome> {
        self.check_input()?;
        let pt_dim = self.model.pt_dim();
        if let Some(extents) = &opts.extents {
            if extents.len() != pt_dim {
                return Err(MfaError::DimensionMismatch(format!(
                    "{} extents for {pt_dim} model coordinates",
                    extents.len()
                )));
            }
        }
        let enc_opts = EncodeOptions {
            weighted: opts.weighted,
            weights: opts.weights,
        };

        let mut round = 0;
        loop {
            round += 1;
            let summary = self.refit(&enc_opts)?;
            let errs = self.sample_errors(opts)?;
            self.model.max_err = errs.iter().fold(T::zero(), |a, &b| worse(a, b));
            log::debug!(
                "round {round}: nctrl {:?}, max error {}, {} degraded curves",
                self.model.tmesh.tensor(0)?.nctrl_pts,
                self.model.max_err,
                summary.degraded_curves
            );

            let (splits, over_limit) = self.find_splits(&errs, opts.err_limit)?;
            if over_limit == 0 {
                log::info!("adaptive encode converged after {round} rounds");
                return Ok(AdaptiveOutcome::Converged { rounds: round });
            }
            let nsplits: usize = splits.iter().map(|s| s.len()).sum();
            let ndom_pts = self.input.ndom_pts();
            let saturated = (0..self.model.dom_dim)
                .any(|k| self.model.tmesh.nctrl_global(k) + splits[k].len() >= ndom_pts[k]);
            if nsplits == 0 || saturated {
                log::info!(
                    "adaptive encode stopped after {round} rounds: {over_limit} spans over the limit cannot be split further"
                );
                return Ok(AdaptiveOutcome::ControlPointsExceedSamples { rounds: round });
            }
            if opts.max_rounds.is_some_and(|m| round >= m) {
                log::info!("adaptive encode hit the round limit of {round}");
                return Ok(AdaptiveOutcome::RoundLimit { rounds: round });
            }

            self.refine(&splits)?;
        }
    }

    /// Encode the base tensor product over every global knot and refresh the others from it
    fn refit(&mut self, opts: &EncodeOptions) -> MfaResult<EncodeSummary> {
        let dom_dim = self.model.dom_dim;
        let nctrl_pts: Vec<usize> = (0..dom_dim)
            .map(|k| self.model.tmesh.nctrl_global(k))
            .collect();
        let (ctrl_pts, weights, summary) = self.encode(&nctrl_pts, opts)?;

        let tmesh = &mut self.model.tmesh;
        let level = tmesh.max_level();
        let knot_maxs: Vec<KnotIdx> = (0..dom_dim).map(|k| tmesh.nknots(k) - 1).collect();
        let base = tmesh.tensor_mut(0)?;
        base.knot_mins = vec![0; dom_dim];
        base.knot_maxs = knot_maxs;
        base.nctrl_pts = nctrl_pts;
        base.ctrl_pts = ctrl_pts;
        base.weights = weights;
        base.level = level;

        for t in 1..tmesh.tensor_prods.len() {
            tmesh.relevel_tensor(t, level)?;
            tmesh.sync_from(0, t)?;
        }
        Ok(summary)
    }

    /// Largest coordinate error of every input point against the base tensor product
    fn sample_errors(&self, opts: &AdaptiveOptions<T>) -> MfaResult<Vec<T>> {
        let model = &*self.model;
        let pt_dim = model.pt_dim();
        let decoder = Decoder::new(model)?;
        let mut approx = self.input.like(pt_dim);
        decoder.decode_point_set(&mut approx, 0, pt_dim - 1, &[], true)?;

        let errs = (0..self.input.npts())
            .map(|i| {
                (0..pt_dim).fold(T::zero(), |worst, c| {
                    let mut e = (approx.domain[[i, c]] - self.input.domain[[i, model.min_dim + c]]).abs();
                    if let Some(extents) = &opts.extents {
                        if extents[c] > T::zero() {
                            e = e / extents[c];
                        }
                    }
                    worse(worst, e)
                })
            })
            .collect();
        Ok(errs)
    }

    /// Midpoints of the knot spans whose worst sample error exceeds `limit`, per dimension
    /// in increasing order, and the number of such spans including unsplittable ones.
    ///
    /// A span can be split only if it holds samples on both sides of its midpoint.
    fn find_splits(&self, errs: &[T], limit: T) -> MfaResult<(Vec<Vec<Split<T>>>, usize)> {
        let dom_dim = self.model.dom_dim;
        let ndom_pts = self.input.ndom_pts();
        let half: T = cast(0.5);

        let mut spans: Vec<Vec<KnotIdx>> = Vec::with_capacity(dom_dim);
        let mut worst: Vec<Vec<T>> = Vec::with_capacity(dom_dim);
        for k in 0..dom_dim {
            let params = self.input.params.grid(k).ok_or(MfaError::UnstructuredInput)?;
            let s = params
                .iter()
                .map(|&u| self.model.find_span(k, u))
                .collect::<MfaResult<Vec<_>>>()?;
            spans.push(s);
            worst.push(vec![T::zero(); self.model.tmesh.nknots(k)]);
        }

        let mut it = VolIterator::new(ndom_pts);
        while !it.done() {
            let e = errs[it.cur_iter()];
            for k in 0..dom_dim {
                let s = spans[k][it.idx_dim(k)];
                worst[k][s] = worse(worst[k][s], e);
            }
            it.incr_iter();
        }

        let mut splits = Vec::with_capacity(dom_dim);
        let mut over_limit = 0;
        for k in 0..dom_dim {
            let knots = &self.model.tmesh.all_knots[k];
            let params = self.input.params.grid(k).ok_or(MfaError::UnstructuredInput)?;
            let mut dim_splits = Vec::new();
            for (s, &w) in worst[k].iter().enumerate() {
                if w <= limit {
                    continue;
                }
                over_limit += 1;
                let mid = (knots[s] + knots[s + 1]) * half;
                let in_span = spans[k].iter().zip(params).filter(|&(&sp, _)| sp == s);
                let (below, above) = in_span.fold((false, false), |(b, a), (_, &u)| (b || u < mid, a || u >= mid));
                if below && above {
                    dim_splits.push(Split {
                        mid,
                        param_idx: param_idx(params, mid),
                    });
                } else {
                    log::debug!("dimension {k}: span {s} at {} has samples on one side only", to_f64(mid));
                }
            }
            splits.push(dim_splits);
        }
        Ok((splits, over_limit))
    }

    /// Insert the split knots one level above the current finest and add a tensor product
    /// around them
    fn refine(&mut self, splits: &[Vec<Split<T>>]) -> MfaResult<()> {
        let dom_dim = self.model.dom_dim;
        let tmesh = &mut self.model.tmesh;
        let level = tmesh.max_level() + 1;
        let ntensors = tmesh.tensor_prods.len();

        let mut inserted: Vec<Vec<KnotIdx>> = vec![Vec::new(); dom_dim];
        for k in 0..dom_dim {
            for split in &splits[k] {
                let idx = tmesh.insert_new_knot_in_dim(k, split.mid, level, 0, split.param_idx)?;
                for t in 1..ntensors {
                    let tensor = tmesh.tensor(t)?;
                    if !(tensor.knot_mins[k] < idx && idx < tensor.knot_maxs[k]) {
                        continue;
                    }
                    match tmesh.insert_existing_knot_in_dim(k, idx, t) {
                        Ok(()) => {}
                        // the next refit rebuilds the tensor product at the new level
                        Err(MfaError::ParamOutsideTensor { .. } | MfaError::LevelMismatch { .. }) => {
                            log::debug!("tensor product {t}: knot {idx} of dimension {k} deferred to the refit");
                        }
                        Err(e) => return Err(e),
                    }
                }
                inserted[k].push(idx);
            }
        }

        let mut knot_mins = vec![0; dom_dim];
        let mut knot_maxs = vec![0; dom_dim];
        for k in 0..dom_dim {
            let p = tmesh.degree[k];
            let h = (p + 1) / 2;
            let pad = p.saturating_sub(1).max(1);
            let last = tmesh.nknots(k) - 1;
            match (inserted[k].iter().min(), inserted[k].iter().max()) {
                (Some(&lo), Some(&hi)) => {
                    let lo = lo.saturating_sub(pad);
                    let hi = (hi + pad).min(last);
                    knot_mins[k] = if lo < h { 0 } else { lo };
                    knot_maxs[k] = if hi + h >= last { last } else { hi };
                }
                _ => knot_maxs[k] = last,
            }
        }
        let t = tmesh.append_tensor(&knot_mins, &knot_maxs, level)?;
        tmesh.sync_from(0, t)?;
        Ok(())
    }
}

/// Larger of two errors; NaN wins so a failed decode never looks converged
fn worse<T: Real>(worst: T, e: T) -> T {
    if e.is_nan() || e > worst {
        e
    } else {
        worst
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::KnotPlacement;
    use crate::model::ModelData;
    use crate::param::PointSet;
    use crate::utils::*;
    use std::f64::consts::PI;

    fn sincos_input(n: usize) -> PointSet<f64> {
        let axes = vec![linspace(0.0_f64, 1.0, n), linspace(0.0_f64, 1.0, n)];
        let domain = sample_grid(&axes, |p| (2.0 * PI * p[0]).sin() * (2.0 * PI * p[1]).cos());
        PointSet::structured(domain, &[n, n]).unwrap()
    }

    #[test]
    fn test_sincos_converges() {
        let input = sincos_input(20);
        let mut model = ModelData::new(&[3, 3], &[4, 4], 0, 2).unwrap();
        model.set_knots(&input, KnotPlacement::Uniform).unwrap();
        let outcome = Encoder::new(&mut model, &input)
            .adaptive_encode(&AdaptiveOptions::with_err_limit(1e-3))
            .unwrap();
        assert!(outcome.converged(), "{outcome:?}");
        assert!(model.max_err <= 1e-3);
        assert!(model.tmesh.tensor_prods.len() > 1);
        for k in 0..2 {
            assert!(model.tmesh.nctrl_global(k) < 20);
        }
    }

    #[test]
    fn test_round_limit() {
        let input = sincos_input(20);
        let mut model = ModelData::new(&[3, 3], &[4, 4], 0, 2).unwrap();
        model.set_knots(&input, KnotPlacement::Uniform).unwrap();
        let opts = AdaptiveOptions {
            max_rounds: Some(1),
            ..AdaptiveOptions::with_err_limit(1e-3)
        };
        let outcome = Encoder::new(&mut model, &input).adaptive_encode(&opts).unwrap();
        assert_eq!(outcome, AdaptiveOutcome::RoundLimit { rounds: 1 });
        // nothing refined after the last encode
        assert_eq!(model.tmesh.tensor_prods.len(), 1);
        assert!(model.max_err > 1e-3);
    }

    #[test]
    fn test_unreachable_limit_stops_on_samples() {
        let n = 8;
        let x = linspace(0.0_f64, 1.0, n);
        let domain = sample_grid(&[x], |p| (7.0 * p[0]).sin());
        let input = PointSet::structured(domain, &[n]).unwrap();
        let mut model = ModelData::new(&[2], &[3], 0, 1).unwrap();
        model.set_knots(&input, KnotPlacement::Uniform).unwrap();
        let outcome = Encoder::new(&mut model, &input)
            .adaptive_encode(&AdaptiveOptions::with_err_limit(1e-14))
            .unwrap();
        assert!(matches!(outcome, AdaptiveOutcome::ControlPointsExceedSamples { .. }));
        assert!(model.tmesh.nctrl_global(0) < n);
    }

    #[test]
    fn test_nan_error_is_over_limit() {
        assert!(worse(0.5, f64::NAN).is_nan());
        assert!(worse(f64::NAN, 0.5).is_nan());
        assert_eq!(worse(0.5, 0.25), 0.5);

        let n = 20;
        let input = sincos_input(n);
        let mut model = ModelData::new(&[3, 3], &[4, 4], 0, 2).unwrap();
        model.set_knots(&input, KnotPlacement::Uniform).unwrap();
        let enc = Encoder::new(&mut model, &input);
        let mut errs = vec![0.0; n * n];
        assert_eq!(enc.find_splits(&errs, 1e-3).unwrap().1, 0);
        errs[n * (n / 2) + n / 2] = f64::NAN;
        let (splits, over_limit) = enc.find_splits(&errs, 1e-3).unwrap();
        assert_eq!(over_limit, 2);
        assert!(splits.iter().all(|s| s.len() == 1));
    }

    #[test]
    fn test_nan_sample_never_converges() {
        let n = 12;
        let x = linspace(0.0_f64, 1.0, n);
        let mut domain = sample_grid(&[x], |p| p[0] * p[0]);
        domain[[5, 1]] = f64::NAN;
        let input = PointSet::structured(domain, &[n]).unwrap();
        let mut model = ModelData::new(&[2], &[3], 0, 1).unwrap();
        model.set_knots(&input, KnotPlacement::Uniform).unwrap();
        let result = Encoder::new(&mut model, &input).adaptive_encode(&AdaptiveOptions::with_err_limit(1e-3));
        if let Ok(outcome) = result {
            assert!(!outcome.converged(), "{outcome:?}");
        }
    }

    #[test]
    fn test_extents_validated() {
        let input = sincos_input(6);
        let mut model = ModelData::new(&[2, 2], &[3, 3], 0, 2).unwrap();
        model.set_knots(&input, KnotPlacement::Uniform).unwrap();
        let opts = AdaptiveOptions {
            extents: Some(vec![1.0]),
            ..AdaptiveOptions::default()
        };
        assert!(Encoder::new(&mut model, &input).adaptive_encode(&opts).is_err());
    }
}
