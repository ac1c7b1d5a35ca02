//! Reconstruction model — factors plus warps to a predicted tensor.
//!
//! Purpose
//! -------
//! Combine the current factor matrices and the forward warp operator
//! into a predicted (trial × time × channel) tensor: shared time
//! factors are interpolated at each trial's warp positions, optionally
//! scaled by that trial's factor row, then contracted with the neuron
//! factors over the component axis. Pure functions of the parameter
//! values; no state is read or written.

use crate::core::factors::FactorSet;
use crate::warp::{warp_time_factors, WarpSet, WarpedFactors};
use ndarray::{Array2, Array3};

/// Contract warped (and optionally trial-scaled) time factors with the
/// neuron factors: `pred[i, t, c] = Σ_k scaled[i, t, k] · neuron[c, k]`.
pub fn combine_factors(
    warped: &Array3<f64>, trial: Option<&Array2<f64>>, neuron: &Array2<f64>,
) -> Array3<f64> {
    let (n_trials, n_t, n_components) = warped.dim();
    let n_channels = neuron.nrows();
    let mut pred = Array3::<f64>::zeros((n_trials, n_t, n_channels));
    for i in 0..n_trials {
        for t in 0..n_t {
            for c in 0..n_channels {
                let mut acc = 0.0;
                for k in 0..n_components {
                    let scale = trial.map_or(1.0, |a| a[[i, k]]);
                    acc += scale * warped[[i, t, k]] * neuron[[c, k]];
                }
                pred[[i, t, c]] = acc;
            }
        }
    }
    pred
}

/// Predicted tensor from the current parameters, together with the
/// interpolation cache the gradient pass reuses.
pub fn predict_with_cache(factors: &FactorSet, warp: &WarpSet) -> (Array3<f64>, WarpedFactors) {
    let time = factors.time();
    let neuron = factors.neuron();
    let trial = factors.trial();
    let positions = warp.positions();
    let cache = warp_time_factors(time.view(), &positions);
    let pred = combine_factors(&cache.warped, trial.as_ref(), &neuron);
    (pred, cache)
}

/// Predicted tensor from the current parameters.
pub fn predict_tensor(factors: &FactorSet, warp: &WarpSet) -> Array3<f64> {
    predict_with_cache(factors, warp).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warp::{WarpInit, WarpType};
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    // Purpose
    // -------
    // With identity warps the prediction is the plain factor product,
    // and trial rows scale whole trials.
    fn identity_warp_reduces_to_factor_product() {
        let factors = FactorSet {
            time_raw: array![[1.0], [2.0], [3.0]],
            neuron_raw: array![[0.5], [2.0]],
            trial_raw: Some(array![[1.0], [2.0]]),
            nonneg: false,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let warp = WarpSet::generate(
            2, 3, 3, WarpType::Shift, WarpInit::Identity, None, None, &mut rng,
        )
        .unwrap();

        let pred = predict_tensor(&factors, &warp);
        assert_eq!(pred.dim(), (2, 3, 2));
        assert_abs_diff_eq!(pred[[0, 1, 0]], 2.0 * 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(pred[[1, 1, 0]], 2.0 * 2.0 * 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(pred[[1, 2, 1]], 2.0 * 3.0 * 2.0, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // A pure shift warp slides the time profile within each trial.
    fn shifted_warp_translates_time_profile() {
        let factors = FactorSet {
            time_raw: array![[0.0], [1.0], [2.0], [3.0]],
            neuron_raw: array![[1.0]],
            trial_raw: None,
            nonneg: false,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let mut warp = WarpSet::generate(
            1, 4, 4, WarpType::Shift, WarpInit::Identity, None, None, &mut rng,
        )
        .unwrap();
        warp.params[[0, 0]] = 1.0;

        let pred = predict_tensor(&factors, &warp);
        // Position of t = 1 is 2.0, so the ramp reads its value at 2.
        assert_abs_diff_eq!(pred[[0, 1, 0]], 2.0, epsilon = 1e-12);
        // Past the end the position clamps to the last sample.
        assert_abs_diff_eq!(pred[[0, 3, 0]], 3.0, epsilon = 1e-12);
    }
}
