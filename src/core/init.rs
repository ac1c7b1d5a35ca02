//! Low-rank warm start for the factor matrices.
//!
//! Purpose
//! -------
//! Produce initial time, neuron, and (optional) trial factors from the
//! masked raw data, ignoring missing entries and trailing padding, so
//! the optimizer starts near a sensible factorization instead of noise.
//!
//! Key behaviors
//! -------------
//! - Averages the tensor across trials into a (time × channel) matrix
//!   using only mask-valid entries before each trial's last-valid
//!   index; cells nobody observed fall back to their channel mean.
//! - Takes a rank-K truncated SVD of the mean matrix (via the
//!   ndarray → nalgebra copy bridge) and splits each singular value's
//!   weight √σ-evenly between the time and neuron factors.
//! - Flips each component's sign so its time profile is predominantly
//!   positive (SVD sign ambiguity), then linearly resamples the time
//!   factors onto the shared axis when its length differs from the
//!   trial axis.
//! - When nonnegative factors are requested, effective warm-start
//!   values are clamped to a small positive floor and mapped through
//!   the inverse positivity transform into the raw domain.
//!
//! Invariants & assumptions
//! ------------------------
//! - Fails before any linear algebra when a channel or timepoint has no
//!   valid observation anywhere, or when the component count exceeds
//!   the rank the mean matrix can support.

use crate::core::factors::FactorSet;
use crate::core::mask::MaskedDataset;
use crate::model::errors::{ModelError, ModelResult};
use crate::numerics::safe_softplus_inv;
use crate::warp::lerp_row;
use nalgebra::DMatrix;
use ndarray::Array2;

/// Floor applied to effective warm-start values before mapping into the
/// raw domain of the positivity transform.
const NONNEG_FLOOR: f64 = 1e-3;

/// Compute warm-start factors from masked data.
///
/// # Arguments
/// - `data`: masked dataset (values, mask, last-valid indices).
/// - `n_components`: target rank K.
/// - `fit_trial_factors`: whether to produce a trial-factor matrix
///   (initialized flat at one, so the time/neuron warm start carries
///   the structure).
/// - `nonneg`: whether the model applies the positivity transform on
///   read; warm-start values are mapped into the matching raw domain.
/// - `shared_length`: length of the canonical time axis.
///
/// # Errors
/// - [`ModelError::ChannelNeverObserved`] / [`ModelError::TimepointNeverObserved`]
///   when a channel or timepoint has zero valid observations anywhere.
/// - [`ModelError::InvalidComponentCount`] when K exceeds min(T, C).
pub fn lowrank_factors(
    data: &MaskedDataset, n_components: usize, fit_trial_factors: bool, nonneg: bool,
    shared_length: usize,
) -> ModelResult<FactorSet> {
    let n_trials = data.n_trials();
    let n_t = data.n_timepoints();
    let n_channels = data.n_channels();

    validate_coverage(data)?;
    if n_components > n_t.min(n_channels) {
        return Err(ModelError::InvalidComponentCount {
            n_components,
            reason: "component count exceeds min(n_timepoints, n_channels)",
        });
    }

    let mean = masked_trial_mean(data)?;

    // ndarray → nalgebra copy bridge, then thin SVD.
    let mut mean_nalg = DMatrix::<f64>::zeros(n_t, n_channels);
    for t in 0..n_t {
        for c in 0..n_channels {
            mean_nalg[(t, c)] = mean[[t, c]];
        }
    }
    let svd = mean_nalg.svd(true, true);
    let u = svd.u.ok_or(ModelError::LeastSquaresFailed { reason: "SVD did not return U" })?;
    let v_t =
        svd.v_t.ok_or(ModelError::LeastSquaresFailed { reason: "SVD did not return Vᵀ" })?;

    let mut time = Array2::<f64>::zeros((n_t, n_components));
    let mut neuron = Array2::<f64>::zeros((n_channels, n_components));
    for k in 0..n_components {
        let weight = svd.singular_values[k].max(0.0).sqrt();
        for t in 0..n_t {
            time[[t, k]] = u[(t, k)] * weight;
        }
        for c in 0..n_channels {
            neuron[[c, k]] = v_t[(k, c)] * weight;
        }
        // Sign fix: make the time profile predominantly positive.
        let column_sum: f64 = (0..n_t).map(|t| time[[t, k]]).sum();
        if column_sum < 0.0 {
            for t in 0..n_t {
                time[[t, k]] = -time[[t, k]];
            }
            for c in 0..n_channels {
                neuron[[c, k]] = -neuron[[c, k]];
            }
        }
    }

    if shared_length != n_t {
        time = resample_rows(&time, shared_length);
    }

    let trial = if fit_trial_factors {
        Some(Array2::<f64>::ones((n_trials, n_components)))
    } else {
        None
    };

    if nonneg {
        let to_raw = |m: &Array2<f64>| m.mapv(|v| safe_softplus_inv(v.max(NONNEG_FLOOR)));
        Ok(FactorSet {
            time_raw: to_raw(&time),
            neuron_raw: to_raw(&neuron),
            trial_raw: trial.as_ref().map(to_raw),
            nonneg,
        })
    } else {
        Ok(FactorSet { time_raw: time, neuron_raw: neuron, trial_raw: trial, nonneg })
    }
}

// ---- Helper methods ----

/// Reject datasets with a never-observed channel or timepoint.
fn validate_coverage(data: &MaskedDataset) -> ModelResult<()> {
    let (n_trials, n_t, n_channels) = data.values.dim();
    for c in 0..n_channels {
        let seen = (0..n_trials)
            .any(|i| (0..n_t).any(|t| data.mask[[i, t, c]] == 1.0));
        if !seen {
            return Err(ModelError::ChannelNeverObserved { channel: c });
        }
    }
    for t in 0..n_t {
        let seen = (0..n_trials)
            .any(|i| (0..n_channels).any(|c| data.mask[[i, t, c]] == 1.0));
        if !seen {
            return Err(ModelError::TimepointNeverObserved { timepoint: t });
        }
    }
    Ok(())
}

/// Mask-weighted mean across trials, restricted to each trial's valid
/// span; unobserved cells fall back to the channel mean.
fn masked_trial_mean(data: &MaskedDataset) -> ModelResult<Array2<f64>> {
    let (n_trials, n_t, n_channels) = data.values.dim();
    let mut sums = Array2::<f64>::zeros((n_t, n_channels));
    let mut counts = Array2::<f64>::zeros((n_t, n_channels));
    for i in 0..n_trials {
        for t in 0..data.last_idx[i].min(n_t) {
            for c in 0..n_channels {
                sums[[t, c]] += data.values[[i, t, c]];
                counts[[t, c]] += data.mask[[i, t, c]];
            }
        }
    }

    // Channel means over observed cells (coverage was validated, but the
    // last-idx restriction can empty a channel; fall back to the whole
    // tensor in that case).
    let mut channel_mean = vec![0.0; n_channels];
    for c in 0..n_channels {
        let total: f64 = (0..n_t).map(|t| sums[[t, c]]).sum();
        let count: f64 = (0..n_t).map(|t| counts[[t, c]]).sum();
        if count > 0.0 {
            channel_mean[c] = total / count;
        } else {
            let mut total = 0.0;
            let mut count = 0.0;
            for i in 0..n_trials {
                for t in 0..n_t {
                    total += data.values[[i, t, c]];
                    count += data.mask[[i, t, c]];
                }
            }
            channel_mean[c] = total / count;
        }
    }

    let mut mean = Array2::<f64>::zeros((n_t, n_channels));
    for t in 0..n_t {
        for c in 0..n_channels {
            mean[[t, c]] = if counts[[t, c]] > 0.0 {
                sums[[t, c]] / counts[[t, c]]
            } else {
                channel_mean[c]
            };
        }
    }
    Ok(mean)
}

/// Linearly resample each column of a (T × K) matrix to `new_len` rows.
fn resample_rows(matrix: &Array2<f64>, new_len: usize) -> Array2<f64> {
    let (old_len, n_cols) = matrix.dim();
    let mut out = Array2::<f64>::zeros((new_len, n_cols));
    let step = (old_len as f64 - 1.0) / (new_len as f64 - 1.0);
    for k in 0..n_cols {
        let column = matrix.column(k);
        for s in 0..new_len {
            out[[s, k]] = lerp_row(column, step * s as f64);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, Array3};

    fn rank_one_tensor(n_trials: usize, n_t: usize, n_channels: usize) -> Array3<f64> {
        Array3::from_shape_fn((n_trials, n_t, n_channels), |(_, t, c)| {
            ((t as f64 * 0.4).sin() + 1.5) * (c as f64 + 1.0)
        })
    }

    #[test]
    // Purpose
    // -------
    // On exact rank-one data with no missing entries, the rank-one warm
    // start reproduces the mean matrix.
    fn warm_start_reproduces_rank_one_data() {
        let raw = rank_one_tensor(3, 12, 4);
        let data = MaskedDataset::new(&raw);
        let factors = lowrank_factors(&data, 1, false, false, 12).unwrap();

        let time = factors.time();
        let neuron = factors.neuron();
        let recon: Array2<f64> = time.dot(&neuron.t());
        for t in 0..12 {
            for c in 0..4 {
                assert_abs_diff_eq!(recon[[t, c]], raw[[0, t, c]], epsilon = 1e-8);
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // A channel that is NaN everywhere is an insufficient-data error,
    // not a silent zero fill.
    fn never_observed_channel_is_rejected() {
        let mut raw = rank_one_tensor(2, 6, 3);
        for i in 0..2 {
            for t in 0..6 {
                raw[[i, t, 1]] = f64::NAN;
            }
        }
        let data = MaskedDataset::new(&raw);
        let err = lowrank_factors(&data, 1, false, false, 6).unwrap_err();
        assert_eq!(err, ModelError::ChannelNeverObserved { channel: 1 });
    }

    #[test]
    // Purpose
    // -------
    // A timepoint that is NaN in every trial and channel is rejected.
    fn never_observed_timepoint_is_rejected() {
        let mut raw = rank_one_tensor(2, 6, 3);
        for i in 0..2 {
            for c in 0..3 {
                raw[[i, 4, c]] = f64::NAN;
            }
        }
        let data = MaskedDataset::new(&raw);
        let err = lowrank_factors(&data, 1, false, false, 6).unwrap_err();
        assert_eq!(err, ModelError::TimepointNeverObserved { timepoint: 4 });
    }

    #[test]
    // Purpose
    // -------
    // Requesting more components than min(T, C) fails fast.
    fn oversized_component_count_is_rejected() {
        let data = MaskedDataset::new(&rank_one_tensor(2, 6, 3));
        let err = lowrank_factors(&data, 4, false, false, 6).unwrap_err();
        assert!(matches!(err, ModelError::InvalidComponentCount { n_components: 4, .. }));
    }

    #[test]
    // Purpose
    // -------
    // With nonneg set, raw warm-start factors rectify back to values
    // close to the unconstrained warm start (data here is positive).
    fn nonneg_warm_start_round_trips_through_rectifier() {
        let raw = rank_one_tensor(2, 10, 3);
        let data = MaskedDataset::new(&raw);
        let plain = lowrank_factors(&data, 1, false, false, 10).unwrap();
        let rect = lowrank_factors(&data, 1, false, true, 10).unwrap();

        let plain_time = plain.time();
        let rect_time = rect.time();
        for t in 0..10 {
            if plain_time[[t, 0]] > NONNEG_FLOOR {
                assert_abs_diff_eq!(rect_time[[t, 0]], plain_time[[t, 0]], epsilon = 1e-6);
            }
        }
    }

    #[test]
    // Purpose
    // -------
    // Resampling to a different shared length preserves the endpoints
    // and produces the requested number of rows.
    fn warm_start_resamples_to_shared_length() {
        let raw = rank_one_tensor(2, 8, 3);
        let data = MaskedDataset::new(&raw);
        let factors = lowrank_factors(&data, 1, false, false, 15).unwrap();
        assert_eq!(factors.time_raw.dim(), (15, 1));
    }
}
