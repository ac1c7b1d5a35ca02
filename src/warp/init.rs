//! Warp parameter initialization.
//!
//! Purpose
//! -------
//! Fill a freshly constructed [`WarpSet`] with starting parameters for
//! one of the four strategies: `identity`, `linear` (stretch each
//! trial's valid span onto the shared axis), `shift` (cross-correlation
//! lag against the across-trial reference trace), and `randn` (identity
//! plus a small Gaussian perturbation to break symmetry while starting
//! near a sane solution).
//!
//! Invariants & assumptions
//! ------------------------
//! - Every produced parameter set yields strictly increasing positions;
//!   the strategies only ever emit positive increments and finite
//!   offsets.
//! - Data-driven strategies read only entries the mask marks valid and
//!   only timepoints before each trial's last-valid index, so trailing
//!   padding cannot influence the starting alignment.

use crate::core::mask::MaskedDataset;
use crate::numerics::safe_softplus_inv;
use crate::warp::errors::{WarpError, WarpResult};
use crate::warp::{WarpInit, WarpSet, WarpType};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

/// Standard deviation of the `randn` perturbation on offsets and
/// nonlinear increments (shared-axis units).
const RANDN_OFFSET_STD: f64 = 0.1;

/// Standard deviation of the `randn` perturbation on log-scales.
const RANDN_LOGSCALE_STD: f64 = 0.05;

/// Dispatch one initialization strategy onto `set.params`.
pub fn initialize(
    set: &mut WarpSet, warpinit: WarpInit, data: Option<&MaskedDataset>, rng: &mut StdRng,
) -> WarpResult<()> {
    match warpinit {
        WarpInit::Identity => {
            identity(set);
            Ok(())
        }
        WarpInit::Linear => {
            let data = data.ok_or(WarpError::MissingInitData { warpinit })?;
            linear(set, data)
        }
        WarpInit::Shift => {
            let data = data.ok_or(WarpError::MissingInitData { warpinit })?;
            shift(set, data)
        }
        WarpInit::Randn => {
            identity(set);
            randn(set, rng);
            Ok(())
        }
    }
}

/// Identity warp: every family's neutral parameters.
fn identity(set: &mut WarpSet) {
    let alpha = set.base_scale();
    set.params.fill(0.0);
    if set.warptype == WarpType::Nonlinear {
        // Offset 0 plus constant increments of α reproduce α·t.
        let inc = safe_softplus_inv(alpha);
        for mut row in set.params.rows_mut() {
            for t in 1..row.len() {
                row[t] = inc;
            }
        }
    }
}

/// Stretch each trial's observed span onto the full shared axis.
///
/// A trial whose last fully-observed row sits at `L − 1` gets a stretch
/// of `(T − 1)/(L − 1)` so its valid span covers `[0, S − 1]` exactly.
fn linear(set: &mut WarpSet, data: &MaskedDataset) -> WarpResult<()> {
    if set.warptype == WarpType::Shift {
        return Err(WarpError::IncompatibleWarpInit {
            warptype: set.warptype,
            warpinit: WarpInit::Linear,
        });
    }
    let n_t = set.n_timepoints();
    let shared_top = set.shared_length() as f64 - 1.0;
    for (i, &last) in data.last_idx.iter().enumerate() {
        let span = last.clamp(2, n_t) as f64 - 1.0;
        let sigma = ((n_t as f64 - 1.0) / span).ln();
        match set.warptype {
            WarpType::Scale => set.params[[i, 0]] = sigma,
            WarpType::Affine => {
                set.params[[i, 0]] = sigma;
                set.params[[i, 1]] = 0.0;
            }
            WarpType::Nonlinear => {
                let inc = safe_softplus_inv(shared_top / span);
                set.params[[i, 0]] = 0.0;
                for t in 1..n_t {
                    set.params[[i, t]] = inc;
                }
            }
            WarpType::Shift => unreachable!(),
        }
    }
    Ok(())
}

/// Data-driven per-trial lag from cross-correlation.
///
/// Builds one mean trace per trial (mask-weighted mean over channels,
/// truncated at the last-valid index), cross-correlates each against
/// the across-trial reference, and converts the best integer lag into a
/// shared-axis offset `δ_i = −α·lag`.
fn shift(set: &mut WarpSet, data: &MaskedDataset) -> WarpResult<()> {
    if set.warptype == WarpType::Scale {
        return Err(WarpError::IncompatibleWarpInit {
            warptype: set.warptype,
            warpinit: WarpInit::Shift,
        });
    }
    let n_trials = data.n_trials();
    let n_t = set.n_timepoints();
    let alpha = set.base_scale();

    let traces = trial_traces(data, n_t);
    let reference = reference_trace(&traces, &data.last_idx, n_t);

    let max_lag = (n_t / 2) as i64;
    for i in 0..n_trials {
        let valid = data.last_idx[i];
        let mut best_lag = 0i64;
        let mut best_score = f64::NEG_INFINITY;
        for lag in -max_lag..=max_lag {
            let mut score = 0.0;
            let mut overlap = 0usize;
            for t in 0..n_t {
                let shifted = t as i64 + lag;
                if shifted >= 0 && (shifted as usize) < valid {
                    score += reference[t] * traces[i][shifted as usize];
                    overlap += 1;
                }
            }
            if overlap > 0 {
                score /= overlap as f64;
                if score > best_score {
                    best_score = score;
                    best_lag = lag;
                }
            }
        }
        let delta = -alpha * best_lag as f64;
        match set.warptype {
            WarpType::Shift => set.params[[i, 0]] = delta,
            WarpType::Affine => {
                set.params[[i, 0]] = 0.0;
                set.params[[i, 1]] = delta;
            }
            WarpType::Nonlinear => {
                let inc = safe_softplus_inv(alpha);
                set.params[[i, 0]] = delta;
                for t in 1..n_t {
                    set.params[[i, t]] = inc;
                }
            }
            WarpType::Scale => unreachable!(),
        }
    }
    Ok(())
}

/// Identity plus small Gaussian noise on every parameter.
fn randn(set: &mut WarpSet, rng: &mut StdRng) {
    let offset_noise = |rng: &mut StdRng| {
        RANDN_OFFSET_STD * rng.sample::<f64, _>(StandardNormal)
    };
    let logscale_noise = |rng: &mut StdRng| {
        RANDN_LOGSCALE_STD * rng.sample::<f64, _>(StandardNormal)
    };
    let warptype = set.warptype;
    for mut row in set.params.rows_mut() {
        match warptype {
            WarpType::Shift => row[0] += offset_noise(rng),
            WarpType::Scale => row[0] += logscale_noise(rng),
            WarpType::Affine => {
                row[0] += logscale_noise(rng);
                row[1] += offset_noise(rng);
            }
            WarpType::Nonlinear => {
                for v in row.iter_mut() {
                    *v += offset_noise(rng);
                }
            }
        }
    }
}

// ---- Helper methods ----

/// Mean-over-channels trace per trial, mean-centered over the valid
/// span; zero past the last-valid index.
fn trial_traces(data: &MaskedDataset, n_t: usize) -> Vec<Vec<f64>> {
    let n_trials = data.n_trials();
    let n_channels = data.n_channels();
    let mut traces = vec![vec![0.0; n_t]; n_trials];
    for i in 0..n_trials {
        let valid = data.last_idx[i];
        for t in 0..valid {
            let mut sum = 0.0;
            let mut count = 0.0;
            for c in 0..n_channels {
                sum += data.values[[i, t, c]];
                count += data.mask[[i, t, c]];
            }
            traces[i][t] = if count > 0.0 { sum / count } else { 0.0 };
        }
        if valid > 0 {
            let mean: f64 = traces[i][..valid].iter().sum::<f64>() / valid as f64;
            for v in traces[i][..valid].iter_mut() {
                *v -= mean;
            }
        }
    }
    traces
}

/// Across-trial mean of the per-trial traces, weighted by validity.
fn reference_trace(traces: &[Vec<f64>], last_idx: &[usize], n_t: usize) -> Vec<f64> {
    let mut reference = vec![0.0; n_t];
    let mut counts = vec![0.0; n_t];
    for (trace, &valid) in traces.iter().zip(last_idx) {
        for t in 0..valid {
            reference[t] += trace[t];
            counts[t] += 1.0;
        }
    }
    for t in 0..n_t {
        if counts[t] > 0.0 {
            reference[t] /= counts[t];
        }
    }
    reference
}
