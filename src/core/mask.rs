//! Missing-data masking for trial-structured tensors.
//!
//! Purpose
//! -------
//! Derive, from a raw (trial × time × channel) tensor that may contain
//! NaN entries, everything the rest of the model needs to ignore missing
//! data: a NaN-zeroed copy safe for dense linear algebra, a same-shape
//! {0,1} validity mask that governs loss weighting, and a per-trial
//! last-valid index bounding each trial's usable span.
//!
//! Key behaviors
//! -------------
//! - The zero fill exists only so matrix products stay finite; it never
//!   contributes to the objective because every residual is multiplied
//!   by the mask before being squared and summed.
//! - The last-valid index for a trial is `T − r`, where `r` is the index
//!   of the first fully-observed row found scanning backward from the
//!   end. Trailing rows with any missing channel are treated as padding
//!   and excluded from warp initialization and warm-start statistics.
//!
//! Invariants & assumptions
//! ------------------------
//! - `mask[i, t, c] == 1.0` exactly when `raw[i, t, c]` is finite.
//! - `values[i, t, c] == raw[i, t, c]` on valid entries and `0.0`
//!   elsewhere.
//! - Degenerate trials (no fully-observed row anywhere) get
//!   `last_idx == n_timepoints`: the whole trial is treated as usable by
//!   the index consumers. This over-estimates validity, but the mask —
//!   not the index — weights the loss, so no missing entry can leak into
//!   the objective either way.

use ndarray::Array3;

/// Validated, masked view of one fitting dataset.
///
/// Owns the NaN-zeroed copy of the raw tensor, the validity mask, the
/// per-trial last-valid indices, and the total count of valid entries
/// (the normalizer of the masked mean squared error).
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedDataset {
    /// Raw data with NaN entries replaced by zero.
    pub values: Array3<f64>,
    /// {0,1}-valued validity mask, same shape as `values`.
    pub mask: Array3<f64>,
    /// Per-trial index one past the last fully-observed timepoint.
    pub last_idx: Vec<usize>,
    /// Total number of valid entries across the whole tensor.
    pub n_valid: f64,
}

impl MaskedDataset {
    /// Build a [`MaskedDataset`] from a raw tensor.
    ///
    /// Scans the tensor once to produce the zero-filled copy and the
    /// mask, then scans each trial backward to locate the first fully
    /// observed row from the end.
    pub fn new(raw: &Array3<f64>) -> Self {
        let (n_trials, n_timepoints, n_channels) = raw.dim();
        let mut values = Array3::<f64>::zeros((n_trials, n_timepoints, n_channels));
        let mut mask = Array3::<f64>::zeros((n_trials, n_timepoints, n_channels));
        let mut n_valid = 0.0;

        for i in 0..n_trials {
            for t in 0..n_timepoints {
                for c in 0..n_channels {
                    let x = raw[[i, t, c]];
                    if x.is_finite() {
                        values[[i, t, c]] = x;
                        mask[[i, t, c]] = 1.0;
                        n_valid += 1.0;
                    }
                }
            }
        }

        let mut last_idx = Vec::with_capacity(n_trials);
        for i in 0..n_trials {
            let mut rev_offset = 0;
            for r in 0..n_timepoints {
                let t = n_timepoints - 1 - r;
                let fully_observed = (0..n_channels).all(|c| mask[[i, t, c]] == 1.0);
                if fully_observed {
                    rev_offset = r;
                    break;
                }
            }
            // No fully-observed row leaves rev_offset at 0, degenerating
            // to last_idx == n_timepoints.
            last_idx.push(n_timepoints - rev_offset);
        }

        MaskedDataset { values, mask, last_idx, n_valid }
    }

    /// Number of trials (first axis).
    pub fn n_trials(&self) -> usize {
        self.values.dim().0
    }

    /// Number of timepoints per trial (second axis).
    pub fn n_timepoints(&self) -> usize {
        self.values.dim().1
    }

    /// Number of channels (third axis).
    pub fn n_channels(&self) -> usize {
        self.values.dim().2
    }
}
