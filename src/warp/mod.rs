//! Warp function family — per-trial monotone time maps.
//!
//! Purpose
//! -------
//! Produce, per trial, a differentiable and strictly monotone mapping
//! between trial-local time and the shared (canonical) time axis, its
//! functional inverse, and analytic gradients with respect to the
//! trainable warp parameters.
//!
//! Key behaviors
//! -------------
//! - Four parameterizations, selected once at construction and tagged by
//!   [`WarpType`]: `shift` (one offset per trial), `scale` (one
//!   log-stretch per trial), `affine` (both), and `nonlinear` (a free
//!   offset plus softplus-positive increments, one per timepoint).
//! - Monotonicity is an invariant guaranteed by construction: every
//!   family composes strictly increasing pieces (positive base slope,
//!   `exp` stretches, softplus increments), so the inverse is always
//!   well defined.
//! - An optional origin index pins every trial's forward map to the same
//!   shared-time value at that index, exactly, by re-anchoring the
//!   positions after evaluation. This removes the global-drift degree of
//!   freedom.
//! - Initialization ([`WarpInit`]) can be data-driven: `linear` uses the
//!   per-trial last-valid index to stretch each trial's observed span
//!   onto the full shared axis, and `shift` cross-correlates each
//!   trial's mean trace against the across-trial reference.
//!
//! Conventions
//! -----------
//! - Forward positions are expressed in shared-axis coordinates: trial
//!   time index `t` maps to a real position in `[0, shared_length − 1]`
//!   (clamped at the ends during interpolation, with zero gradient past
//!   the clamp).
//! - The base slope `α = (S − 1) / (T − 1)` makes the identity warp map
//!   the trial grid onto the shared grid regardless of their lengths.
//!
//! Downstream usage
//! ----------------
//! - The reconstruction model calls [`WarpSet::positions`] and
//!   [`warp_time_factors`] to move shared time factors into trial time.
//! - The aligner calls [`WarpSet::align_tensor`] to move trial data onto
//!   the shared axis through the functional inverse.
//! - The objective calls [`WarpSet::backprop_positions`] to chain
//!   position gradients back to the raw warp parameters.

pub mod errors;
pub mod init;

use crate::core::mask::MaskedDataset;
use crate::numerics::{safe_logistic, safe_softplus};
use errors::{WarpError, WarpResult};
use ndarray::{Array2, Array3, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use std::str::FromStr;

/// Floor on interpolation-segment lengths when inverting a warp, to keep
/// the division well conditioned for near-flat numerical segments.
const MIN_SEGMENT: f64 = 1e-12;

/// Warp parameterization, fixed for the lifetime of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpType {
    /// Free monotone map: per-trial offset plus positive increments.
    Nonlinear,
    /// Two parameters per trial: log-scale and shift.
    Affine,
    /// One shift parameter per trial.
    Shift,
    /// One log-scale parameter per trial.
    Scale,
}

impl FromStr for WarpType {
    type Err = WarpError;

    /// Parse a warp-type tag (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nonlinear" => Ok(WarpType::Nonlinear),
            "affine" => Ok(WarpType::Affine),
            "shift" => Ok(WarpType::Shift),
            "scale" => Ok(WarpType::Scale),
            _ => Err(WarpError::UnknownWarpType {
                name: s.to_string(),
                reason: "Valid options are 'nonlinear', 'affine', 'shift', or 'scale'.",
            }),
        }
    }
}

/// Warp initialization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpInit {
    /// Map the trial grid onto the shared grid one-to-one.
    Identity,
    /// Stretch each trial's valid span onto the full shared axis.
    Linear,
    /// Data-driven per-trial lag from cross-correlation.
    Shift,
    /// Identity plus a small Gaussian perturbation to break symmetry.
    Randn,
}

impl FromStr for WarpInit {
    type Err = WarpError;

    /// Parse a warp-initialization tag (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "identity" => Ok(WarpInit::Identity),
            "linear" => Ok(WarpInit::Linear),
            "shift" => Ok(WarpInit::Shift),
            "randn" => Ok(WarpInit::Randn),
            _ => Err(WarpError::UnknownWarpInit {
                name: s.to_string(),
                reason: "Valid options are 'identity', 'linear', 'shift', or 'randn'.",
            }),
        }
    }
}

/// Interpolation byproducts of a forward warp, cached for the gradient
/// pass: the lower grid index, the fractional offset, and a gate that is
/// zero wherever the position was clamped to the shared-axis ends.
#[derive(Debug, Clone)]
pub struct WarpedFactors {
    /// Warped time factors, shape (n_trials, n_timepoints, n_components).
    pub warped: Array3<f64>,
    /// Lower interpolation index per (trial, timepoint).
    pub lo: Array2<usize>,
    /// Fractional offset within the interpolation segment.
    pub frac: Array2<f64>,
    /// 1.0 where the position fell inside the shared axis, 0.0 where it
    /// was clamped (no gradient flows through a clamped position).
    pub gate: Array2<f64>,
}

/// Trainable per-trial warp ensemble.
///
/// Owns the raw parameter matrix (one row per trial; the column layout
/// depends on [`WarpType`]) and the geometry needed to evaluate forward
/// and inverse positions.
#[derive(Debug, Clone, PartialEq)]
pub struct WarpSet {
    /// Parameterization tag; immutable after construction.
    pub warptype: WarpType,
    /// Raw trainable parameters, shape (n_trials, param_dim).
    pub params: Array2<f64>,
    /// Optional shared-time anchor index.
    pub origin_idx: Option<usize>,
    n_trials: usize,
    n_timepoints: usize,
    shared_length: usize,
    base_scale: f64,
}

impl WarpSet {
    /// Build a warp ensemble with initialized parameters.
    ///
    /// # Arguments
    /// - `n_trials`, `n_timepoints`, `shared_length`: tensor geometry;
    ///   both time lengths must be at least 2.
    /// - `warptype` / `warpinit`: family and initialization tags.
    /// - `origin_idx`: optional anchor index into trial time.
    /// - `data`: masked dataset hints for the data-driven inits
    ///   (`linear` needs the last-valid indices, `shift` needs traces).
    /// - `rng`: randomness source for the `randn` init.
    ///
    /// # Errors
    /// - [`WarpError::DegenerateTimeLength`] when either time length is
    ///   below two.
    /// - [`WarpError::OriginIdxOutOfRange`] when the anchor does not
    ///   index into trial time.
    /// - [`WarpError::IncompatibleWarpInit`] when the family cannot
    ///   express the initialization (`shift` type with `linear` init,
    ///   `scale` type with `shift` init).
    /// - [`WarpError::MissingInitData`] when a data-driven init is
    ///   requested without a dataset.
    pub fn generate(
        n_trials: usize, n_timepoints: usize, shared_length: usize, warptype: WarpType,
        warpinit: WarpInit, origin_idx: Option<usize>, data: Option<&MaskedDataset>,
        rng: &mut StdRng,
    ) -> WarpResult<Self> {
        if n_timepoints < 2 {
            return Err(WarpError::DegenerateTimeLength { axis: "trial", len: n_timepoints });
        }
        if shared_length < 2 {
            return Err(WarpError::DegenerateTimeLength { axis: "shared", len: shared_length });
        }
        if let Some(o) = origin_idx {
            if o >= n_timepoints {
                return Err(WarpError::OriginIdxOutOfRange { origin_idx: o, n_timepoints });
            }
        }
        let base_scale = (shared_length as f64 - 1.0) / (n_timepoints as f64 - 1.0);
        let mut set = WarpSet {
            warptype,
            params: Array2::zeros((n_trials, param_dim(warptype, n_timepoints))),
            origin_idx,
            n_trials,
            n_timepoints,
            shared_length,
            base_scale,
        };
        init::initialize(&mut set, warpinit, data, rng)?;
        Ok(set)
    }

    /// Number of parameters per trial for this family.
    pub fn param_dim(&self) -> usize {
        param_dim(self.warptype, self.n_timepoints)
    }

    /// Trial-time length this ensemble was built for.
    pub fn n_timepoints(&self) -> usize {
        self.n_timepoints
    }

    /// Shared-axis length this ensemble maps onto.
    pub fn shared_length(&self) -> usize {
        self.shared_length
    }

    /// Base slope `α` of the identity warp.
    pub fn base_scale(&self) -> f64 {
        self.base_scale
    }

    /// Forward warp positions, shape (n_trials, n_timepoints).
    ///
    /// Entry (i, t) is the shared-axis coordinate that trial `i` maps
    /// its timepoint `t` onto. Strictly increasing along every row.
    /// When an origin index is set, the whole row is re-anchored so that
    /// column `o` equals `α·o` exactly for every trial.
    pub fn positions(&self) -> Array2<f64> {
        let (n_trials, n_t) = (self.n_trials, self.n_timepoints);
        let alpha = self.base_scale;
        let mut pos = Array2::<f64>::zeros((n_trials, n_t));

        for i in 0..n_trials {
            match self.warptype {
                WarpType::Shift => {
                    let delta = self.params[[i, 0]];
                    for t in 0..n_t {
                        pos[[i, t]] = alpha * t as f64 + delta;
                    }
                }
                WarpType::Scale => {
                    let stretch = self.params[[i, 0]].exp();
                    for t in 0..n_t {
                        pos[[i, t]] = stretch * alpha * t as f64;
                    }
                }
                WarpType::Affine => {
                    let stretch = self.params[[i, 0]].exp();
                    let delta = self.params[[i, 1]];
                    for t in 0..n_t {
                        pos[[i, t]] = stretch * alpha * t as f64 + delta;
                    }
                }
                WarpType::Nonlinear => {
                    let mut acc = self.params[[i, 0]];
                    pos[[i, 0]] = acc;
                    for t in 1..n_t {
                        acc += safe_softplus(self.params[[i, t]]);
                        pos[[i, t]] = acc;
                    }
                }
            }
        }

        if let Some(o) = self.origin_idx {
            let anchor = alpha * o as f64;
            for i in 0..n_trials {
                let offset = pos[[i, o]] - anchor;
                for t in 0..n_t {
                    pos[[i, t]] -= offset;
                }
                // Anchor exactly; the subtraction above is exact up to
                // rounding, the store below removes even that.
                pos[[i, o]] = anchor;
            }
        }
        pos
    }

    /// Chain position gradients back to the raw warp parameters.
    ///
    /// Takes `∂J/∂positions` (shape n_trials × n_timepoints, already
    /// gated at clamped entries) and returns `∂J/∂params` (shape
    /// n_trials × param_dim), applying the pinning Jacobian first and
    /// then the per-family parameter Jacobian.
    pub fn backprop_positions(&self, d_positions: &Array2<f64>) -> Array2<f64> {
        let (n_trials, n_t) = (self.n_trials, self.n_timepoints);
        let alpha = self.base_scale;
        let mut d_pos = d_positions.clone();

        // Pinning: w'_t = w_t − w_o + const, so ∂w'_u/∂w_t = δ_ut − δ_to
        // and the origin column absorbs minus the row sum.
        if let Some(o) = self.origin_idx {
            for i in 0..n_trials {
                let row_sum: f64 = d_pos.row(i).sum();
                d_pos[[i, o]] -= row_sum;
            }
        }

        let mut grad = Array2::<f64>::zeros((n_trials, self.param_dim()));
        for i in 0..n_trials {
            match self.warptype {
                WarpType::Shift => {
                    grad[[i, 0]] = d_pos.row(i).sum();
                }
                WarpType::Scale => {
                    let stretch = self.params[[i, 0]].exp();
                    let mut acc = 0.0;
                    for t in 0..n_t {
                        acc += d_pos[[i, t]] * stretch * alpha * t as f64;
                    }
                    grad[[i, 0]] = acc;
                }
                WarpType::Affine => {
                    let stretch = self.params[[i, 0]].exp();
                    let mut d_sigma = 0.0;
                    let mut d_delta = 0.0;
                    for t in 0..n_t {
                        d_sigma += d_pos[[i, t]] * stretch * alpha * t as f64;
                        d_delta += d_pos[[i, t]];
                    }
                    grad[[i, 0]] = d_sigma;
                    grad[[i, 1]] = d_delta;
                }
                WarpType::Nonlinear => {
                    // Suffix sums: position t depends on every increment
                    // up to t, so increment u collects Σ_{t≥u} dW_t.
                    let mut suffix = 0.0;
                    let mut suffixes = vec![0.0; n_t];
                    for t in (0..n_t).rev() {
                        suffix += d_pos[[i, t]];
                        suffixes[t] = suffix;
                    }
                    grad[[i, 0]] = suffixes[0];
                    for u in 1..n_t {
                        grad[[i, u]] = suffixes[u] * safe_logistic(self.params[[i, u]]);
                    }
                }
            }
        }
        grad
    }

    /// Inverse warp positions, shape (n_trials, shared_length).
    ///
    /// Entry (i, s) is the trial-time coordinate whose forward position
    /// equals `s`, obtained by piecewise-linear inversion of the
    /// monotone position row; shared samples outside a trial's position
    /// range clamp to the first or last trial timepoint.
    pub fn inverse_positions(&self) -> Array2<f64> {
        let pos = self.positions();
        let (n_trials, n_t) = (self.n_trials, self.n_timepoints);
        let n_s = self.shared_length;
        let mut inv = Array2::<f64>::zeros((n_trials, n_s));

        for i in 0..n_trials {
            let row = pos.row(i);
            let mut j = 0usize;
            for s in 0..n_s {
                let target = s as f64;
                if target <= row[0] {
                    inv[[i, s]] = 0.0;
                    continue;
                }
                if target >= row[n_t - 1] {
                    inv[[i, s]] = (n_t - 1) as f64;
                    continue;
                }
                while j + 2 < n_t && row[j + 1] < target {
                    j += 1;
                }
                let seg = (row[j + 1] - row[j]).max(MIN_SEGMENT);
                inv[[i, s]] = j as f64 + (target - row[j]) / seg;
            }
        }
        inv
    }

    /// Apply the inverse warp to a (trial × time × channel) tensor,
    /// producing its de-jittered view on the shared axis with shape
    /// (n_trials, shared_length, n_channels).
    pub fn align_tensor(&self, x: &Array3<f64>) -> Array3<f64> {
        let inv = self.inverse_positions();
        let (n_trials, n_t, n_channels) = x.dim();
        let n_s = self.shared_length;
        let mut out = Array3::<f64>::zeros((n_trials, n_s, n_channels));

        for i in 0..n_trials {
            for s in 0..n_s {
                let v = inv[[i, s]].clamp(0.0, (n_t - 1) as f64);
                let lo = (v.floor() as usize).min(n_t - 2);
                let frac = v - lo as f64;
                for c in 0..n_channels {
                    out[[i, s, c]] =
                        (1.0 - frac) * x[[i, lo, c]] + frac * x[[i, lo + 1, c]];
                }
            }
        }
        out
    }
}

/// Linearly interpolate shared time factors at per-trial warp positions.
///
/// The forward warp operator of the model: returns the warped factor
/// tensor together with the interpolation cache needed by the gradient
/// pass. Positions are clamped to `[0, S − 1]`; clamped entries carry a
/// zero gate so no gradient flows through them.
pub fn warp_time_factors(time: ArrayView2<f64>, positions: &Array2<f64>) -> WarpedFactors {
    let (n_shared, n_components) = time.dim();
    let (n_trials, n_t) = positions.dim();
    let mut warped = Array3::<f64>::zeros((n_trials, n_t, n_components));
    let mut lo = Array2::<usize>::zeros((n_trials, n_t));
    let mut frac = Array2::<f64>::zeros((n_trials, n_t));
    let mut gate = Array2::<f64>::zeros((n_trials, n_t));

    let top = (n_shared - 1) as f64;
    for i in 0..n_trials {
        for t in 0..n_t {
            let w = positions[[i, t]];
            let inside = (0.0..=top).contains(&w);
            let wc = w.clamp(0.0, top);
            let l = (wc.floor() as usize).min(n_shared - 2);
            let f = wc - l as f64;
            lo[[i, t]] = l;
            frac[[i, t]] = f;
            gate[[i, t]] = if inside { 1.0 } else { 0.0 };
            for k in 0..n_components {
                warped[[i, t, k]] = (1.0 - f) * time[[l, k]] + f * time[[l + 1, k]];
            }
        }
    }
    WarpedFactors { warped, lo, frac, gate }
}

/// Position gradient of the forward warp at the cached interpolation
/// state: `∂warped[i,t,k]/∂position[i,t] = time[lo+1,k] − time[lo,k]`
/// inside the axis, zero where clamped.
pub fn position_slopes(
    time: ArrayView2<f64>, cache: &WarpedFactors, d_warped: &Array3<f64>,
) -> Array2<f64> {
    let (n_trials, n_t, n_components) = d_warped.dim();
    let mut d_pos = Array2::<f64>::zeros((n_trials, n_t));
    for i in 0..n_trials {
        for t in 0..n_t {
            let l = cache.lo[[i, t]];
            let mut acc = 0.0;
            for k in 0..n_components {
                acc += d_warped[[i, t, k]] * (time[[l + 1, k]] - time[[l, k]]);
            }
            d_pos[[i, t]] = acc * cache.gate[[i, t]];
        }
    }
    d_pos
}

/// Scatter warped-factor gradients back onto the shared time grid.
pub fn scatter_time_grad(
    cache: &WarpedFactors, d_warped: &Array3<f64>, n_shared: usize,
) -> Array2<f64> {
    let (n_trials, n_t, n_components) = d_warped.dim();
    let mut d_time = Array2::<f64>::zeros((n_shared, n_components));
    for i in 0..n_trials {
        for t in 0..n_t {
            let l = cache.lo[[i, t]];
            let f = cache.frac[[i, t]];
            for k in 0..n_components {
                let g = d_warped[[i, t, k]];
                d_time[[l, k]] += g * (1.0 - f);
                d_time[[l + 1, k]] += g * f;
            }
        }
    }
    d_time
}

fn param_dim(warptype: WarpType, n_timepoints: usize) -> usize {
    match warptype {
        WarpType::Shift | WarpType::Scale => 1,
        WarpType::Affine => 2,
        WarpType::Nonlinear => n_timepoints,
    }
}

pub(crate) fn lerp_row(row: ArrayView1<f64>, at: f64) -> f64 {
    let top = (row.len() - 1) as f64;
    let v = at.clamp(0.0, top);
    let lo = (v.floor() as usize).min(row.len() - 2);
    let frac = v - lo as f64;
    (1.0 - frac) * row[lo] + frac * row[lo + 1]
}
