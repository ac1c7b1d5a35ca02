//! Factor matrices and the positivity transform.
//!
//! Purpose
//! -------
//! Own the raw, trainable factor matrices of the model — shared time
//! factors (S × K), neuron factors (C × K), and optional trial factors
//! (I × K) — and mediate every read through the positivity transform
//! when nonnegative factors were requested.
//!
//! Conventions
//! -----------
//! - Raw values live in an unconstrained space; effective values are
//!   `softplus(raw)` when `nonneg` is set and `raw` otherwise. Gradient
//!   chain rules multiply by the rectifier derivative accordingly.
//! - Matrix shapes are pinned at construction and never change.

use crate::numerics::{safe_logistic, safe_softplus};
use ndarray::Array2;

/// Trainable factor matrices, stored in the raw (unconstrained) domain.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorSet {
    /// Shared time factors, shape (shared_length, n_components).
    pub time_raw: Array2<f64>,
    /// Neuron (channel) factors, shape (n_channels, n_components).
    pub neuron_raw: Array2<f64>,
    /// Optional per-trial factors, shape (n_trials, n_components).
    pub trial_raw: Option<Array2<f64>>,
    /// Whether effective factors are constrained to be nonnegative.
    pub nonneg: bool,
}

impl FactorSet {
    /// Effective time factors (positivity transform applied if enabled).
    pub fn time(&self) -> Array2<f64> {
        self.rectify(&self.time_raw)
    }

    /// Effective neuron factors.
    pub fn neuron(&self) -> Array2<f64> {
        self.rectify(&self.neuron_raw)
    }

    /// Effective trial factors, if trial factors are modeled.
    pub fn trial(&self) -> Option<Array2<f64>> {
        self.trial_raw.as_ref().map(|raw| self.rectify(raw))
    }

    /// Element-wise derivative of the effective value w.r.t. the raw
    /// value: `σ(raw)` under the positivity transform, `1` otherwise.
    pub fn rectifier_grad(&self, raw: &Array2<f64>) -> Array2<f64> {
        if self.nonneg {
            raw.mapv(safe_logistic)
        } else {
            Array2::ones(raw.raw_dim())
        }
    }

    fn rectify(&self, raw: &Array2<f64>) -> Array2<f64> {
        if self.nonneg {
            raw.mapv(safe_softplus)
        } else {
            raw.clone()
        }
    }
}
