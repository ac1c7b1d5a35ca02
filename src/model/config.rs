//! Model and fit configuration.
//!
//! Purpose
//! -------
//! Plain-data configuration split the way the model consumes it:
//! [`ModelConfig`] fixes the structure of the model (rank, constraints,
//! warp family) for its whole lifetime, while [`FitOptions`] chooses how
//! one particular training run proceeds (optimizer, schedule, progress,
//! seeding).

use crate::model::schedule::Schedule;
use crate::optim::OptimizerKind;
use crate::regularizers::RegularizerSet;
use crate::warp::{WarpInit, WarpType};

/// Structural configuration, immutable for the model's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Number of low-rank components K.
    pub n_components: usize,
    /// Length of the canonical time axis; `None` means the trial time
    /// length of the first fitted dataset.
    pub shared_length: Option<usize>,
    /// Constrain effective factors to be nonnegative.
    pub nonneg: bool,
    /// Model per-trial amplitude factors in addition to time and neuron
    /// factors.
    pub fit_trial_factors: bool,
    /// Warp parameterization.
    pub warptype: WarpType,
    /// Warp initialization strategy.
    pub warpinit: WarpInit,
    /// Optional shared-time anchor index; all trials agree there.
    pub origin_idx: Option<usize>,
    /// Penalties per parameter group.
    pub regularizers: RegularizerSet,
}

impl ModelConfig {
    /// Configuration with the given rank and every other knob at its
    /// default: full nonlinear warps, identity initialization,
    /// unconstrained factors, no trial factors, no anchor.
    pub fn new(n_components: usize) -> Self {
        ModelConfig {
            n_components,
            shared_length: None,
            nonneg: false,
            fit_trial_factors: false,
            warptype: WarpType::Nonlinear,
            warpinit: WarpInit::Identity,
            origin_idx: None,
            regularizers: RegularizerSet::default(),
        }
    }
}

/// Per-run training options.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    /// Update rule for every parameter group.
    pub optimizer: OptimizerKind,
    /// Phased iteration schedule.
    pub schedule: Schedule,
    /// Emit progress through the `log` facade.
    pub progress: bool,
    /// Seed for the `randn` warp initialization; `None` draws from
    /// entropy.
    pub seed: Option<u64>,
}

impl Default for FitOptions {
    /// Adam, 1000 steps at 1e-3, quiet, unseeded.
    fn default() -> Self {
        FitOptions {
            optimizer: OptimizerKind::Adam,
            schedule: Schedule::default(),
            progress: false,
            seed: None,
        }
    }
}
