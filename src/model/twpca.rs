//! Time-warped matrix decomposition of trial-structured tensors.
//!
//! Purpose
//! -------
//! The public model type: jointly fits a low-rank factorization (shared
//! time factors, neuron factors, optional per-trial amplitudes) and a
//! per-trial monotone time warp to a (trial × time × channel) tensor
//! with missing entries, then answers reconstruction, held-out
//! prediction, and alignment queries from the fitted parameters.
//!
//! Key behaviors
//! -------------
//! - `fit` ingests a tensor (NaN marks missing data), warm-starts the
//!   factors from a masked SVD and the warps from the configured
//!   strategy, then descends the masked objective over the phased
//!   schedule. A second `fit` on the same instance is a shape-checked
//!   warm restart: the new tensor replaces the data, the accumulated
//!   parameters and optimizer state carry over.
//! - `train` runs additional phases on the existing state without
//!   touching the data, for incremental refinement.
//! - `predict(Some(x))` refits only the neuron factors to new channels
//!   by least squares over fully-observed rows, holding the learned
//!   temporal structure fixed — the held-out-channel test of whether
//!   the time/warp structure generalizes.
//! - `align` applies the functional inverse of the fitted warps to move
//!   trial data onto the shared time axis.
//!
//! Invariants & assumptions
//! ------------------------
//! - The structural configuration (rank, warp family, constraints) is
//!   fixed at construction; only data and optimizer state evolve.
//! - Parameter matrix shapes are pinned by the first `fit` and never
//!   change; later inputs must match trial, time, and channel counts.
//! - The objective history is append-only, one entry per optimizer
//!   step, recorded before the step, across all phases and fits.
//!
//! Downstream usage
//! ----------------
//! - Progress reporting goes through the `log` facade and is gated by
//!   [`FitOptions::progress`]; it never affects numerical results.

use crate::core::init::lowrank_factors;
use crate::core::objective;
use crate::core::reconstruct::predict_tensor;
use crate::core::{FactorSet, MaskedDataset};
use crate::model::config::{FitOptions, ModelConfig};
use crate::model::errors::{ModelError, ModelResult};
use crate::model::schedule::Phase;
use crate::optim::{OptimizerKind, OptimizerState};
use crate::warp::{warp_time_factors, WarpSet};
use nalgebra::DMatrix;
use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Singular values below this fraction of the largest are treated as
/// zero by the held-out least-squares refit.
const LSTSQ_EPS: f64 = 1e-12;

/// Owned snapshot of the fitted parameters in effective space.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSnapshot {
    /// Shared time factors, shape (shared_length, n_components).
    pub time: Array2<f64>,
    /// Neuron factors, shape (n_channels, n_components).
    pub neuron: Array2<f64>,
    /// Trial factors, present iff trial factors were modeled.
    pub trial: Option<Array2<f64>>,
    /// Forward warp positions, shape (n_trials, n_timepoints).
    pub warp_positions: Array2<f64>,
}

/// Everything a fitted model owns: the current dataset, the trainable
/// parameters, the optimizer trajectory memory, and the objective
/// history. Created by the first `fit`, reused (never reset) afterward.
#[derive(Debug, Clone)]
struct FitState {
    data: MaskedDataset,
    factors: FactorSet,
    warp: WarpSet,
    optimizers: GroupOptimizers,
    history: Vec<f64>,
}

/// One optimizer state per parameter group.
#[derive(Debug, Clone, PartialEq)]
struct GroupOptimizers {
    kind: OptimizerKind,
    time: OptimizerState,
    neuron: OptimizerState,
    trial: OptimizerState,
    warp: OptimizerState,
}

impl GroupOptimizers {
    fn new(kind: OptimizerKind) -> Self {
        GroupOptimizers {
            kind,
            time: OptimizerState::new(kind),
            neuron: OptimizerState::new(kind),
            trial: OptimizerState::new(kind),
            warp: OptimizerState::new(kind),
        }
    }

    /// Switching optimizers mid-run discards the trajectory memory;
    /// keeping the same kind preserves it.
    fn ensure_kind(&mut self, kind: OptimizerKind) {
        if self.kind != kind {
            *self = GroupOptimizers::new(kind);
        }
    }
}

/// Time-warped PCA model.
#[derive(Debug, Clone)]
pub struct TimeWarpedPca {
    config: ModelConfig,
    state: Option<FitState>,
}

impl TimeWarpedPca {
    /// Build an unfitted model from a validated configuration.
    ///
    /// # Errors
    /// - [`ModelError::InvalidComponentCount`] when the rank is zero.
    /// - [`ModelError::InvalidSharedLength`] when an explicit shared
    ///   length cannot support interpolation.
    pub fn new(config: ModelConfig) -> ModelResult<Self> {
        if config.n_components == 0 {
            return Err(ModelError::InvalidComponentCount {
                n_components: 0,
                reason: "component count must be at least one",
            });
        }
        if let Some(s) = config.shared_length {
            if s < 2 {
                return Err(ModelError::InvalidSharedLength {
                    value: s,
                    reason: "shared axis needs at least two samples for interpolation",
                });
            }
        }
        Ok(TimeWarpedPca { config, state: None })
    }

    /// Fit the model to a (trial × time × channel) tensor.
    ///
    /// NaN entries mark missing data and are excluded from the
    /// objective by masking. On a fresh instance this warm-starts the
    /// parameters and runs the schedule; on a fitted instance it
    /// replaces the data (shapes must match) and continues from the
    /// accumulated parameters.
    ///
    /// # Errors
    /// - [`ModelError::InvalidAxisLength`] on empty axes or a time axis
    ///   shorter than two samples.
    /// - Warm-start and warp-initialization errors from the
    ///   configuration or insufficient data.
    /// - Shape-mismatch errors on a warm restart with different
    ///   dimensions.
    /// - [`ModelError::NonFiniteObjective`] when optimization diverges.
    pub fn fit(&mut self, x: &Array3<f64>, options: &FitOptions) -> ModelResult<()> {
        validate_axes(x)?;
        let data = MaskedDataset::new(x);

        if self.state.is_none() {
            let n_t = data.n_timepoints();
            let shared_length = self.config.shared_length.unwrap_or(n_t);
            let factors = lowrank_factors(
                &data,
                self.config.n_components,
                self.config.fit_trial_factors,
                self.config.nonneg,
                shared_length,
            )?;
            let mut rng = match options.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let warp = WarpSet::generate(
                data.n_trials(),
                n_t,
                shared_length,
                self.config.warptype,
                self.config.warpinit,
                self.config.origin_idx,
                Some(&data),
                &mut rng,
            )?;
            self.state = Some(FitState {
                data,
                factors,
                warp,
                optimizers: GroupOptimizers::new(options.optimizer),
                history: Vec::new(),
            });
        } else {
            let state = self.state.as_mut().ok_or(ModelError::NotFitted)?;
            check_dim(state.data.n_trials(), data.n_trials(), Axis3::Trial)?;
            check_dim(state.data.n_timepoints(), data.n_timepoints(), Axis3::Time)?;
            check_dim(state.data.n_channels(), data.n_channels(), Axis3::Channel)?;
            state.data = data;
            state.optimizers.ensure_kind(options.optimizer);
        }
        self.run_schedule(options)
    }

    /// Run additional training phases on the already-fitted state.
    ///
    /// # Errors
    /// - [`ModelError::NotFitted`] before the first `fit`.
    /// - [`ModelError::NonFiniteObjective`] when optimization diverges.
    pub fn train(&mut self, options: &FitOptions) -> ModelResult<()> {
        let state = self.state.as_mut().ok_or(ModelError::NotFitted)?;
        state.optimizers.ensure_kind(options.optimizer);
        self.run_schedule(options)
    }

    /// Reconstruction of the training tensor from the fitted
    /// parameters, shape (n_trials, n_timepoints, n_channels).
    pub fn reconstruct(&self) -> ModelResult<Array3<f64>> {
        let state = self.fitted()?;
        Ok(predict_tensor(&state.factors, &state.warp))
    }

    /// Prediction for the training channels (`None`) or for held-out
    /// channels (`Some`).
    ///
    /// With new data, the learned warped-and-scaled time factors are
    /// held fixed and only a fresh set of neuron weights is fitted by
    /// ordinary least squares over the rows where every channel of the
    /// input is observed. The input must match the fitted trial and
    /// timepoint counts; its channel count is free.
    ///
    /// # Errors
    /// - [`ModelError::NotFitted`] before the first `fit`.
    /// - [`ModelError::TrialCountMismatch`] /
    ///   [`ModelError::TimepointCountMismatch`] on geometry
    ///   disagreement.
    /// - [`ModelError::NoFullyObservedRows`] when no (trial, time) row
    ///   of the input has all channels finite.
    /// - [`ModelError::LeastSquaresFailed`] when the solve breaks down.
    pub fn predict(&self, x: Option<&Array3<f64>>) -> ModelResult<Array3<f64>> {
        let state = self.fitted()?;
        let x = match x {
            None => return self.reconstruct(),
            Some(x) => x,
        };
        let (n_trials, n_t, n_channels) = x.dim();
        check_dim(state.data.n_trials(), n_trials, Axis3::Trial)?;
        check_dim(state.data.n_timepoints(), n_t, Axis3::Time)?;

        let basis = scaled_time_basis(&state.factors, &state.warp);
        let n_components = basis.dim().2;

        // Rows where the new tensor is fully observed.
        let mut rows = Vec::new();
        for i in 0..n_trials {
            for t in 0..n_t {
                if (0..n_channels).all(|c| x[[i, t, c]].is_finite()) {
                    rows.push((i, t));
                }
            }
        }
        if rows.is_empty() {
            return Err(ModelError::NoFullyObservedRows);
        }

        let mut a = DMatrix::<f64>::zeros(rows.len(), n_components);
        let mut y = DMatrix::<f64>::zeros(rows.len(), n_channels);
        for (r, &(i, t)) in rows.iter().enumerate() {
            for k in 0..n_components {
                a[(r, k)] = basis[[i, t, k]];
            }
            for c in 0..n_channels {
                y[(r, c)] = x[[i, t, c]];
            }
        }
        let weights = a
            .svd(true, true)
            .solve(&y, LSTSQ_EPS)
            .map_err(|reason| ModelError::LeastSquaresFailed { reason })?;

        let mut pred = Array3::<f64>::zeros((n_trials, n_t, n_channels));
        for i in 0..n_trials {
            for t in 0..n_t {
                for c in 0..n_channels {
                    let mut acc = 0.0;
                    for k in 0..n_components {
                        acc += basis[[i, t, k]] * weights[(k, c)];
                    }
                    pred[[i, t, c]] = acc;
                }
            }
        }
        Ok(pred)
    }

    /// De-jittered view of the training data (`None`) or of caller data
    /// (`Some`) on the shared axis, shape (n_trials, shared_length,
    /// n_channels).
    ///
    /// # Errors
    /// - [`ModelError::NotFitted`] before the first `fit`.
    /// - [`ModelError::TrialCountMismatch`] /
    ///   [`ModelError::TimepointCountMismatch`] on geometry
    ///   disagreement with caller data.
    pub fn align(&self, x: Option<&Array3<f64>>) -> ModelResult<Array3<f64>> {
        let state = self.fitted()?;
        match x {
            None => Ok(state.warp.align_tensor(&state.data.values)),
            Some(x) => {
                let (n_trials, n_t, _) = x.dim();
                check_dim(state.data.n_trials(), n_trials, Axis3::Trial)?;
                check_dim(state.data.n_timepoints(), n_t, Axis3::Time)?;
                Ok(state.warp.align_tensor(x))
            }
        }
    }

    /// Owned snapshot of the effective parameters.
    pub fn effective_parameters(&self) -> ModelResult<ParameterSnapshot> {
        let state = self.fitted()?;
        Ok(ParameterSnapshot {
            time: state.factors.time(),
            neuron: state.factors.neuron(),
            trial: state.factors.trial(),
            warp_positions: state.warp.positions(),
        })
    }

    /// Objective value before each optimizer step, across all phases
    /// and fits. Empty before the first `fit`.
    pub fn objective_history(&self) -> &[f64] {
        self.state.as_ref().map_or(&[], |s| &s.history)
    }

    /// Mask-weighted mean squared reconstruction error on the current
    /// data, without penalties.
    pub fn reconstruction_cost(&self) -> ModelResult<f64> {
        let state = self.fitted()?;
        Ok(objective::reconstruction_cost(&state.data, &state.factors, &state.warp))
    }

    // ---- Helper methods ----

    fn fitted(&self) -> ModelResult<&FitState> {
        self.state.as_ref().ok_or(ModelError::NotFitted)
    }

    /// Descend the objective over every phase of the schedule.
    fn run_schedule(&mut self, options: &FitOptions) -> ModelResult<()> {
        let regs = self.config.regularizers;
        let state = self.state.as_mut().ok_or(ModelError::NotFitted)?;

        for (phase_idx, &Phase { niter, lr }) in options.schedule.phases().iter().enumerate() {
            if options.progress {
                log::info!("phase {phase_idx}: {niter} iterations at lr {lr:e}");
            }
            for _ in 0..niter {
                let (value, grads) =
                    objective::evaluate(&state.data, &state.factors, &state.warp, &regs);
                if !value.is_finite() {
                    return Err(ModelError::NonFiniteObjective {
                        value,
                        iteration: state.history.len(),
                    });
                }
                state.history.push(value);

                state
                    .optimizers
                    .time
                    .step(&mut state.factors.time_raw, &grads.time, lr);
                state
                    .optimizers
                    .neuron
                    .step(&mut state.factors.neuron_raw, &grads.neuron, lr);
                if let (Some(trial_raw), Some(trial_grad)) =
                    (state.factors.trial_raw.as_mut(), grads.trial.as_ref())
                {
                    state.optimizers.trial.step(trial_raw, trial_grad, lr);
                }
                state
                    .optimizers
                    .warp
                    .step(&mut state.warp.params, &grads.warp, lr);

                if options.progress && state.history.len() % 100 == 0 {
                    log::debug!(
                        "iteration {}: objective {:.6e}",
                        state.history.len(),
                        value
                    );
                }
            }
        }
        Ok(())
    }
}

/// Tensor axis names for shape-mismatch reporting.
#[derive(Debug, Clone, Copy)]
enum Axis3 {
    Trial,
    Time,
    Channel,
}

fn check_dim(expected: usize, found: usize, axis: Axis3) -> ModelResult<()> {
    if expected == found {
        return Ok(());
    }
    Err(match axis {
        Axis3::Trial => ModelError::TrialCountMismatch { expected, found },
        Axis3::Time => ModelError::TimepointCountMismatch { expected, found },
        Axis3::Channel => ModelError::ChannelCountMismatch { expected, found },
    })
}

fn validate_axes(x: &Array3<f64>) -> ModelResult<()> {
    let (n_trials, n_t, n_channels) = x.dim();
    if n_trials == 0 {
        return Err(ModelError::InvalidAxisLength {
            axis: "trial",
            len: 0,
            reason: "at least one trial is required",
        });
    }
    if n_t < 2 {
        return Err(ModelError::InvalidAxisLength {
            axis: "time",
            len: n_t,
            reason: "the time axis needs at least two samples for interpolation",
        });
    }
    if n_channels == 0 {
        return Err(ModelError::InvalidAxisLength {
            axis: "channel",
            len: 0,
            reason: "at least one channel is required",
        });
    }
    Ok(())
}

/// Warped time factors with each trial's amplitude row multiplied in:
/// the fixed design the held-out refit regresses against.
fn scaled_time_basis(factors: &FactorSet, warp: &WarpSet) -> Array3<f64> {
    let time = factors.time();
    let positions = warp.positions();
    let mut basis = warp_time_factors(time.view(), &positions).warped;
    if let Some(trial) = factors.trial() {
        let (n_trials, n_t, n_components) = basis.dim();
        for i in 0..n_trials {
            for t in 0..n_t {
                for k in 0..n_components {
                    basis[[i, t, k]] *= trial[[i, k]];
                }
            }
        }
    }
    basis
}
