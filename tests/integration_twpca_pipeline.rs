//! Integration tests for the time-warped PCA pipeline.
//!
//! Purpose
//! -------
//! - Validate the end-to-end flow: from a raw (trial × time × channel)
//!   tensor with missing entries, through configuration, fitting, and
//!   continued training, to reconstruction, held-out prediction, and
//!   inverse-warp alignment.
//! - Exercise realistic regimes (jittered low-rank data, NaN padding,
//!   phased schedules) rather than toy edge cases only.
//!
//! Coverage
//! --------
//! - `model::TimeWarpedPca`:
//!   - Fit on exact and noisy low-rank data, warm restarts, `train`
//!     continuation, objective-history accounting.
//!   - Constrained configurations: per-trial amplitude factors,
//!     nonnegative factors, and a shared axis longer than trial time.
//!   - `predict` consistency with `reconstruct` and least-squares
//!     refit on training data.
//!   - `align` de-jittering of shifted trials.
//! - `model::schedule::Schedule`: phased construction and the
//!   mismatched-length configuration error.
//! - `warp`: exact origin-index pinning observed through
//!   `effective_parameters`.
//!
//! Exclusions
//! ----------
//! - Gradient correctness, masked statistics, and warp geometry — these
//!   are covered by in-module unit tests against finite differences.
//! - Performance and large-tensor stress testing.

use approx::assert_abs_diff_eq;
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use time_warped_pca::{
    FitOptions, ModelConfig, ModelError, OptimizerKind, Regularizer, RegularizerSet, Schedule,
    TimeWarpedPca, WarpInit, WarpType,
};

/// Purpose
/// -------
/// Build an exact rank-one tensor with identical trials: a smooth time
/// profile scaled per channel, no noise and no jitter.
fn rank_one_tensor(n_trials: usize, n_t: usize, n_channels: usize) -> Array3<f64> {
    Array3::from_shape_fn((n_trials, n_t, n_channels), |(_, t, c)| {
        ((t as f64 * 0.35).sin() + 1.5) * (c as f64 + 1.0)
    })
}

/// Purpose
/// -------
/// Build trials that share one Gaussian bump per channel, translated by
/// an integer per-trial shift — the canonical jittered dataset the warp
/// model is meant to undo.
fn shifted_bump_tensor(shifts: &[i64], n_t: usize, n_channels: usize) -> Array3<f64> {
    let center = n_t as f64 / 2.0;
    Array3::from_shape_fn((shifts.len(), n_t, n_channels), |(i, t, c)| {
        let u = t as f64 - shifts[i] as f64 - center;
        (-u * u / 8.0).exp() * (c as f64 + 1.0)
    })
}

/// Purpose
/// -------
/// Rank-one tensor plus small Gaussian noise, seeded for repeatability.
fn noisy_tensor(n_trials: usize, n_t: usize, n_channels: usize, seed: u64) -> Array3<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.05).expect("constant std is valid");
    let mut x = rank_one_tensor(n_trials, n_t, n_channels);
    for v in x.iter_mut() {
        *v += rng.sample(noise);
    }
    x
}

fn no_penalties() -> RegularizerSet {
    RegularizerSet {
        trial: Regularizer::None,
        time: Regularizer::None,
        neuron: Regularizer::None,
        warp: Regularizer::None,
    }
}

#[test]
// Purpose
// -------
// A phased fit runs every scheduled step, records one history entry per
// step, and lowers the objective on noisy low-rank data.
fn phased_fit_descends_and_accounts_for_every_step() {
    let x = noisy_tensor(4, 25, 6, 42);
    let mut config = ModelConfig::new(2);
    config.warptype = WarpType::Nonlinear;
    let mut model = TimeWarpedPca::new(config).unwrap();

    let options = FitOptions {
        optimizer: OptimizerKind::GradientDescent,
        schedule: Schedule::phased(&[40, 20], &[1e-4, 5e-5]).unwrap(),
        seed: Some(1),
        ..FitOptions::default()
    };
    model.fit(&x, &options).unwrap();

    let history = model.objective_history();
    assert_eq!(history.len(), 60);
    assert!(history.iter().all(|v| v.is_finite()));
    assert!(history[history.len() - 1] < history[0]);
}

#[test]
// Purpose
// -------
// `train` continues from the fitted state: the history keeps growing
// and the objective does not regress.
fn train_continues_from_fitted_state() {
    let x = noisy_tensor(3, 20, 4, 7);
    let mut model = TimeWarpedPca::new(ModelConfig::new(1)).unwrap();

    let options = FitOptions {
        optimizer: OptimizerKind::GradientDescent,
        schedule: Schedule::constant(30, 1e-4).unwrap(),
        seed: Some(2),
        ..FitOptions::default()
    };
    model.fit(&x, &options).unwrap();
    let after_fit = *model.objective_history().last().unwrap();

    model.train(&options).unwrap();
    assert_eq!(model.objective_history().len(), 60);
    let after_train = *model.objective_history().last().unwrap();
    assert!(after_train <= after_fit);
}

#[test]
// Purpose
// -------
// Per-trial amplitude factors and the nonnegativity constraint work
// through the full model surface: the fit descends, every effective
// factor in the snapshot is strictly positive, and the held-out refit
// against the trial-scaled basis produces a finite prediction.
fn trial_factors_and_nonneg_fit_end_to_end() {
    let x = noisy_tensor(4, 20, 5, 21);
    let mut config = ModelConfig::new(2);
    config.fit_trial_factors = true;
    config.nonneg = true;
    let mut model = TimeWarpedPca::new(config).unwrap();

    let options = FitOptions {
        optimizer: OptimizerKind::GradientDescent,
        schedule: Schedule::constant(30, 1e-4).unwrap(),
        seed: Some(13),
        ..FitOptions::default()
    };
    model.fit(&x, &options).unwrap();

    let history = model.objective_history();
    assert_eq!(history.len(), 30);
    assert!(history.iter().all(|v| v.is_finite()));
    assert!(history[history.len() - 1] < history[0]);

    let snapshot = model.effective_parameters().unwrap();
    assert!(snapshot.time.iter().all(|&v| v > 0.0));
    assert!(snapshot.neuron.iter().all(|&v| v > 0.0));
    let trial = snapshot.trial.expect("trial factors were modeled");
    assert_eq!(trial.dim(), (4, 2));
    assert!(trial.iter().all(|&v| v > 0.0));

    let held_out = noisy_tensor(4, 20, 3, 22);
    let pred = model.predict(Some(&held_out)).unwrap();
    assert_eq!(pred.dim(), (4, 20, 3));
    assert!(pred.iter().all(|v| v.is_finite()));
}

#[test]
// Purpose
// -------
// A shared axis longer than trial time works end to end: the time
// factors live on the longer axis, alignment lands on it, and
// reconstruction and the held-out refit keep the trial-time shape.
fn custom_shared_length_runs_end_to_end() {
    let n_t = 18;
    let shared = 27;
    let x = noisy_tensor(3, n_t, 4, 31);
    let mut config = ModelConfig::new(1);
    config.shared_length = Some(shared);
    let mut model = TimeWarpedPca::new(config).unwrap();

    let options = FitOptions {
        optimizer: OptimizerKind::GradientDescent,
        schedule: Schedule::constant(20, 1e-4).unwrap(),
        seed: Some(14),
        ..FitOptions::default()
    };
    model.fit(&x, &options).unwrap();
    assert!(model.objective_history().iter().all(|v| v.is_finite()));

    let snapshot = model.effective_parameters().unwrap();
    assert_eq!(snapshot.time.dim(), (shared, 1));
    assert_eq!(snapshot.warp_positions.dim(), (3, n_t));

    let recon = model.reconstruct().unwrap();
    assert_eq!(recon.dim(), (3, n_t, 4));

    let aligned = model.align(None).unwrap();
    assert_eq!(aligned.dim(), (3, shared, 4));
    assert!(aligned.iter().all(|v| v.is_finite()));

    let pred = model.predict(Some(&x)).unwrap();
    assert_eq!(pred.dim(), (3, n_t, 4));
    assert!(pred.iter().all(|v| v.is_finite()));
}

#[test]
// Purpose
// -------
// On an exact low-rank reconstruction with no noise and no jitter,
// shift warps from identity leave nothing to explain: the
// reconstruction cost is near zero and stays there through training.
fn exact_lowrank_data_reaches_near_zero_cost() {
    let x = rank_one_tensor(3, 18, 5);
    let mut config = ModelConfig::new(1);
    config.warptype = WarpType::Shift;
    config.warpinit = WarpInit::Identity;
    config.regularizers = no_penalties();
    let mut model = TimeWarpedPca::new(config).unwrap();

    let options = FitOptions {
        optimizer: OptimizerKind::GradientDescent,
        schedule: Schedule::constant(20, 1e-4).unwrap(),
        seed: Some(3),
        ..FitOptions::default()
    };
    model.fit(&x, &options).unwrap();
    assert!(model.reconstruction_cost().unwrap() < 1e-8);
}

#[test]
// Purpose
// -------
// `predict(None)` is the reconstruction, and a least-squares refit on
// the training tensor itself reproduces it almost exactly when the
// model already fits the data.
fn predict_matches_reconstruct_on_training_data() {
    let x = rank_one_tensor(3, 18, 5);
    let mut config = ModelConfig::new(1);
    config.warptype = WarpType::Shift;
    config.regularizers = no_penalties();
    let mut model = TimeWarpedPca::new(config).unwrap();

    let options = FitOptions {
        optimizer: OptimizerKind::GradientDescent,
        schedule: Schedule::constant(10, 1e-4).unwrap(),
        seed: Some(4),
        ..FitOptions::default()
    };
    model.fit(&x, &options).unwrap();

    let recon = model.reconstruct().unwrap();
    let default_pred = model.predict(None).unwrap();
    assert_eq!(recon, default_pred);

    let refit = model.predict(Some(&x)).unwrap();
    for (r, p) in recon.iter().zip(refit.iter()) {
        assert_abs_diff_eq!(r, p, epsilon = 1e-6);
    }
}

#[test]
// Purpose
// -------
// Aligning integer-shifted bumps with shift warps and the data-driven
// shift initialization collapses the jitter: aligned trials agree on
// the interior of the shared axis.
//
// Given
// -----
// - 3 trials of the same bump shifted by {−2, 0, 2} timepoints.
// - warptype = shift, warpinit = shift, a zero-step schedule (the
//   initialization alone must already de-jitter).
//
// Expect
// ------
// - Pairwise agreement of aligned trials on the interior to 1e-6
//   (integer lags make the interpolation exact).
fn alignment_undoes_integer_shifts() {
    let n_t = 30;
    let x = shifted_bump_tensor(&[-2, 0, 2], n_t, 2);
    let mut config = ModelConfig::new(1);
    config.warptype = WarpType::Shift;
    config.warpinit = WarpInit::Shift;
    let mut model = TimeWarpedPca::new(config).unwrap();

    let options = FitOptions {
        schedule: Schedule::constant(0, 1e-3).unwrap(),
        seed: Some(5),
        ..FitOptions::default()
    };
    model.fit(&x, &options).unwrap();

    let aligned = model.align(None).unwrap();
    assert_eq!(aligned.dim(), (3, n_t, 2));
    for s in 5..(n_t - 5) {
        for c in 0..2 {
            assert_abs_diff_eq!(aligned[[0, s, c]], aligned[[1, s, c]], epsilon = 1e-6);
            assert_abs_diff_eq!(aligned[[1, s, c]], aligned[[2, s, c]], epsilon = 1e-6);
        }
    }
}

#[test]
// Purpose
// -------
// A channel that is entirely missing for one trial neither breaks the
// fit nor contaminates any output with NaN.
fn fit_survives_fully_missing_channel_in_one_trial() {
    let mut x = noisy_tensor(4, 22, 5, 9);
    for t in 0..22 {
        x[[2, t, 3]] = f64::NAN;
    }
    let mut model = TimeWarpedPca::new(ModelConfig::new(2)).unwrap();

    let options = FitOptions {
        optimizer: OptimizerKind::GradientDescent,
        schedule: Schedule::constant(25, 1e-4).unwrap(),
        seed: Some(6),
        ..FitOptions::default()
    };
    model.fit(&x, &options).unwrap();

    assert!(model.objective_history().iter().all(|v| v.is_finite()));
    let recon = model.reconstruct().unwrap();
    assert!(recon.iter().all(|v| v.is_finite()));
    let aligned = model.align(None).unwrap();
    assert!(aligned.iter().all(|v| v.is_finite()));
}

#[test]
// Purpose
// -------
// Mismatched niter/lr sequences are rejected when the schedule is
// built, before any model or optimizer state exists.
fn mismatched_schedule_is_a_configuration_error() {
    let err = Schedule::phased(&[100, 200, 300], &[1e-2, 1e-3]).unwrap_err();
    assert_eq!(err, ModelError::ScheduleLengthMismatch { niter_len: 3, lr_len: 2 });
}

#[test]
// Purpose
// -------
// With an origin index configured, the forward warp of every trial maps
// that index to the same shared-time value exactly — after random
// initialization and after training steps.
fn origin_pinning_holds_exactly_through_training() {
    let x = noisy_tensor(5, 16, 3, 11);
    let origin = 4;
    let mut config = ModelConfig::new(1);
    config.warptype = WarpType::Nonlinear;
    config.warpinit = WarpInit::Randn;
    config.origin_idx = Some(origin);
    let mut model = TimeWarpedPca::new(config).unwrap();

    let options = FitOptions {
        schedule: Schedule::constant(15, 1e-3).unwrap(),
        seed: Some(12),
        ..FitOptions::default()
    };
    model.fit(&x, &options).unwrap();

    let positions = model.effective_parameters().unwrap().warp_positions;
    let anchor = positions[[0, origin]];
    for i in 1..5 {
        assert_eq!(positions[[i, origin]], anchor);
    }
}
