//! time_warped_pca — joint low-rank factorization and time warping of
//! trial-structured data.
//!
//! Purpose
//! -------
//! Serve as the crate root for a model that fits collections of
//! repeated, noisy time-series trials (a trial × time × channel tensor)
//! with two coupled pieces: a low-rank factorization into shared time
//! factors, channel (neuron) factors, and optional per-trial
//! amplitudes, and a per-trial strictly monotone time warp that removes
//! trial-to-trial temporal jitter. Missing entries are marked with NaN
//! and excluded from the objective by masking.
//!
//! Key behaviors
//! -------------
//! - Re-export the public model surface ([`TimeWarpedPca`],
//!   [`ModelConfig`], [`FitOptions`], [`Schedule`]) together with the
//!   tag enums and regularizers it is configured with.
//! - Warm-start factors from a masked SVD and warps from one of four
//!   strategies, then descend the masked objective with analytic
//!   gradients over a phased learning-rate schedule.
//! - Answer reconstruction, held-out-channel prediction, and
//!   inverse-warp alignment queries from the fitted parameters.
//!
//! Conventions
//! -----------
//! - Tensors are `ndarray::Array3<f64>` in (trial, time, channel)
//!   order; factor matrices are `Array2<f64>` with components along the
//!   last axis.
//! - Configuration tags (`WarpType`, `WarpInit`, `OptimizerKind`) parse
//!   from case-insensitive strings via `FromStr` and fail with
//!   structured errors on unknown names.
//! - All fallible operations return [`ModelResult`]; errors carry
//!   indices and expected/found pairs rather than prose-only messages.
//!
//! Downstream usage
//! ----------------
//! - Typical flow: build a [`ModelConfig`], construct
//!   [`TimeWarpedPca`], call `fit`, then query `reconstruct`, `predict`,
//!   `align`, or `effective_parameters`.
//! - Progress reporting goes through the `log` facade; install any
//!   logger implementation to observe it.
//!
//! Testing notes
//! -------------
//! - Numerical behavior is covered by in-module unit tests (gradients
//!   against finite differences, warp round trips, masked statistics)
//!   and by the end-to-end pipeline suite under `tests/`.

pub mod core;
pub mod model;
pub mod numerics;
pub mod optim;
pub mod regularizers;
pub mod warp;

pub use model::{
    FitOptions, ModelConfig, ModelError, ModelResult, ParameterSnapshot, Phase, Schedule,
    TimeWarpedPca,
};
pub use optim::OptimizerKind;
pub use regularizers::{Regularizer, RegularizerSet};
pub use warp::{WarpInit, WarpType};
