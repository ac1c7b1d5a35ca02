//! Model-level error taxonomy.
//!
//! Purpose
//! -------
//! Collect every failure mode of the public model surface into a single
//! enum, grouped by kind: configuration problems (bad tags, mismatched
//! schedule lengths), insufficient data (a channel or timepoint never
//! observed), geometry disagreements between new data and the fitted
//! model, use-before-fit, and numerical breakdown during optimization.
//!
//! Conventions
//! -----------
//! - Every error is raised synchronously at the point of detection and
//!   carries enough structure (indices, expected/found pairs) for the
//!   caller to act on it without parsing the message.
//! - Warp-family errors ([`WarpError`]) are absorbed via `From` so that
//!   model entry points can use `?` across module boundaries.

use crate::warp::errors::WarpError;
use crate::warp::{WarpInit, WarpType};

/// Result alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    // ---- Configuration ----
    /// `niter` and `lr` sequences must pair up one-to-one.
    ScheduleLengthMismatch {
        niter_len: usize,
        lr_len: usize,
    },

    /// Learning rates must be finite and strictly positive.
    InvalidLearningRate {
        value: f64,
        reason: &'static str,
    },

    /// Component count must be at least one and supported by the data.
    InvalidComponentCount {
        n_components: usize,
        reason: &'static str,
    },

    /// Shared length must allow interpolation (at least two samples).
    InvalidSharedLength {
        value: usize,
        reason: &'static str,
    },

    /// Every tensor axis must be non-empty, and the time axis must have
    /// at least two samples.
    InvalidAxisLength {
        axis: &'static str,
        len: usize,
        reason: &'static str,
    },

    /// Trial and shared time axes both need at least two samples for a
    /// finite base slope and well-defined interpolation.
    DegenerateTimeLength {
        axis: &'static str,
        len: usize,
    },

    /// Unrecognized optimizer tag.
    UnknownOptimizer {
        name: String,
        reason: &'static str,
    },

    /// Unrecognized warp-type tag.
    UnknownWarpType {
        name: String,
        reason: &'static str,
    },

    /// Unrecognized warp-initialization tag.
    UnknownWarpInit {
        name: String,
        reason: &'static str,
    },

    /// The warp family cannot express the requested initialization.
    IncompatibleWarpInit {
        warptype: WarpType,
        warpinit: WarpInit,
    },

    /// `origin_idx` must index into the trial time axis.
    OriginIdxOutOfRange {
        origin_idx: usize,
        n_timepoints: usize,
    },

    /// A data-driven warp initialization was requested without data.
    MissingWarpInitData {
        warpinit: WarpInit,
    },

    // ---- Insufficient data ----
    /// A channel with zero valid observations across all trials and times.
    ChannelNeverObserved {
        channel: usize,
    },

    /// A timepoint with zero valid observations across all trials and
    /// channels.
    TimepointNeverObserved {
        timepoint: usize,
    },

    /// Held-out refit found no row where every channel is observed.
    NoFullyObservedRows,

    // ---- Shape mismatch ----
    /// New data disagrees with the fitted model's trial count.
    TrialCountMismatch {
        expected: usize,
        found: usize,
    },

    /// New data disagrees with the fitted model's timepoint count.
    TimepointCountMismatch {
        expected: usize,
        found: usize,
    },

    /// Refitting on the same instance requires the channel count to match.
    ChannelCountMismatch {
        expected: usize,
        found: usize,
    },

    // ---- Unfitted ----
    /// Prediction or alignment requested before any `fit` call.
    NotFitted,

    // ---- Numerical ----
    /// The objective left the finite range mid-optimization.
    NonFiniteObjective {
        value: f64,
        iteration: usize,
    },

    /// The least-squares backend reported a failure.
    LeastSquaresFailed {
        reason: &'static str,
    },
}

impl std::error::Error for ModelError {}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Configuration ----
            ModelError::ScheduleLengthMismatch { niter_len, lr_len } => {
                write!(
                    f,
                    "niter and lr must have the same length: got {niter_len} and {lr_len}"
                )
            }
            ModelError::InvalidLearningRate { value, reason } => {
                write!(f, "Invalid learning rate {value}: {reason}")
            }
            ModelError::InvalidComponentCount { n_components, reason } => {
                write!(f, "Invalid component count {n_components}: {reason}")
            }
            ModelError::InvalidSharedLength { value, reason } => {
                write!(f, "Invalid shared length {value}: {reason}")
            }
            ModelError::InvalidAxisLength { axis, len, reason } => {
                write!(f, "Invalid {axis} axis of length {len}: {reason}")
            }
            ModelError::DegenerateTimeLength { axis, len } => {
                write!(
                    f,
                    "The {axis} time axis has length {len}; at least two samples are required"
                )
            }
            ModelError::UnknownOptimizer { name, reason } => {
                write!(f, "Unknown optimizer '{name}': {reason}")
            }
            ModelError::UnknownWarpType { name, reason } => {
                write!(f, "Unknown warp type '{name}': {reason}")
            }
            ModelError::UnknownWarpInit { name, reason } => {
                write!(f, "Unknown warp initialization '{name}': {reason}")
            }
            ModelError::IncompatibleWarpInit { warptype, warpinit } => {
                write!(
                    f,
                    "Warp initialization {warpinit:?} cannot be expressed by warp type {warptype:?}"
                )
            }
            ModelError::OriginIdxOutOfRange { origin_idx, n_timepoints } => {
                write!(
                    f,
                    "origin_idx {origin_idx} is out of range for {n_timepoints} timepoints"
                )
            }
            ModelError::MissingWarpInitData { warpinit } => {
                write!(
                    f,
                    "Warp initialization {warpinit:?} is data-driven and requires a dataset"
                )
            }

            // ---- Insufficient data ----
            ModelError::ChannelNeverObserved { channel } => {
                write!(f, "Channel {channel} has no valid observation in any trial")
            }
            ModelError::TimepointNeverObserved { timepoint } => {
                write!(f, "Timepoint {timepoint} has no valid observation in any trial")
            }
            ModelError::NoFullyObservedRows => {
                write!(f, "No (trial, time) row has all channels observed")
            }

            // ---- Shape mismatch ----
            ModelError::TrialCountMismatch { expected, found } => {
                write!(f, "Trial count mismatch: expected {expected}, found {found}")
            }
            ModelError::TimepointCountMismatch { expected, found } => {
                write!(f, "Timepoint count mismatch: expected {expected}, found {found}")
            }
            ModelError::ChannelCountMismatch { expected, found } => {
                write!(f, "Channel count mismatch: expected {expected}, found {found}")
            }

            // ---- Unfitted ----
            ModelError::NotFitted => {
                write!(f, "Model has not been fitted; call fit() first")
            }

            // ---- Numerical ----
            ModelError::NonFiniteObjective { value, iteration } => {
                write!(f, "Objective became non-finite ({value}) at iteration {iteration}")
            }
            ModelError::LeastSquaresFailed { reason } => {
                write!(f, "Least-squares solve failed: {reason}")
            }
        }
    }
}

impl From<WarpError> for ModelError {
    fn from(err: WarpError) -> Self {
        match err {
            WarpError::UnknownWarpType { name, reason } => {
                ModelError::UnknownWarpType { name, reason }
            }
            WarpError::UnknownWarpInit { name, reason } => {
                ModelError::UnknownWarpInit { name, reason }
            }
            WarpError::IncompatibleWarpInit { warptype, warpinit } => {
                ModelError::IncompatibleWarpInit { warptype, warpinit }
            }
            WarpError::DegenerateTimeLength { axis, len } => {
                ModelError::DegenerateTimeLength { axis, len }
            }
            WarpError::OriginIdxOutOfRange { origin_idx, n_timepoints } => {
                ModelError::OriginIdxOutOfRange { origin_idx, n_timepoints }
            }
            WarpError::MissingInitData { warpinit } => {
                ModelError::MissingWarpInitData { warpinit }
            }
        }
    }
}
