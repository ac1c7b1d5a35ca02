//! Error types for the warp function family.

use crate::warp::{WarpInit, WarpType};

/// Result alias for warp-family operations.
pub type WarpResult<T> = Result<T, WarpError>;

#[derive(Debug, Clone, PartialEq)]
pub enum WarpError {
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

    /// The chosen family cannot express the requested initialization
    /// (e.g., a pure shift warp cannot encode a per-trial stretch).
    IncompatibleWarpInit {
        warptype: WarpType,
        warpinit: WarpInit,
    },

    /// Trial and shared time axes both need at least two samples for a
    /// finite base slope and well-defined interpolation.
    DegenerateTimeLength {
        axis: &'static str,
        len: usize,
    },

    /// `origin_idx` must index into the trial time axis.
    OriginIdxOutOfRange {
        origin_idx: usize,
        n_timepoints: usize,
    },

    /// Data-driven initialization was requested without data hints.
    MissingInitData {
        warpinit: WarpInit,
    },
}

impl std::error::Error for WarpError {}

impl std::fmt::Display for WarpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarpError::UnknownWarpType { name, reason } => {
                write!(f, "Unknown warp type '{name}': {reason}")
            }
            WarpError::UnknownWarpInit { name, reason } => {
                write!(f, "Unknown warp initialization '{name}': {reason}")
            }
            WarpError::IncompatibleWarpInit { warptype, warpinit } => {
                write!(
                    f,
                    "Warp initialization {warpinit:?} cannot be expressed by warp type {warptype:?}"
                )
            }
            WarpError::DegenerateTimeLength { axis, len } => {
                write!(
                    f,
                    "The {axis} time axis has length {len}; at least two samples are required"
                )
            }
            WarpError::OriginIdxOutOfRange { origin_idx, n_timepoints } => {
                write!(
                    f,
                    "origin_idx {origin_idx} is out of range for {n_timepoints} timepoints"
                )
            }
            WarpError::MissingInitData { warpinit } => {
                write!(
                    f,
                    "Warp initialization {warpinit:?} is data-driven and requires a dataset hint"
                )
            }
        }
    }
}
