//! Numerics — shared numerically guarded transforms.
//!
//! Purpose
//! -------
//! Centralize the small nonlinear transforms used throughout the model:
//! the positivity transform applied to raw factor matrices, its inverse
//! (used when mapping warm-start factors into the raw parameter domain),
//! and the logistic function (the softplus derivative, used by every
//! gradient chain rule that passes through the transform).
//!
//! Conventions
//! -----------
//! - All guards use an explicit cutoff (`x > 20.0`) that keeps `f64`
//!   arithmetic in a well-conditioned regime, matching the strategy of
//!   common ML libraries.
//! - These are scalar helpers; array-valued call sites map them
//!   element-wise.

pub mod transformations;

pub use self::transformations::{safe_logistic, safe_softplus, safe_softplus_inv};
