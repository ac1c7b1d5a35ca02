//! Guarded implementations of softplus, its inverse, and the logistic.
//!
//! The softplus transform keeps effective factor values and warp
//! increments strictly positive while the optimizer works in an
//! unconstrained raw space. Naïve evaluation of `ln(1 + exp(x))` and
//! `ln(exp(x) - 1)` overflows for large `x`; the piecewise guards below
//! keep every branch inside a well-conditioned `f64` regime.

/// Numerically stable softplus: `softplus(x) = ln(1 + exp(x))`.
///
/// Maps ℝ → (0, ∞) and preserves a nonzero gradient everywhere, which is
/// what makes it suitable as the positivity transform on factor matrices
/// and as the increment transform for nonlinear warps.
///
/// For `x > 20.0`, `ln1p(exp(-x))` is below `f64` resolution and the
/// function returns `x` directly; otherwise it evaluates `ln1p(exp(x))`.
pub fn safe_softplus(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp().ln_1p() }
}

/// Stable inverse of softplus on `(0, ∞)`: solves `softplus(t) = x`.
///
/// Used to map warm-start values (already in the effective, positive
/// domain) back into the raw parameter domain. Mirrors the guard in
/// [`safe_softplus`]: for large `x` the answer is `x` to within `f64`
/// resolution; otherwise `ln(expm1(x))`.
///
/// The input must be finite and strictly positive.
pub fn safe_softplus_inv(x: f64) -> f64 {
    if x > 20.0 { x } else { x.exp_m1().ln() }
}

/// Logistic function `σ(x) = 1 / (1 + exp(-x))` — the softplus derivative.
///
/// Evaluated through `exp(-|x|)` so that neither branch can overflow.
pub fn safe_logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
