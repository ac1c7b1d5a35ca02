//! Regularization terms for factor matrices and warp positions.
//!
//! Purpose
//! -------
//! Pure penalty functions attached to each parameter group, evaluated
//! on the *effective* values (post-positivity-transform factors, warp
//! positions) with analytic gradients for the trainer.
//!
//! Conventions
//! -----------
//! - `L2` is `weight · Σ x²` over the whole matrix.
//! - `Curvature` penalizes the discrete second derivative along each
//!   row: `weight · Σ (x[j+1] − 2x[j] + x[j−1])²`. For the warp
//!   position matrix (trials × time), rows are trials, so the penalty
//!   favors smooth per-trial time maps. Matrices with fewer than three
//!   columns have no curvature and incur no penalty.
//! - `None` disables the penalty for a group.

use ndarray::{Array2, ArrayView2};

/// Penalty attached to one parameter group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Regularizer {
    /// No penalty.
    None,
    /// Squared-norm shrinkage: `weight · Σ x²`.
    L2 { weight: f64 },
    /// Smoothness along each row: `weight · Σ (Δ²x)²`.
    Curvature { weight: f64 },
}

impl Regularizer {
    /// L2 shrinkage with the given weight.
    pub fn l2(weight: f64) -> Self {
        Regularizer::L2 { weight }
    }

    /// Curvature smoothness with the given weight.
    pub fn curvature(weight: f64) -> Self {
        Regularizer::Curvature { weight }
    }

    /// Evaluate the penalty on a parameter matrix.
    pub fn penalty(&self, value: ArrayView2<f64>) -> f64 {
        match *self {
            Regularizer::None => 0.0,
            Regularizer::L2 { weight } => weight * value.iter().map(|v| v * v).sum::<f64>(),
            Regularizer::Curvature { weight } => {
                let (n_rows, n_cols) = value.dim();
                if n_cols < 3 {
                    return 0.0;
                }
                let mut acc = 0.0;
                for r in 0..n_rows {
                    for j in 1..n_cols - 1 {
                        let d2 = value[[r, j + 1]] - 2.0 * value[[r, j]] + value[[r, j - 1]];
                        acc += d2 * d2;
                    }
                }
                weight * acc
            }
        }
    }

    /// Accumulate the penalty gradient into `grad` (same shape as
    /// `value`).
    pub fn accumulate_grad(&self, value: ArrayView2<f64>, grad: &mut Array2<f64>) {
        match *self {
            Regularizer::None => {}
            Regularizer::L2 { weight } => {
                for (g, &v) in grad.iter_mut().zip(value.iter()) {
                    *g += 2.0 * weight * v;
                }
            }
            Regularizer::Curvature { weight } => {
                let (n_rows, n_cols) = value.dim();
                if n_cols < 3 {
                    return;
                }
                for r in 0..n_rows {
                    for j in 1..n_cols - 1 {
                        let d2 = value[[r, j + 1]] - 2.0 * value[[r, j]] + value[[r, j - 1]];
                        let s = 2.0 * weight * d2;
                        grad[[r, j + 1]] += s;
                        grad[[r, j]] -= 2.0 * s;
                        grad[[r, j - 1]] += s;
                    }
                }
            }
        }
    }
}

/// One regularizer per parameter group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegularizerSet {
    pub trial: Regularizer,
    pub time: Regularizer,
    pub neuron: Regularizer,
    pub warp: Regularizer,
}

impl Default for RegularizerSet {
    /// Mild L2 shrinkage on every factor group and a curvature penalty
    /// on the warp positions.
    fn default() -> Self {
        RegularizerSet {
            trial: Regularizer::l2(1e-6),
            time: Regularizer::l2(1e-6),
            neuron: Regularizer::l2(1e-6),
            warp: Regularizer::curvature(1.0),
        }
    }
}
