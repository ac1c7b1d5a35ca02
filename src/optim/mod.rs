//! First-order optimizers for the phased training loop.
//!
//! Purpose
//! -------
//! Stateful per-parameter-group update rules. Each trainable matrix
//! (time, neuron, trial, warp) owns one [`OptimizerState`]; the trainer
//! calls [`OptimizerState::step`] once per group per iteration with the
//! learning rate of the active phase.
//!
//! Key behaviors
//! -------------
//! - `Adam` keeps exponential first and second moment estimates with
//!   bias correction; moments are sized lazily on the first step and
//!   persist across phases and repeated `fit` calls, so a phase change
//!   only swaps the learning rate, never the trajectory memory.
//! - `GradientDescent` is plain steepest descent, useful when an exact
//!   stationary point matters more than fast progress.
//!
//! Conventions
//! -----------
//! - Tags parse from strings the way the warp tags do, case-insensitive
//!   with a structured error on unknown names.

use crate::model::errors::ModelError;
use ndarray::Array2;
use std::str::FromStr;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

/// Optimizer selection tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    /// Adam with the standard (0.9, 0.999) moment decays.
    Adam,
    /// Plain steepest descent.
    GradientDescent,
}

impl FromStr for OptimizerKind {
    type Err = ModelError;

    /// Parse an optimizer tag (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "adam" => Ok(OptimizerKind::Adam),
            "gd" | "gradient_descent" => Ok(OptimizerKind::GradientDescent),
            _ => Err(ModelError::UnknownOptimizer {
                name: s.to_string(),
                reason: "Valid options are 'adam' or 'gradient_descent'.",
            }),
        }
    }
}

/// Per-group optimizer state.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizerState {
    GradientDescent,
    Adam {
        /// Step count for bias correction.
        t: u64,
        /// First-moment estimate, sized on first use.
        m: Array2<f64>,
        /// Second-moment estimate, sized on first use.
        v: Array2<f64>,
    },
}

impl OptimizerState {
    /// Fresh state for the given kind.
    pub fn new(kind: OptimizerKind) -> Self {
        match kind {
            OptimizerKind::GradientDescent => OptimizerState::GradientDescent,
            OptimizerKind::Adam => OptimizerState::Adam {
                t: 0,
                m: Array2::zeros((0, 0)),
                v: Array2::zeros((0, 0)),
            },
        }
    }

    /// Apply one in-place update to a parameter matrix.
    pub fn step(&mut self, params: &mut Array2<f64>, grad: &Array2<f64>, lr: f64) {
        match self {
            OptimizerState::GradientDescent => {
                for (p, &g) in params.iter_mut().zip(grad.iter()) {
                    *p -= lr * g;
                }
            }
            OptimizerState::Adam { t, m, v } => {
                if m.raw_dim() != grad.raw_dim() {
                    *m = Array2::zeros(grad.raw_dim());
                    *v = Array2::zeros(grad.raw_dim());
                    *t = 0;
                }
                *t += 1;
                let bias1 = 1.0 - ADAM_BETA1.powf(*t as f64);
                let bias2 = 1.0 - ADAM_BETA2.powf(*t as f64);
                for ((p, &g), (m_e, v_e)) in params
                    .iter_mut()
                    .zip(grad.iter())
                    .zip(m.iter_mut().zip(v.iter_mut()))
                {
                    *m_e = ADAM_BETA1 * *m_e + (1.0 - ADAM_BETA1) * g;
                    *v_e = ADAM_BETA2 * *v_e + (1.0 - ADAM_BETA2) * g * g;
                    let m_hat = *m_e / bias1;
                    let v_hat = *v_e / bias2;
                    *p -= lr * m_hat / (v_hat.sqrt() + ADAM_EPS);
                }
            }
        }
    }
}
