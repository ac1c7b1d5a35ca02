//! Phased iteration schedules for the trainer.
//!
//! Purpose
//! -------
//! Pair up iteration counts with learning rates into an ordered list of
//! phases, validated at construction so a malformed schedule fails
//! before any optimizer step runs.
//!
//! Conventions
//! -----------
//! - Phases run back to back over the same parameter and optimizer
//!   state; only the learning rate changes between them.
//! - A scalar (niter, lr) pair is a single-phase schedule.

use crate::model::errors::{ModelError, ModelResult};

/// One training phase: a number of steps at a fixed learning rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phase {
    pub niter: usize,
    pub lr: f64,
}

/// Validated sequence of training phases.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    phases: Vec<Phase>,
}

impl Schedule {
    /// Single-phase schedule.
    ///
    /// # Errors
    /// - [`ModelError::InvalidLearningRate`] when `lr` is not finite and
    ///   strictly positive.
    pub fn constant(niter: usize, lr: f64) -> ModelResult<Self> {
        Schedule::phased(&[niter], &[lr])
    }

    /// Multi-phase schedule from parallel `niter` and `lr` sequences.
    ///
    /// # Errors
    /// - [`ModelError::ScheduleLengthMismatch`] when the sequences do
    ///   not pair up one-to-one.
    /// - [`ModelError::InvalidLearningRate`] on any non-finite or
    ///   non-positive rate.
    pub fn phased(niter: &[usize], lr: &[f64]) -> ModelResult<Self> {
        if niter.len() != lr.len() {
            return Err(ModelError::ScheduleLengthMismatch {
                niter_len: niter.len(),
                lr_len: lr.len(),
            });
        }
        for &rate in lr {
            if !rate.is_finite() {
                return Err(ModelError::InvalidLearningRate {
                    value: rate,
                    reason: "learning rate must be finite",
                });
            }
            if rate <= 0.0 {
                return Err(ModelError::InvalidLearningRate {
                    value: rate,
                    reason: "learning rate must be strictly positive",
                });
            }
        }
        let phases = niter
            .iter()
            .zip(lr)
            .map(|(&niter, &lr)| Phase { niter, lr })
            .collect();
        Ok(Schedule { phases })
    }

    /// Phases in execution order.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Total number of optimizer steps across all phases.
    pub fn total_iterations(&self) -> usize {
        self.phases.iter().map(|p| p.niter).sum()
    }
}

impl Default for Schedule {
    /// 1000 steps at 1e-3.
    fn default() -> Self {
        Schedule {
            phases: vec![Phase { niter: 1000, lr: 1e-3 }],
        }
    }
}
