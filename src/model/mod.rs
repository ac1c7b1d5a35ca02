//! Public model surface: configuration, schedules, errors, and the
//! [`TimeWarpedPca`] type itself.

pub mod config;
pub mod errors;
pub mod schedule;
pub mod twpca;

pub use config::{FitOptions, ModelConfig};
pub use errors::{ModelError, ModelResult};
pub use schedule::{Phase, Schedule};
pub use twpca::{ParameterSnapshot, TimeWarpedPca};
