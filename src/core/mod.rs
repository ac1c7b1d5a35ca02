//! Model internals: masking, factors, warm start, reconstruction, and
//! the training objective.

pub mod factors;
pub mod init;
pub mod mask;
pub mod objective;
pub mod reconstruct;

pub use factors::FactorSet;
pub use mask::MaskedDataset;
pub use objective::Gradients;
