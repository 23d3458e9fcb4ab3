//! The training objective of the VGG network: loss assembly, the staircase learning-rate schedule
//! and the momentum update.

mod error;
pub mod metrics;
pub mod objective;
pub mod schedule;
pub mod train;

pub use error::ConfigError;
pub use objective::ScalarSummary;

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray;
#[cfg(test)]
pub(crate) type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
