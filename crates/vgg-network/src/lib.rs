//! The VGG-style network used to classify CIFAR-10 images.
//!
//! Parameters are allocated once by a [`builder::NetworkBuilder`], which owns the naming of every
//! weight and bias. Applying the network never touches global state: every weight-bearing layer
//! hands back its L2 penalty next to its activation, and [`model::Vgg::forward`] returns the
//! ordered list of penalties alongside the logits.

pub mod builder;
pub mod cifar10;
mod error;
pub mod init;
pub mod layer;
pub mod model;

pub use error::BuildError;

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray;
