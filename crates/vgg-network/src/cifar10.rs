//! Constants describing the CIFAR-10 input pipeline this network is shaped for.

pub const NUM_CLASSES: usize = 10;
pub const NUM_EXAMPLES_PER_EPOCH_FOR_TRAIN: usize = 50000;
pub const NUM_EXAMPLES_PER_EPOCH_FOR_EVAL: usize = 10000;

pub const IMAGE_SIZE: usize = 32;
pub const IMAGE_DEPTH: usize = 3;
