use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Exponential decay applied in discrete steps:
/// `initial_learning_rate * decay_factor ^ floor(step / decay_steps)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StaircaseDecay {
    initial_learning_rate: f64,
    decay_factor: f64,
    decay_steps: u64,
}

impl StaircaseDecay {
    pub fn new(
        initial_learning_rate: f64,
        decay_factor: f64,
        decay_steps: u64,
    ) -> Result<Self, ConfigError> {
        if decay_steps == 0 {
            return Err(ConfigError::ZeroDecaySteps);
        }

        Ok(Self {
            initial_learning_rate,
            decay_factor,
            decay_steps,
        })
    }

    pub fn decay_steps(&self) -> u64 {
        self.decay_steps
    }

    pub fn learning_rate(&self, step: u64) -> f64 {
        let decays = i32::try_from(step / self.decay_steps).unwrap_or(i32::MAX);

        self.initial_learning_rate * self.decay_factor.powi(decays)
    }
}
