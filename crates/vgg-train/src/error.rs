#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("batch size must be at least 1")]
    EmptyBatch,
    #[error("the learning rate would decay every 0 steps")]
    ZeroDecaySteps,
}
