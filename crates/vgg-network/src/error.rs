#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("parameter `{0}` is already allocated")]
    DuplicateParameter(String),
    #[error("convolution stride must be at least 1")]
    ZeroStride,
}
