use std::{collections::HashSet, fmt::Display};

use burn::{
    module::Param,
    tensor::{backend::Backend, Tensor},
};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    init::Initializer,
    layer::{ConvLayer, FcLayer, Padding},
    BuildError,
};

/// A parameter that has been allocated by a [`NetworkBuilder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterInfo {
    pub name: String,
    pub shape: Vec<usize>,
}

impl ParameterInfo {
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Display for ParameterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.name, self.shape)
    }
}

/// Allocates the parameters of a network.
///
/// Names are hierarchical, joined with `/` from the enclosing [`scoped`](Self::scoped) calls,
/// e.g. `64/conv1/W`. A name can only be allocated once per builder.
pub struct NetworkBuilder<R: Rng> {
    rng: R,
    scope: Vec<String>,
    names: HashSet<String>,
    parameters: Vec<ParameterInfo>,
}

impl NetworkBuilder<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> NetworkBuilder<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            scope: Vec::new(),
            names: HashSet::new(),
            parameters: Vec::new(),
        }
    }

    /// Every parameter allocated so far, in allocation order.
    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }

    pub fn into_parameters(self) -> Vec<ParameterInfo> {
        self.parameters
    }

    /// Runs `build` with `name` appended to the current scope.
    pub fn scoped<T>(
        &mut self,
        name: &str,
        build: impl FnOnce(&mut Self) -> Result<T, BuildError>,
    ) -> Result<T, BuildError> {
        self.scope.push(name.to_owned());
        let result = build(self);
        self.scope.pop();

        result
    }

    fn qualify(&self, name: &str) -> String {
        self.scope
            .iter()
            .map(String::as_str)
            .chain([name])
            .collect::<Vec<_>>()
            .join("/")
    }

    fn register(&mut self, name: &str, shape: &[usize]) -> Result<(), BuildError> {
        let name = self.qualify(name);

        if !self.names.insert(name.clone()) {
            return Err(BuildError::DuplicateParameter(name));
        }

        tracing::debug!(%name, ?shape, "allocated parameter");

        self.parameters.push(ParameterInfo {
            name,
            shape: shape.to_vec(),
        });

        Ok(())
    }

    /// Allocates a trainable parameter. Weights are normally initialized with
    /// [`Initializer::HE`].
    pub fn weight<B: Backend, const D: usize>(
        &mut self,
        name: &str,
        shape: [usize; D],
        initializer: Initializer,
    ) -> Result<Param<Tensor<B, D>>, BuildError> {
        self.register(name, &shape)?;

        Ok(Param::from(initializer.init(shape, &mut self.rng)))
    }

    /// Allocates a trainable bias vector. Biases are normally initialized with
    /// [`Initializer::ZERO`].
    pub fn bias<B: Backend>(
        &mut self,
        name: &str,
        length: usize,
        initializer: Initializer,
    ) -> Result<Param<Tensor<B, 1>>, BuildError> {
        self.weight(name, [length], initializer)
    }

    /// Allocates a convolution with a `[kernel_h, kernel_w, in_channels, out_channels]` kernel
    /// named `W` and a bias named `b` in the current scope.
    pub fn conv_layer<B: Backend>(
        &mut self,
        shape: [usize; 4],
        stride: usize,
        padding: Padding,
        weight_decay: f64,
    ) -> Result<ConvLayer<B>, BuildError> {
        if stride == 0 {
            return Err(BuildError::ZeroStride);
        }

        let weight = self.weight("W", shape, Initializer::HE)?;
        let bias = self.bias("b", shape[3], Initializer::ZERO)?;

        Ok(ConvLayer::new(weight, bias, stride, padding, weight_decay))
    }

    /// Allocates a fully-connected layer with an `[in_features, out_features]` weight named `W`
    /// and a bias named `b` in the current scope.
    pub fn fc_layer<B: Backend>(
        &mut self,
        shape: [usize; 2],
        weight_decay: f64,
    ) -> Result<FcLayer<B>, BuildError> {
        let weight = self.weight("W", shape, Initializer::HE)?;
        let bias = self.bias("b", shape[1], Initializer::ZERO)?;

        Ok(FcLayer::new(weight, bias, weight_decay))
    }
}
