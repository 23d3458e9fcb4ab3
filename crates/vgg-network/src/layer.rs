use burn::{
    module::{Module, Param},
    tensor::{backend::Backend, module::conv2d, ops::ConvOptions, Distribution, Tensor},
};

/// Whether dropout is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Inference,
}

impl From<bool> for Phase {
    fn from(train_phase: bool) -> Self {
        if train_phase {
            Self::Train
        } else {
            Self::Inference
        }
    }
}

/// Spatial padding of a convolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Padding {
    /// No padding, the output shrinks by the kernel size minus one.
    Valid,
    /// Zero padding so that the output has `ceil(input / stride)` rows and columns. When the
    /// total padding is odd the extra row or column goes below or to the right.
    Same,
}

impl Padding {
    /// The zero padding `(before, after)` along one spatial axis.
    pub fn amount(
        self,
        input_length: usize,
        kernel_length: usize,
        stride: usize,
    ) -> (usize, usize) {
        match self {
            Self::Valid => (0, 0),
            Self::Same => {
                let output_length = (input_length + stride - 1) / stride;
                let total = (output_length.saturating_sub(1) * stride + kernel_length)
                    .saturating_sub(input_length);

                (total / 2, total - total / 2)
            }
        }
    }
}

// Appends `length` zeros along `dim`.
fn pad_after<B: Backend>(input: Tensor<B, 4>, dim: usize, length: usize) -> Tensor<B, 4> {
    if length == 0 {
        return input;
    }

    let mut shape = input.dims();
    shape[dim] = length;

    Tensor::cat(vec![input, Tensor::zeros(shape)], dim)
}

/// The result of applying a weight-bearing layer.
pub struct LayerOutput<B: Backend, const D: usize> {
    pub activation: Tensor<B, D>,
    /// `weight_decay * 0.5 * sum(W^2)` for the layer's weight.
    pub penalty: Tensor<B, 1>,
}

pub fn l2_penalty<B: Backend, const D: usize>(
    weight: Tensor<B, D>,
    weight_decay: f64,
) -> Tensor<B, 1> {
    (weight.clone() * weight).sum().mul_scalar(0.5 * weight_decay)
}

/// Inverted dropout: units survive with probability `keep_rate` and are scaled by its inverse.
/// Outside of training this is the identity.
pub fn dropout<B: Backend, const D: usize>(
    input: Tensor<B, D>,
    keep_rate: f64,
    phase: Phase,
) -> Tensor<B, D> {
    match phase {
        Phase::Inference => input,
        Phase::Train => {
            let mask = input.random_like(Distribution::Bernoulli(keep_rate));

            (input * mask).div_scalar(keep_rate)
        }
    }
}

/// A 2D convolution with a bias.
///
/// The kernel keeps its declared `[kernel_h, kernel_w, in_channels, out_channels]` layout and is
/// only rearranged into the backend's layout when applied. Inputs and outputs are
/// `[batch, channels, height, width]`.
#[derive(Module, Debug)]
pub struct ConvLayer<B: Backend> {
    weight: Param<Tensor<B, 4>>,
    bias: Param<Tensor<B, 1>>,
    stride: usize,
    same_padding: bool,
    weight_decay: f64,
}

impl<B: Backend> ConvLayer<B> {
    pub(crate) fn new(
        weight: Param<Tensor<B, 4>>,
        bias: Param<Tensor<B, 1>>,
        stride: usize,
        padding: Padding,
        weight_decay: f64,
    ) -> Self {
        Self {
            weight,
            bias,
            stride,
            same_padding: padding == Padding::Same,
            weight_decay,
        }
    }

    pub fn padding(&self) -> Padding {
        if self.same_padding {
            Padding::Same
        } else {
            Padding::Valid
        }
    }

    pub fn weight(&self) -> Tensor<B, 4> {
        self.weight.val()
    }

    pub fn bias(&self) -> Tensor<B, 1> {
        self.bias.val()
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> LayerOutput<B, 4> {
        let weight = self.weight.val();
        let [kernel_height, kernel_width, _, _] = weight.dims();
        let [_, _, height, width] = input.dims();

        let (top, bottom) = self.padding().amount(height, kernel_height, self.stride);
        let (left, right) = self.padding().amount(width, kernel_width, self.stride);
        // The convolution pads symmetrically, any surplus below or to the right is added here.
        let input = pad_after(pad_after(input, 2, bottom - top), 3, right - left);

        // [kernel_h, kernel_w, in, out] -> [out, in, kernel_h, kernel_w]
        let kernel = weight
            .clone()
            .swap_dims(0, 3)
            .swap_dims(1, 2)
            .swap_dims(2, 3);

        let activation = conv2d(
            input,
            kernel,
            Some(self.bias.val()),
            ConvOptions::new(
                [self.stride, self.stride],
                [top, left],
                [1, 1],
                1,
            ),
        );

        LayerOutput {
            activation,
            penalty: l2_penalty(weight, self.weight_decay),
        }
    }
}

/// A fully-connected layer computing `input @ W + b`.
#[derive(Module, Debug)]
pub struct FcLayer<B: Backend> {
    weight: Param<Tensor<B, 2>>,
    bias: Param<Tensor<B, 1>>,
    weight_decay: f64,
}

impl<B: Backend> FcLayer<B> {
    pub(crate) fn new(
        weight: Param<Tensor<B, 2>>,
        bias: Param<Tensor<B, 1>>,
        weight_decay: f64,
    ) -> Self {
        Self {
            weight,
            bias,
            weight_decay,
        }
    }

    pub fn weight(&self) -> Tensor<B, 2> {
        self.weight.val()
    }

    pub fn bias(&self) -> Tensor<B, 1> {
        self.bias.val()
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> LayerOutput<B, 2> {
        let weight = self.weight.val();
        let activation = input.matmul(weight.clone()) + self.bias.val().unsqueeze();

        LayerOutput {
            activation,
            penalty: l2_penalty(weight, self.weight_decay),
        }
    }
}
