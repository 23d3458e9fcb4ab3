use burn::{
    config::Config,
    module::Module,
    nn::pool::{MaxPool2d, MaxPool2dConfig},
    tensor::{activation, backend::Backend, Tensor},
};
use rand::Rng;

use crate::{
    builder::{NetworkBuilder, ParameterInfo},
    cifar10,
    layer::{dropout, ConvLayer, FcLayer, LayerOutput, Padding, Phase},
    BuildError,
};

pub const WEIGHT_DECAY: f64 = 5e-4;

const KERNEL_LENGTH: usize = 3;
const POOL_LENGTH: usize = 2;
const FC_UNITS: usize = 512;

const POOL5_KEEP_RATE: f64 = 0.5;
const FC_KEEP_RATE: f64 = 0.5;

struct ConvStage {
    name: &'static str,
    keep_rate: Option<f64>,
}

struct BlockLayout {
    scope: &'static str,
    channels: usize,
    stages: &'static [ConvStage],
}

const fn conv(name: &'static str) -> ConvStage {
    ConvStage {
        name,
        keep_rate: None,
    }
}

const fn conv_then_dropout(name: &'static str, keep_rate: f64) -> ConvStage {
    ConvStage {
        name,
        keep_rate: Some(keep_rate),
    }
}

// Every block is followed by a 2x2 max-pool with stride 2.
#[rustfmt::skip]
const BLOCKS: [BlockLayout; 5] = [
    BlockLayout {
        scope: "64",
        channels: 64,
        stages: &[conv_then_dropout("conv1", 0.7), conv("conv2")],
    },
    BlockLayout {
        scope: "128",
        channels: 128,
        stages: &[conv_then_dropout("conv3", 0.6), conv("conv4")],
    },
    BlockLayout {
        scope: "256",
        channels: 256,
        stages: &[conv_then_dropout("conv5", 0.6), conv_then_dropout("conv6", 0.6), conv("conv7")],
    },
    BlockLayout {
        scope: "512",
        channels: 512,
        stages: &[conv_then_dropout("conv8", 0.6), conv_then_dropout("conv9", 0.6), conv("conv10")],
    },
    BlockLayout {
        scope: "512b2",
        channels: 512,
        stages: &[conv_then_dropout("conv11", 0.6), conv_then_dropout("conv12", 0.6), conv("conv13")],
    },
];

/// The number of layers carrying a weight, and so the number of penalties a forward pass yields.
pub const WEIGHT_LAYERS: usize = {
    let mut layers = 2; // fc, softmax_linear
    let mut block = 0;

    while block < BLOCKS.len() {
        layers += BLOCKS[block].stages.len();
        block += 1;
    }

    layers
};

#[derive(Module, Debug)]
struct ConvBlock<B: Backend> {
    convs: Vec<ConvLayer<B>>,
    pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    fn forward(
        &self,
        input: Tensor<B, 4>,
        layout: &BlockLayout,
        phase: Phase,
        penalties: &mut Vec<Tensor<B, 1>>,
    ) -> Tensor<B, 4> {
        let x = self
            .convs
            .iter()
            .zip(layout.stages)
            .fold(input, |x, (conv, stage)| {
                let LayerOutput {
                    activation,
                    penalty,
                } = conv.forward(x);
                penalties.push(penalty);

                let x = activation::relu(activation);

                match stage.keep_rate {
                    Some(keep_rate) => dropout(x, keep_rate, phase),
                    None => x,
                }
            });

        self.pool.forward(x)
    }
}

/// The logits of a batch together with the regularization terms that produced them.
pub struct ModelOutput<B: Backend> {
    /// `[batch, num_classes]`
    pub logits: Tensor<B, 2>,
    /// One L2 penalty per weight-bearing layer, in layer order.
    pub penalties: Vec<Tensor<B, 1>>,
}

/// A 13-convolution VGG network for 32x32 images.
#[derive(Module, Debug)]
pub struct Vgg<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    fc: FcLayer<B>,
    softmax_linear: FcLayer<B>,
    keep_prob: f64,
}

impl<B: Backend> Vgg<B> {
    /// Computes logits for a batch of `[batch, height, width, channels]` images.
    pub fn forward(&self, images: Tensor<B, 4>, phase: Phase) -> ModelOutput<B> {
        let mut penalties = Vec::with_capacity(WEIGHT_LAYERS);

        // [batch, height, width, channels] -> [batch, channels, height, width]
        let x = images.swap_dims(1, 3).swap_dims(2, 3);
        let x = self
            .blocks
            .iter()
            .zip(&BLOCKS)
            .fold(x, |x, (block, layout)| {
                block.forward(x, layout, phase, &mut penalties)
            });
        let x = dropout(x, POOL5_KEEP_RATE, phase);
        let x = x.flatten::<2>(1, 3);

        let LayerOutput {
            activation,
            penalty,
        } = self.fc.forward(x);
        penalties.push(penalty);
        let x = dropout(activation::relu(activation), FC_KEEP_RATE, phase);

        let LayerOutput {
            activation: logits,
            penalty,
        } = self.softmax_linear.forward(x);
        penalties.push(penalty);

        ModelOutput { logits, penalties }
    }

    /// Applies the network, returning the configured keep probability next to the output.
    ///
    /// The keep probability is not consumed by the network: every dropout stage uses its own
    /// fixed keep rate. It is returned so callers feeding it can see the value they configured.
    pub fn get_model(&self, images: Tensor<B, 4>, train_phase: bool) -> (f64, ModelOutput<B>) {
        (self.keep_prob, self.forward(images, Phase::from(train_phase)))
    }

    pub fn keep_prob(&self) -> f64 {
        self.keep_prob
    }
}

#[derive(Config, Debug)]
pub struct VggConfig {
    #[config(default = 10)]
    pub num_classes: usize,
    #[config(default = 3)]
    pub input_channels: usize,
    #[config(default = 5e-4)]
    pub weight_decay: f64,
    /// See [`Vgg::get_model`].
    #[config(default = 0.5)]
    pub keep_prob: f64,
    #[config(default = 0)]
    pub seed: u64,
}

impl VggConfig {
    pub fn init<B: Backend>(&self) -> Result<Vgg<B>, BuildError> {
        self.build(&mut NetworkBuilder::seeded(self.seed))
    }

    /// Builds the network and also returns the parameters it allocated.
    pub fn init_described<B: Backend>(&self) -> Result<(Vgg<B>, Vec<ParameterInfo>), BuildError> {
        let mut builder = NetworkBuilder::seeded(self.seed);
        let model = self.build(&mut builder)?;

        Ok((model, builder.into_parameters()))
    }

    pub fn build<B: Backend>(
        &self,
        builder: &mut NetworkBuilder<impl Rng>,
    ) -> Result<Vgg<B>, BuildError> {
        let mut in_channels = self.input_channels;
        let mut blocks = Vec::with_capacity(BLOCKS.len());

        for layout in &BLOCKS {
            let mut convs: Vec<ConvLayer<B>> = Vec::with_capacity(layout.stages.len());

            builder.scoped(layout.scope, |builder| {
                for stage in layout.stages {
                    convs.push(builder.scoped(stage.name, |builder| {
                        builder.conv_layer(
                            [KERNEL_LENGTH, KERNEL_LENGTH, in_channels, layout.channels],
                            1,
                            Padding::Same,
                            self.weight_decay,
                        )
                    })?);

                    in_channels = layout.channels;
                }

                Ok(())
            })?;

            blocks.push(ConvBlock {
                convs,
                pool: MaxPool2dConfig::new([POOL_LENGTH, POOL_LENGTH])
                    .with_strides([POOL_LENGTH, POOL_LENGTH])
                    .init(),
            });
        }

        let fc = builder.scoped("fc", |builder| {
            builder.fc_layer([in_channels, FC_UNITS], self.weight_decay)
        })?;
        let softmax_linear = builder.scoped("softmax_linear", |builder| {
            builder.fc_layer([FC_UNITS, self.num_classes], self.weight_decay)
        })?;

        tracing::info!(
            parameters = builder.parameters().len(),
            num_classes = self.num_classes,
            "built network"
        );

        Ok(Vgg {
            blocks,
            fc,
            softmax_linear,
            keep_prob: self.keep_prob,
        })
    }
}

/// A CIFAR-10 sized batch shape, `[batch, 32, 32, 3]`.
pub fn input_shape(batch_size: usize) -> [usize; 4] {
    [
        batch_size,
        cifar10::IMAGE_SIZE,
        cifar10::IMAGE_SIZE,
        cifar10::IMAGE_DEPTH,
    ]
}
