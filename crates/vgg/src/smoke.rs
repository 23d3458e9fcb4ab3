use std::error::Error;

use burn::{
    backend::Autodiff,
    tensor::{backend::Backend, Data, Int, Shape, Tensor},
};
use burn_wgpu::Wgpu;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::instrument;
use vgg_network::{
    cifar10,
    model::{input_shape, Vgg},
};
use vgg_train::train::{self, GlobalStep, TrainConfig};

type SmokeBackend = Autodiff<Wgpu>;

#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum SmokeError {
    #[error("the network must have at least one class")]
    NoClasses,
}

struct Batch<B: Backend> {
    images: Tensor<B, 4>,
    labels: Tensor<B, 1, Int>,
}

// Uniform noise images with uniformly drawn labels.
fn synthetic_batch<B: Backend>(
    batch_size: usize,
    num_classes: usize,
    rng: &mut impl Rng,
) -> Batch<B> {
    let shape = input_shape(batch_size);
    let images = (0..shape.iter().product())
        .map(|_| rng.gen::<f32>())
        .collect();
    let labels = (0..batch_size)
        .map(|_| rng.gen_range(0..num_classes) as i32)
        .collect();

    Batch {
        images: Tensor::from_floats(Data::new(images, Shape::new(shape))),
        labels: Tensor::from_ints(Data::new(labels, Shape::new([batch_size]))),
    }
}

#[instrument(name = "smoke", skip(config))]
pub fn run(config: &TrainConfig, steps: usize) -> Result<(), Box<dyn Error>> {
    if config.model.num_classes == 0 {
        return Err(SmokeError::NoClasses.into());
    }

    SmokeBackend::seed(config.model.seed);

    let mut rng = StdRng::seed_from_u64(config.model.seed);
    let mut model = config.model.init::<SmokeBackend>()?;
    let mut trainer = config.init::<SmokeBackend, Vgg<SmokeBackend>>(GlobalStep::default())?;
    let decay_steps = config.decay_steps()?;

    tracing::info!(
        batch_size = config.batch_size,
        decay_steps,
        image_size = cifar10::IMAGE_SIZE,
        "initialized network"
    );

    for _ in 0..steps {
        let Batch { images, labels } =
            synthetic_batch(config.batch_size, config.model.num_classes, &mut rng);

        let (updated, report) = train::train_step(&mut trainer, model, images, labels);
        model = updated;

        tracing::info!(
            step = report.step,
            loss = report.loss.value,
            cross_entropy = report.cross_entropy,
            regularization = report.regularization,
            learning_rate = report.learning_rate.value,
            accuracy = report.accuracy,
            "trained on batch"
        );
        println!("[step {}] {} {}", report.step, report.loss, report.learning_rate);
    }

    Ok(())
}
