use std::marker::PhantomData;

use burn::{
    config::Config,
    module::AutodiffModule,
    optim::{momentum::MomentumConfig, GradientsParams, Optimizer, SgdConfig},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use vgg_network::{
    layer::Phase,
    model::{ModelOutput, Vgg, VggConfig},
};

use crate::{
    metrics,
    objective::{self, Objective, ScalarSummary},
    schedule::StaircaseDecay,
    ConfigError,
};

#[derive(Config, Debug)]
pub struct TrainConfig {
    pub model: VggConfig,
    #[config(default = 128)]
    pub batch_size: usize,
    #[config(default = 50000)]
    pub examples_per_epoch: usize,
    /// Epochs after which the learning rate decays.
    #[config(default = 25)]
    pub epochs_per_decay: usize,
    #[config(default = 0.1)]
    pub decay_factor: f64,
    #[config(default = 1e-2)]
    pub initial_learning_rate: f64,
    #[config(default = 0.9)]
    pub momentum: f64,
}

impl TrainConfig {
    /// Whole batches in an epoch, a trailing partial batch is not counted.
    pub fn batches_per_epoch(&self) -> Result<usize, ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::EmptyBatch);
        }

        Ok(self.examples_per_epoch / self.batch_size)
    }

    pub fn decay_steps(&self) -> Result<u64, ConfigError> {
        Ok((self.batches_per_epoch()? * self.epochs_per_decay) as u64)
    }

    pub fn schedule(&self) -> Result<StaircaseDecay, ConfigError> {
        StaircaseDecay::new(
            self.initial_learning_rate,
            self.decay_factor,
            self.decay_steps()?,
        )
    }

    /// Sets up momentum SGD over `M`, starting from `global_step`.
    pub fn init<B: AutodiffBackend, M: AutodiffModule<B>>(
        &self,
        global_step: GlobalStep,
    ) -> Result<Trainer<B, M, impl Optimizer<M, B>>, ConfigError> {
        let schedule = self.schedule()?;
        let optimizer = SgdConfig::new()
            .with_momentum(Some(
                MomentumConfig::new()
                    .with_momentum(self.momentum)
                    .with_dampening(0.0),
            ))
            .init();

        Ok(Trainer::new(optimizer, schedule, global_step))
    }
}

/// The number of updates applied so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalStep(u64);

impl GlobalStep {
    pub fn new(step: u64) -> Self {
        Self(step)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    fn increment(&mut self) {
        self.0 += 1;
    }
}

/// Applies optimizer updates, advancing the global step once per update.
pub struct Trainer<B: AutodiffBackend, M: AutodiffModule<B>, O: Optimizer<M, B>> {
    optimizer: O,
    schedule: StaircaseDecay,
    global_step: GlobalStep,
    _marker: PhantomData<(B, M)>,
}

impl<B: AutodiffBackend, M: AutodiffModule<B>, O: Optimizer<M, B>> Trainer<B, M, O> {
    pub fn new(optimizer: O, schedule: StaircaseDecay, global_step: GlobalStep) -> Self {
        Self {
            optimizer,
            schedule,
            global_step,
            _marker: PhantomData,
        }
    }

    pub fn global_step(&self) -> GlobalStep {
        self.global_step
    }

    pub fn learning_rate(&self) -> f64 {
        self.schedule.learning_rate(self.global_step.get())
    }

    /// Takes one step minimizing `total_loss`, returning a `learning_rate` summary of the rate
    /// the step used along with the updated module.
    pub fn train(&mut self, module: M, total_loss: Tensor<B, 1>) -> (ScalarSummary, M) {
        let learning_rate = self.learning_rate();
        let gradients = GradientsParams::from_grads(total_loss.backward(), &module);
        let module = self.optimizer.step(learning_rate, module, gradients);

        self.global_step.increment();

        (ScalarSummary::new("learning_rate", learning_rate), module)
    }
}

/// What a single training step on the network observed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// The global step the update was applied at.
    pub step: u64,
    pub loss: ScalarSummary,
    pub learning_rate: ScalarSummary,
    pub cross_entropy: f64,
    pub regularization: f64,
    pub accuracy: f64,
}

/// Runs the network on a batch in the training phase and applies one update.
#[instrument(skip_all, fields(step = trainer.global_step().get()))]
pub fn train_step<B: AutodiffBackend, O: Optimizer<Vgg<B>, B>>(
    trainer: &mut Trainer<B, Vgg<B>, O>,
    model: Vgg<B>,
    images: Tensor<B, 4>,
    labels: Tensor<B, 1, Int>,
) -> (Vgg<B>, StepReport) {
    let step = trainer.global_step().get();
    let ModelOutput { logits, penalties } = model.forward(images, Phase::Train);
    let accuracy = metrics::accuracy(logits.clone().detach(), labels.clone());

    let Objective {
        total,
        cross_entropy,
        regularization,
        ..
    } = objective::assemble(logits, labels, penalties);
    let loss = ScalarSummary::new("loss", scalar(total.clone()));

    let (learning_rate, model) = trainer.train(model, total);

    let report = StepReport {
        step,
        loss,
        learning_rate,
        cross_entropy: scalar(cross_entropy),
        regularization: scalar(regularization),
        accuracy,
    };

    tracing::debug!(
        loss = report.loss.value,
        learning_rate = report.learning_rate.value,
        accuracy = report.accuracy,
        "applied update"
    );

    (model, report)
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem()
}

#[cfg(test)]
mod tests {
    use burn::{
        module::{Module, Param},
        tensor::{Data, Shape},
    };
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use vgg_network::cifar10;

    use super::*;
    use crate::TestAutodiffBackend;

    #[derive(Module, Debug)]
    struct Scale<B: Backend> {
        weight: Param<Tensor<B, 1>>,
    }

    #[test]
    fn default_schedule_decays_after_25_epochs() {
        let config = TrainConfig::new(VggConfig::new());

        assert_eq!(config.examples_per_epoch, cifar10::NUM_EXAMPLES_PER_EPOCH_FOR_TRAIN);
        assert_eq!(config.batches_per_epoch(), Ok(390));
        assert_eq!(config.decay_steps(), Ok(9750));

        let schedule = config.schedule().unwrap();
        assert_eq!(schedule.learning_rate(0), 1e-2);
        assert!((schedule.learning_rate(9750) - 1e-3).abs() < 1e-12);
    }

    #[test]
    fn empty_batches_are_rejected() {
        let config = TrainConfig::new(VggConfig::new()).with_batch_size(0);

        assert_eq!(config.batches_per_epoch(), Err(ConfigError::EmptyBatch));
        assert_eq!(config.schedule().unwrap_err(), ConfigError::EmptyBatch);
    }

    #[test]
    fn epoch_smaller_than_batch_is_rejected() {
        let config = TrainConfig::new(VggConfig::new()).with_examples_per_epoch(100);

        assert_eq!(config.batches_per_epoch(), Ok(0));
        assert_eq!(config.decay_steps(), Ok(0));
        assert!(matches!(
            config.init::<TestAutodiffBackend, Scale<TestAutodiffBackend>>(GlobalStep::default()),
            Err(ConfigError::ZeroDecaySteps)
        ));
    }

    #[test]
    fn momentum_step_moves_against_gradient() {
        let config = TrainConfig::new(VggConfig::new())
            .with_examples_per_epoch(2)
            .with_batch_size(1)
            .with_epochs_per_decay(1)
            .with_initial_learning_rate(0.5);
        let mut trainer = config
            .init::<TestAutodiffBackend, Scale<TestAutodiffBackend>>(GlobalStep::default())
            .unwrap();
        let mut module = Scale {
            weight: Param::from(Tensor::from_floats([1.0])),
        };

        let mut learning_rates = Vec::new();
        for _ in 0..3 {
            // d/dw (w^2) = 2w
            let weight = module.weight.val();
            let loss = (weight.clone() * weight).sum();
            let (summary, updated) = trainer.train(module, loss);

            learning_rates.push(summary.value);
            module = updated;
        }

        assert_eq!(trainer.global_step(), GlobalStep::new(3));
        assert_eq!(learning_rates, [0.5, 0.5, 0.05]);

        // v1 = 2, w1 = 1 - 0.5 * 2 = 0
        // v2 = 0.9 * 2 + 0 = 1.8, w2 = 0 - 0.5 * 1.8 = -0.9
        // v3 = 0.9 * 1.8 - 1.8 = -0.18, w3 = -0.9 + 0.05 * 0.18 = -0.891
        module
            .weight
            .val()
            .into_data()
            .assert_approx_eq(&Data::from([-0.891]), 4);
    }

    #[test]
    fn network_step_reports_and_advances() {
        let config = TrainConfig::new(VggConfig::new().with_num_classes(cifar10::NUM_CLASSES));
        let model = config
            .model
            .init::<TestAutodiffBackend>()
            .unwrap();
        let mut trainer = config
            .init::<TestAutodiffBackend, Vgg<TestAutodiffBackend>>(GlobalStep::new(41))
            .unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let images = Tensor::from_floats(Data::new(
            (0..2 * 32 * 32 * 3).map(|_| rng.gen::<f32>()).collect(),
            Shape::new([2, 32, 32, 3]),
        ));
        let labels = Tensor::from_ints([1, 6]);

        let (_, report) = train_step(&mut trainer, model, images, labels);

        assert_eq!(report.step, 41);
        assert_eq!(trainer.global_step(), GlobalStep::new(42));
        assert_eq!(report.learning_rate.value, 1e-2);
        assert!(report.loss.value.is_finite());
        assert!(
            (report.loss.value - report.cross_entropy - report.regularization).abs()
                < 1e-4 * report.loss.value.abs().max(1.0)
        );
        assert!((0.0..=1.0).contains(&report.accuracy));
    }
}
