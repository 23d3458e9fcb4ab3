use std::fmt::Display;

use burn::tensor::{activation, backend::Backend, ElementConversion, Int, Tensor};
use serde::{Deserialize, Serialize};

/// A named scalar reported while training.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScalarSummary {
    pub tag: String,
    pub value: f64,
}

impl ScalarSummary {
    pub fn new(tag: impl Into<String>, value: f64) -> Self {
        Self {
            tag: tag.into(),
            value,
        }
    }
}

impl Display for ScalarSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.tag, self.value)
    }
}

/// The total loss of a batch and what it is made of.
pub struct Objective<B: Backend> {
    /// The classification term plus every regularization term.
    pub total: Tensor<B, 1>,
    pub cross_entropy: Tensor<B, 1>,
    pub regularization: Tensor<B, 1>,
    /// How many terms were summed into `total`.
    pub terms: usize,
}

/// Mean softmax cross-entropy of `[batch, classes]` logits against `[batch]` class indices.
pub fn cross_entropy<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let [batch_size, _] = logits.dims();

    activation::log_softmax(logits, 1)
        .gather(1, labels.reshape([batch_size, 1]))
        .neg()
        .mean()
}

fn sum_terms<B: Backend>(terms: Vec<Tensor<B, 1>>) -> Tensor<B, 1> {
    if terms.is_empty() {
        Tensor::zeros([1])
    } else {
        Tensor::cat(terms, 0).sum()
    }
}

/// Adds the batch's cross-entropy to the regularization terms produced by the forward pass and
/// sums them all once.
pub fn assemble<B: Backend>(
    logits: Tensor<B, 2>,
    labels: Tensor<B, 1, Int>,
    penalties: Vec<Tensor<B, 1>>,
) -> Objective<B> {
    let cross_entropy = cross_entropy(logits, labels);
    let regularization = sum_terms(penalties.clone());

    let mut terms = penalties;
    terms.push(cross_entropy.clone());
    let term_count = terms.len();

    Objective {
        total: sum_terms(terms),
        cross_entropy,
        regularization,
        terms: term_count,
    }
}

/// The total loss of a batch, along with a `loss` summary of its value.
pub fn loss<B: Backend>(
    logits: Tensor<B, 2>,
    labels: Tensor<B, 1, Int>,
    penalties: Vec<Tensor<B, 1>>,
) -> (ScalarSummary, Tensor<B, 1>) {
    let Objective { total, .. } = assemble(logits, labels, penalties);
    let summary = ScalarSummary::new("loss", total.clone().into_scalar().elem::<f64>());

    (summary, total)
}

#[cfg(test)]
mod tests {
    use burn::tensor::{Data, Shape};
    use vgg_network::{layer::Phase, model::VggConfig};

    use super::*;
    use crate::TestBackend;

    fn scalar(tensor: Tensor<TestBackend, 1>) -> f64 {
        tensor.into_scalar().elem()
    }

    #[test]
    fn cross_entropy_of_uniform_logits_is_log_classes() {
        let logits = Tensor::<TestBackend, 2>::zeros(Shape::new([4, 10]));
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([0, 3, 7, 9]);

        let loss = scalar(cross_entropy(logits, labels));

        assert!((loss - 10f64.ln()).abs() < 1e-5);
    }

    #[test]
    fn cross_entropy_picks_labelled_class() {
        let logits = Tensor::<TestBackend, 2>::from_floats([[2.0, 0.0], [0.0, 2.0]]);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([0, 0]);

        let loss = scalar(cross_entropy(logits, labels));
        let confident = (1.0 + (-2f64).exp()).ln();
        let wrong = (1.0 + 2f64.exp()).ln();

        assert!((loss - (confident + wrong) / 2.0).abs() < 1e-5);
    }

    #[test]
    fn total_is_cross_entropy_plus_penalties() {
        let logits = Tensor::<TestBackend, 2>::from_floats([[1.0, -1.0, 0.5]]);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([2]);
        let penalties = vec![
            Tensor::from_floats([0.25]),
            Tensor::from_floats([0.5]),
            Tensor::from_floats([1.0]),
        ];

        let objective = assemble(logits.clone(), labels.clone(), penalties);
        let expected = scalar(cross_entropy(logits, labels)) + 1.75;

        assert_eq!(objective.terms, 4);
        assert!((scalar(objective.regularization) - 1.75).abs() < 1e-6);
        assert!((scalar(objective.total) - expected).abs() < 1e-5);
    }

    #[test]
    fn no_penalties_leaves_cross_entropy() {
        let logits = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0]]);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([1]);

        let (summary, total) = loss(logits.clone(), labels.clone(), Vec::new());

        assert_eq!(summary.tag, "loss");
        total
            .into_data()
            .assert_approx_eq(&cross_entropy(logits, labels).into_data(), 5);
    }

    #[test]
    fn network_loss_counts_every_layer() {
        let model = VggConfig::new().init::<TestBackend>().unwrap();
        let images = Tensor::<TestBackend, 4>::from_floats(Data::new(
            (0..2 * 32 * 32 * 3)
                .map(|index| (index % 17) as f32 / 17.0)
                .collect(),
            Shape::new([2, 32, 32, 3]),
        ));
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([3, 8]);

        let output = model.forward(images, Phase::Inference);
        let penalty_sum = output
            .penalties
            .iter()
            .map(|penalty| scalar(penalty.clone()))
            .sum::<f64>();
        let objective = assemble(output.logits.clone(), labels.clone(), output.penalties);

        assert_eq!(objective.terms, 16);
        let expected = scalar(cross_entropy(output.logits, labels)) + penalty_sum;
        assert!((scalar(objective.total) - expected).abs() < 1e-4);
    }
}
