use burn::tensor::{backend::Backend, ElementConversion, Int, Tensor};

/// The highest scoring class of every row of `[batch, classes]` logits.
pub fn predictions<B: Backend>(logits: Tensor<B, 2>) -> Tensor<B, 1, Int> {
    let [batch_size, _] = logits.dims();

    logits.argmax(1).reshape([batch_size])
}

/// The fraction of rows whose top-1 prediction matches the label.
pub fn accuracy<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> f64 {
    let [batch_size, _] = logits.dims();

    if batch_size == 0 {
        return 0.0;
    }

    let correct = predictions(logits)
        .equal(labels)
        .int()
        .sum()
        .into_scalar()
        .elem::<f64>();

    correct / batch_size as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    #[test]
    fn predicts_largest_logit() {
        let logits = Tensor::<TestBackend, 2>::from_floats([
            [0.1, 0.9, 0.0],
            [2.0, -1.0, 1.0],
            [0.0, 0.0, 3.0],
        ]);

        assert_eq!(predictions(logits).into_data().value, [1, 0, 2]);
    }

    #[test]
    fn counts_correct_rows() {
        let logits = Tensor::<TestBackend, 2>::from_floats([
            [0.1, 0.9],
            [2.0, -1.0],
            [0.0, 3.0],
            [1.0, 0.0],
        ]);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([1, 0, 0, 1]);

        assert_eq!(accuracy(logits, labels), 0.5);
    }
}
