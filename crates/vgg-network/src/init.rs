use burn::tensor::{backend::Backend, Data, Shape, Tensor};
use rand::Rng;
use rand_distr::StandardNormal;

// Samples outside this many standard deviations are redrawn.
const TRUNCATION: f64 = 2.0;

// Correction applied to the standard deviation so the truncated distribution keeps roughly the
// variance the scaling factor asks for.
const TRUNCATION_CORRECTION: f64 = 1.3;

/// How the values of a freshly allocated parameter are chosen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Initializer {
    /// Truncated normal noise with a standard deviation of `sqrt(1.3 * factor / fan_in)`.
    VarianceScaling { factor: f64 },
    Constant(f32),
}

impl Initializer {
    /// He initialization, the default for convolution and fully-connected weights.
    pub const HE: Self = Self::VarianceScaling { factor: 2.0 };
    /// The default for biases.
    pub const ZERO: Self = Self::Constant(0.0);

    pub fn init<B: Backend, const D: usize>(
        &self,
        shape: [usize; D],
        rng: &mut impl Rng,
    ) -> Tensor<B, D> {
        let length = shape.iter().product();

        let values = match *self {
            Self::VarianceScaling { factor } => {
                let standard_deviation = scaled_deviation(factor, &shape);

                (0..length)
                    .map(|_| (truncated_normal(rng) * standard_deviation) as f32)
                    .collect()
            }
            Self::Constant(value) => vec![value; length],
        };

        Tensor::from_floats(Data::new(values, Shape::new(shape)))
    }

    /// The standard deviation a variance-scaling initializer samples with for the given shape.
    pub fn standard_deviation(&self, shape: &[usize]) -> Option<f64> {
        match *self {
            Self::VarianceScaling { factor } => Some(scaled_deviation(factor, shape)),
            Self::Constant(_) => None,
        }
    }
}

/// The number of inputs feeding each output unit of a parameter with the given shape.
///
/// Shapes are read the way layers declare them: `[in, out]` for fully-connected weights and
/// `[kernel_h, kernel_w, in, out]` for convolution kernels.
pub fn fan_in(shape: &[usize]) -> usize {
    match shape {
        [] => 1,
        [length] => *length,
        [fan_in, _] => *fan_in,
        [receptive_field @ .., fan_in, _] => receptive_field.iter().product::<usize>() * fan_in,
    }
}

fn scaled_deviation(factor: f64, shape: &[usize]) -> f64 {
    (TRUNCATION_CORRECTION * factor / fan_in(shape).max(1) as f64).sqrt()
}

fn truncated_normal(rng: &mut impl Rng) -> f64 {
    loop {
        let sample: f64 = rng.sample(StandardNormal);

        if sample.abs() <= TRUNCATION {
            return sample;
        }
    }
}
