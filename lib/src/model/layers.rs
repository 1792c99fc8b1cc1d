use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
  Relu,
  Sigmoid,
  Linear,
}

/// Numerically stable sigmoid: σ(x) = 1 / (1 + exp(-x))
pub fn sigmoid(v: f32) -> f32 {
  if v >= 0.0 {
    1.0 / (1.0 + (-v).exp())
  } else {
    let exp_v = v.exp();
    exp_v / (1.0 + exp_v)
  }
}

impl Activation {
  pub fn apply(self, z: &Array2<f32>) -> Array2<f32> {
    match self {
      Activation::Relu => z.mapv(|v| v.max(0.0)),
      Activation::Sigmoid => z.mapv(sigmoid),
      Activation::Linear => z.clone(),
    }
  }

  /// dA/dZ evaluated at `z`.
  pub fn derivative(self, z: &Array2<f32>) -> Array2<f32> {
    match self {
      Activation::Relu => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
      Activation::Sigmoid => z.mapv(|v| {
        let s = sigmoid(v);
        s * (1.0 - s)
      }),
      Activation::Linear => Array2::ones(z.raw_dim()),
    }
  }
}

/// Fully connected layer: `activation(x · kernel + bias)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
  pub(crate) name: String,
  /// input_dim x units
  pub(crate) kernel: Array2<f32>,
  pub(crate) bias: Array1<f32>,
  pub(crate) activation: Activation,
}

impl Dense {
  /// Glorot-uniform kernel, zero bias.
  pub fn new<R: Rng>(name: &str, input_dim: usize, units: usize, activation: Activation, rng: &mut R) -> Self {
    let limit = (6.0 / (input_dim + units) as f32).sqrt();
    let kernel = Array2::from_shape_fn((input_dim, units), |_| rng.gen_range(-limit..limit));
    Self {
      name: name.to_string(),
      kernel,
      bias: Array1::zeros(units),
      activation,
    }
  }

  pub fn from_parts(
    name: &str,
    kernel: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
  ) -> Result<Self, ModelError> {
    if kernel.ncols() != bias.len() {
      return Err(ModelError::Shape(format!(
        "layer {}: kernel has {} units but bias has {}",
        name,
        kernel.ncols(),
        bias.len()
      )));
    }
    Ok(Self {
      name: name.to_string(),
      kernel: kernel.as_standard_layout().into_owned(),
      bias: bias.as_standard_layout().into_owned(),
      activation,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn input_dim(&self) -> usize {
    self.kernel.nrows()
  }

  pub fn units(&self) -> usize {
    self.kernel.ncols()
  }

  pub fn activation(&self) -> Activation {
    self.activation
  }

  pub fn kernel(&self) -> &Array2<f32> {
    &self.kernel
  }

  pub fn bias(&self) -> &Array1<f32> {
    &self.bias
  }

  pub fn param_count(&self) -> usize {
    self.kernel.len() + self.bias.len()
  }

  /// Returns the pre-activation and the activation.
  pub fn forward(&self, x: &Array2<f32>) -> Result<(Array2<f32>, Array2<f32>), ModelError> {
    if x.ncols() != self.input_dim() {
      return Err(ModelError::Shape(format!(
        "layer {} expects {} inputs, got {}",
        self.name,
        self.input_dim(),
        x.ncols()
      )));
    }
    let mut z = x.dot(&self.kernel);
    z += &self.bias;
    let a = self.activation.apply(&z);
    Ok((z, a))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;
  use ndarray::array;
  use rand::{rngs::StdRng, SeedableRng};

  #[test]
  fn test_sigmoid() {
    assert_relative_eq!(sigmoid(0.0), 0.5);
    assert_relative_eq!(sigmoid(100.0), 1.0, epsilon = 1e-6);
    assert_relative_eq!(sigmoid(-100.0), 0.0, epsilon = 1e-6);
    assert_relative_eq!(sigmoid(1.5) + sigmoid(-1.5), 1.0, epsilon = 1e-6);
  }

  #[test]
  fn test_relu_derivative() {
    let z = array![[-1.0f32, 0.0, 2.0]];
    assert_eq!(Activation::Relu.apply(&z), array![[0.0f32, 0.0, 2.0]]);
    assert_eq!(Activation::Relu.derivative(&z), array![[0.0f32, 0.0, 1.0]]);
  }

  #[test]
  fn test_dense_forward() {
    let layer = Dense::from_parts(
      "dense",
      array![[1.0f32, -1.0], [2.0, 0.5]],
      array![0.5f32, 0.0],
      Activation::Relu,
    )
    .unwrap();
    let (z, a) = layer.forward(&array![[1.0f32, 1.0], [0.0, 2.0]]).unwrap();
    assert_eq!(z, array![[3.5f32, -0.5], [4.5, 1.0]]);
    assert_eq!(a, array![[3.5f32, 0.0], [4.5, 1.0]]);
  }

  #[test]
  fn test_dense_rejects_wrong_width() {
    let mut rng = StdRng::seed_from_u64(0);
    let layer = Dense::new("dense", 11, 12, Activation::Relu, &mut rng);
    assert!(matches!(layer.forward(&Array2::zeros((4, 10))), Err(ModelError::Shape(_))));
  }

  #[test]
  fn test_glorot_limits() {
    let mut rng = StdRng::seed_from_u64(0);
    let layer = Dense::new("dense", 11, 12, Activation::Relu, &mut rng);
    let limit = (6.0f32 / 23.0).sqrt();
    assert!(layer.kernel().iter().all(|w| w.abs() <= limit));
    assert_eq!(layer.param_count(), 11 * 12 + 12);
  }

  #[test]
  fn test_from_parts_shape_check() {
    let err = Dense::from_parts("d", Array2::zeros((3, 2)), Array1::zeros(3), Activation::Linear);
    assert!(err.is_err());
  }
}
