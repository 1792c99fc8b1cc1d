pub mod layers;
pub mod loss;
pub mod optimizer;
pub mod sequential;
pub mod training;

use std::collections::BTreeMap;

use rand::{rngs::StdRng, SeedableRng};
use serde_json::Value;
use tracing::info;

pub use layers::*;
pub use loss::*;
pub use optimizer::*;
pub use sequential::*;
pub use training::*;

use crate::error::ModelError;

/// Seed used by [`create_model`] for weight initialization.
pub const DEFAULT_INIT_SEED: u64 = 42;

/// (name, units, activation) of every layer after the input.
pub const ARCHITECTURE: [(&str, usize, Activation); 3] = [
  ("dense", 12, Activation::Relu),
  ("dense_1", 8, Activation::Relu),
  ("dense_2", 1, Activation::Sigmoid),
];

/// Framework-independent view of a compiled model, enough to check what was built or loaded.
pub trait ModelInspect {
  fn layer_count(&self) -> usize;
  fn input_dim(&self) -> usize;
  fn loss(&self) -> Loss;
  fn optimizer_config(&self) -> BTreeMap<String, Value>;
  fn metrics(&self) -> Vec<Metric>;
}

impl ModelInspect for Sequential {
  fn layer_count(&self) -> usize {
    self.layers.len()
  }

  fn input_dim(&self) -> usize {
    self.layers[0].input_dim()
  }

  fn loss(&self) -> Loss {
    self.loss
  }

  fn optimizer_config(&self) -> BTreeMap<String, Value> {
    self.optimizer.get_config()
  }

  fn metrics(&self) -> Vec<Metric> {
    self.metrics.clone()
  }
}

/// Builds the 3-layer binary classifier. Nothing is trained here.
pub fn create_model(optimizer: Optimizer, loss: &str, metrics: &[&str], input_dim: usize) -> Result<Sequential, ModelError> {
  create_model_with_seed(optimizer, loss, metrics, input_dim, DEFAULT_INIT_SEED)
}

pub fn create_model_with_seed(
  optimizer: Optimizer,
  loss: &str,
  metrics: &[&str],
  input_dim: usize,
  seed: u64,
) -> Result<Sequential, ModelError> {
  if input_dim == 0 {
    return Err(ModelError::Config("input_dim must be positive".to_string()));
  }
  let loss: Loss = loss.parse()?;
  let metrics = metrics.iter().map(|m| m.parse()).collect::<Result<Vec<Metric>, _>>()?;

  let mut rng = StdRng::seed_from_u64(seed);
  let mut layers = Vec::with_capacity(ARCHITECTURE.len());
  let mut fan_in = input_dim;
  for (name, units, activation) in ARCHITECTURE {
    layers.push(Dense::new(name, fan_in, units, activation, &mut rng));
    fan_in = units;
  }

  let model = Sequential::new(layers, optimizer, loss, metrics)?;
  info!(
    input_dim,
    optimizer = model.optimizer().name(),
    params = model.param_count(),
    "created model"
  );
  Ok(model)
}
