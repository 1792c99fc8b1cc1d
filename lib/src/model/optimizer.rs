//! First-order optimizers over flat parameter slices.
//!
//! Each parameter tensor owns a slot; moment buffers are created lazily the
//! first time a slot is updated and reset whenever its length changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ModelError;

pub const DEFAULT_LEARNING_RATE: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum OptimizerConfig {
  Adam {
    learning_rate: f32,
    beta_1: f32,
    beta_2: f32,
    epsilon: f32,
  },
  #[serde(rename = "SGD")]
  Sgd { learning_rate: f32, momentum: f32 },
}

impl OptimizerConfig {
  pub fn name(&self) -> &'static str {
    match self {
      OptimizerConfig::Adam { .. } => "Adam",
      OptimizerConfig::Sgd { .. } => "SGD",
    }
  }

  pub fn learning_rate(&self) -> f32 {
    match *self {
      OptimizerConfig::Adam { learning_rate, .. } | OptimizerConfig::Sgd { learning_rate, .. } => learning_rate,
    }
  }

  fn validate(&self) -> Result<(), ModelError> {
    let lr = self.learning_rate();
    if !(lr > 0.0 && lr.is_finite()) {
      return Err(ModelError::Config(format!("learning rate must be positive, got {}", lr)));
    }
    Ok(())
  }
}

#[derive(Debug, Clone)]
pub struct Optimizer {
  config: OptimizerConfig,
  t: u64,
  // Adam: first moments. SGD: velocities.
  m: Vec<Vec<f32>>,
  // Adam only
  v: Vec<Vec<f32>>,
}

impl Optimizer {
  pub fn from_config(config: OptimizerConfig) -> Result<Self, ModelError> {
    config.validate()?;
    Ok(Self {
      config,
      t: 0,
      m: Vec::new(),
      v: Vec::new(),
    })
  }

  /// Adam with the usual defaults (lr 0.001, β1 0.9, β2 0.999, ε 1e-7).
  pub fn adam() -> Self {
    Self {
      config: OptimizerConfig::Adam {
        learning_rate: DEFAULT_LEARNING_RATE,
        beta_1: 0.9,
        beta_2: 0.999,
        epsilon: 1e-7,
      },
      t: 0,
      m: Vec::new(),
      v: Vec::new(),
    }
  }

  pub fn adam_with_lr(learning_rate: f32) -> Result<Self, ModelError> {
    let mut config = Self::adam().config;
    if let OptimizerConfig::Adam { learning_rate: lr, .. } = &mut config {
      *lr = learning_rate;
    }
    Self::from_config(config)
  }

  pub fn sgd(learning_rate: f32, momentum: f32) -> Result<Self, ModelError> {
    Self::from_config(OptimizerConfig::Sgd {
      learning_rate,
      momentum,
    })
  }

  pub fn config(&self) -> &OptimizerConfig {
    &self.config
  }

  pub fn name(&self) -> &'static str {
    self.config.name()
  }

  pub fn iterations(&self) -> u64 {
    self.t
  }

  /// Hyperparameters as a flat map; `"name"` holds the optimizer identity.
  pub fn get_config(&self) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    match serde_json::to_value(self.config) {
      Ok(Value::Object(map)) => out.extend(map),
      _ => {
        out.insert("name".to_string(), json!(self.name()));
      }
    }
    out
  }

  pub fn reset(&mut self) {
    self.t = 0;
    self.m.clear();
    self.v.clear();
  }

  fn ensure_slot(buffers: &mut Vec<Vec<f32>>, slot: usize, len: usize) {
    if buffers.len() <= slot {
      buffers.resize(slot + 1, Vec::new());
    }
    if buffers[slot].len() != len {
      buffers[slot] = vec![0.0; len];
    }
  }

  /// One optimization step over every `(parameter, gradient)` pair.
  pub fn apply(&mut self, slots: &mut [(&mut [f32], &[f32])]) -> Result<(), ModelError> {
    self.t += 1;
    for (slot, (param, grad)) in slots.iter_mut().enumerate() {
      if param.len() != grad.len() {
        return Err(ModelError::Shape(format!(
          "slot {}: {} parameters but {} gradients",
          slot,
          param.len(),
          grad.len()
        )));
      }
      match self.config {
        OptimizerConfig::Adam {
          learning_rate,
          beta_1,
          beta_2,
          epsilon,
        } => {
          Self::ensure_slot(&mut self.m, slot, param.len());
          Self::ensure_slot(&mut self.v, slot, param.len());
          let t = self.t as i32;
          let lr_t = learning_rate * (1.0 - beta_2.powi(t)).sqrt() / (1.0 - beta_1.powi(t));
          let (m, v) = (&mut self.m[slot], &mut self.v[slot]);
          for i in 0..param.len() {
            let g = grad[i];
            m[i] = beta_1 * m[i] + (1.0 - beta_1) * g;
            v[i] = beta_2 * v[i] + (1.0 - beta_2) * g * g;
            param[i] -= lr_t * m[i] / (v[i].sqrt() + epsilon);
          }
        }
        OptimizerConfig::Sgd {
          learning_rate,
          momentum,
        } => {
          Self::ensure_slot(&mut self.m, slot, param.len());
          let velocity = &mut self.m[slot];
          for i in 0..param.len() {
            velocity[i] = momentum * velocity[i] - learning_rate * grad[i];
            param[i] += velocity[i];
          }
        }
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  /// Minimizes f(x) = x² from x = 5.
  fn descend(mut optimizer: Optimizer, steps: usize) -> f32 {
    let mut x = vec![5.0f32];
    for _ in 0..steps {
      let grad = vec![2.0 * x[0]];
      optimizer.apply(&mut [(x.as_mut_slice(), grad.as_slice())]).unwrap();
    }
    x[0]
  }

  #[test]
  fn test_adam_config_names_adam() {
    let config = Optimizer::adam().get_config();
    assert_eq!(config["name"], "Adam");
    assert!(config.values().any(|v| v == "Adam"));
    assert_relative_eq!(config["learning_rate"].as_f64().unwrap(), 0.001, epsilon = 1e-6);
    assert!(config.contains_key("beta_1"));
  }

  #[test]
  fn test_sgd_config_names_sgd() {
    let config = Optimizer::sgd(0.1, 0.9).unwrap().get_config();
    assert_eq!(config["name"], "SGD");
    assert!(config.contains_key("momentum"));
  }

  #[test]
  fn test_adam_first_step_moves_by_lr() {
    // bias-corrected first step is lr * sign(g)
    let mut optimizer = Optimizer::adam_with_lr(0.1).unwrap();
    let mut x = vec![1.0f32, -1.0];
    let grad = vec![4.0f32, -0.5];
    optimizer.apply(&mut [(x.as_mut_slice(), grad.as_slice())]).unwrap();
    assert_relative_eq!(x[0], 0.9, epsilon = 1e-4);
    assert_relative_eq!(x[1], -0.9, epsilon = 1e-4);
    assert_eq!(optimizer.iterations(), 1);
  }

  #[test]
  fn test_adam_converges() {
    let x = descend(Optimizer::adam_with_lr(0.1).unwrap(), 500);
    assert!(x.abs() < 0.05, "x = {}", x);
  }

  #[test]
  fn test_sgd_converges() {
    assert!(descend(Optimizer::sgd(0.1, 0.0).unwrap(), 100).abs() < 1e-3);
    assert!(descend(Optimizer::sgd(0.05, 0.9).unwrap(), 300).abs() < 1e-2);
  }

  #[test]
  fn test_rejects_bad_learning_rate() {
    assert!(Optimizer::adam_with_lr(0.0).is_err());
    assert!(Optimizer::sgd(-1.0, 0.0).is_err());
  }

  #[test]
  fn test_shape_mismatch() {
    let mut optimizer = Optimizer::adam();
    let mut x = vec![1.0f32, 2.0];
    let grad = vec![1.0f32];
    assert!(optimizer.apply(&mut [(x.as_mut_slice(), grad.as_slice())]).is_err());
  }

  #[test]
  fn test_config_round_trips_through_json() {
    let config = *Optimizer::sgd(0.01, 0.5).unwrap().config();
    let text = serde_json::to_string(&config).unwrap();
    assert!(text.contains("\"name\":\"SGD\""));
    assert_eq!(serde_json::from_str::<OptimizerConfig>(&text).unwrap(), config);
  }
}
