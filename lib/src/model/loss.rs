use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::layers::sigmoid;
use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loss {
  #[serde(rename = "binary_crossentropy")]
  BinaryCrossentropy,
}

impl Loss {
  pub fn as_str(&self) -> &'static str {
    match self {
      Loss::BinaryCrossentropy => "binary_crossentropy",
    }
  }

  /// Mean loss over a batch, computed from logits.
  pub fn compute(&self, logits: &[f32], targets: &[f32]) -> f32 {
    match self {
      Loss::BinaryCrossentropy => binary_crossentropy_from_logits(logits, targets),
    }
  }

  /// Gradient of the mean loss with respect to each logit.
  pub fn logit_gradient(&self, logits: &[f32], targets: &[f32]) -> Vec<f32> {
    match self {
      Loss::BinaryCrossentropy => {
        let n = logits.len().max(1) as f32;
        logits
          .iter()
          .zip(targets)
          .map(|(&x, &t)| (sigmoid(x) - t) / n)
          .collect()
      }
    }
  }
}

/// max(x, 0) - x*t + log(1 + exp(-|x|))
fn stable_bce(logit: f32, target: f32) -> f32 {
  logit.max(0.0) - logit * target + (1.0 + (-logit.abs()).exp()).ln()
}

pub fn binary_crossentropy_from_logits(logits: &[f32], targets: &[f32]) -> f32 {
  if logits.is_empty() {
    return 0.0;
  }
  logits
    .iter()
    .zip(targets)
    .map(|(&x, &t)| stable_bce(x, t))
    .sum::<f32>()
    / logits.len() as f32
}

impl fmt::Display for Loss {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Loss {
  type Err = ModelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "binary_crossentropy" | "BinaryCrossentropy" => Ok(Loss::BinaryCrossentropy),
      other => Err(ModelError::UnknownIdentifier(format!("loss `{}`", other))),
    }
  }
}

impl PartialEq<&str> for Loss {
  fn eq(&self, other: &&str) -> bool {
    self.as_str() == *other
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
  Accuracy,
}

impl Metric {
  pub fn as_str(&self) -> &'static str {
    match self {
      Metric::Accuracy => "accuracy",
    }
  }

  /// Computed on probabilities thresholded at 0.5.
  pub fn compute(&self, probabilities: &[f32], targets: &[f32]) -> f32 {
    match self {
      Metric::Accuracy => {
        if probabilities.is_empty() {
          return 0.0;
        }
        let correct = probabilities
          .iter()
          .zip(targets)
          .filter(|&(&p, &t)| ((p >= 0.5) as u8 as f32 - t).abs() < 0.5)
          .count();
        correct as f32 / probabilities.len() as f32
      }
    }
  }
}

impl fmt::Display for Metric {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Metric {
  type Err = ModelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "accuracy" | "acc" => Ok(Metric::Accuracy),
      other => Err(ModelError::UnknownIdentifier(format!("metric `{}`", other))),
    }
  }
}
