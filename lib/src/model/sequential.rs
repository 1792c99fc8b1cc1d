use ndarray::{Array1, Array2};

use super::{
  layers::{Activation, Dense},
  loss::{Loss, Metric},
  optimizer::Optimizer,
};
use crate::error::ModelError;

/// Stack of dense layers compiled with a loss, an optimizer and metrics.
#[derive(Debug, Clone)]
pub struct Sequential {
  pub(crate) layers: Vec<Dense>,
  pub(crate) optimizer: Optimizer,
  pub(crate) loss: Loss,
  pub(crate) metrics: Vec<Metric>,
}

/// Everything `forward_trace` records for backpropagation.
pub(crate) struct ForwardTrace {
  /// activations[i] is the input of layer i; the last entry is the network output.
  pub activations: Vec<Array2<f32>>,
  pub pre_activations: Vec<Array2<f32>>,
}

impl Sequential {
  pub fn new(layers: Vec<Dense>, optimizer: Optimizer, loss: Loss, metrics: Vec<Metric>) -> Result<Self, ModelError> {
    if layers.is_empty() {
      return Err(ModelError::Config("a model needs at least one layer".to_string()));
    }
    for pair in layers.windows(2) {
      if pair[0].units() != pair[1].input_dim() {
        return Err(ModelError::Shape(format!(
          "layer {} outputs {} units but layer {} expects {}",
          pair[0].name(),
          pair[0].units(),
          pair[1].name(),
          pair[1].input_dim()
        )));
      }
    }
    let last = &layers[layers.len() - 1];
    if last.units() != 1 || last.activation() != Activation::Sigmoid {
      return Err(ModelError::Config(
        "binary classifier must end in a single sigmoid unit".to_string(),
      ));
    }
    Ok(Self {
      layers,
      optimizer,
      loss,
      metrics,
    })
  }

  pub fn layers(&self) -> &[Dense] {
    &self.layers
  }

  pub fn optimizer(&self) -> &Optimizer {
    &self.optimizer
  }

  pub fn param_count(&self) -> usize {
    self.layers.iter().map(Dense::param_count).sum()
  }

  pub(crate) fn forward_trace(&self, x: &Array2<f32>) -> Result<ForwardTrace, ModelError> {
    let mut activations = Vec::with_capacity(self.layers.len() + 1);
    let mut pre_activations = Vec::with_capacity(self.layers.len());
    activations.push(x.to_owned());
    for layer in &self.layers {
      let (z, a) = layer.forward(&activations[activations.len() - 1])?;
      pre_activations.push(z);
      activations.push(a);
    }
    Ok(ForwardTrace {
      activations,
      pre_activations,
    })
  }

  /// Output logits, one per row.
  pub fn logits(&self, x: &Array2<f32>) -> Result<Array1<f32>, ModelError> {
    let trace = self.forward_trace(x)?;
    let z = &trace.pre_activations[trace.pre_activations.len() - 1];
    Ok(z.column(0).to_owned())
  }

  /// Probability of the positive class, one per row.
  pub fn predict(&self, x: &Array2<f32>) -> Result<Array1<f32>, ModelError> {
    let mut out = x.to_owned();
    for layer in &self.layers {
      out = layer.forward(&out)?.1;
    }
    Ok(out.column(0).to_owned())
  }

  pub fn predict_classes(&self, x: &Array2<f32>) -> Result<Vec<u8>, ModelError> {
    Ok(self.predict(x)?.iter().map(|&p| (p >= 0.5) as u8).collect())
  }

  /// Human-readable table of layers, like the ones printed after compiling.
  pub fn summary(&self) -> String {
    let mut out = String::from("Layer (activation)        Output  Params\n");
    for layer in &self.layers {
      out.push_str(&format!(
        "{:<25} {:>6}  {:>6}\n",
        format!("{} ({:?})", layer.name(), layer.activation()).to_lowercase(),
        layer.units(),
        layer.param_count()
      ));
    }
    out.push_str(&format!("Total params: {}\n", self.param_count()));
    out
  }
}
