use std::time::Instant;

use ndarray::{Array2, Axis};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{loss::Metric, sequential::Sequential};
use crate::error::ModelError;

/// Per-epoch loss and accuracy recorded by [`Sequential::fit`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
  pub loss: Vec<f32>,
  pub accuracy: Vec<f32>,
}

impl History {
  pub fn epochs(&self) -> usize {
    self.loss.len()
  }

  pub fn final_loss(&self) -> Option<f32> {
    self.loss.last().copied()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
  pub loss: f32,
  pub accuracy: f32,
}

/// Bias-corrected exponential moving average, used to smooth batch losses in logs.
pub struct ExponentialAverage {
  beta: f32,
  moment: f32,
  pub value: f32,
  t: i32,
}

impl ExponentialAverage {
  pub fn new(initial: f32) -> Self {
    ExponentialAverage {
      beta: 0.99,
      moment: 0.,
      value: initial,
      t: 0,
    }
  }

  pub fn update(&mut self, value: f32) {
    self.t += 1;
    self.moment = self.beta * self.moment + (1. - self.beta) * value;
    // bias correction
    self.value = self.moment / (1. - f32::powi(self.beta, self.t));
  }

  pub fn reset(&mut self) {
    self.moment = 0.;
    self.value = 0.0;
    self.t = 0;
  }
}

fn check_rows(x: &Array2<f32>, y: &[f32]) -> Result<(), ModelError> {
  if x.nrows() != y.len() {
    return Err(ModelError::Shape(format!(
      "{} feature rows but {} labels",
      x.nrows(),
      y.len()
    )));
  }
  if x.nrows() == 0 {
    return Err(ModelError::Shape("no rows to train on".to_string()));
  }
  Ok(())
}

fn non_contiguous(layer: &str) -> ModelError {
  ModelError::Shape(format!("parameters of layer {} are not contiguous", layer))
}

impl Sequential {
  /// Trains in place with shuffled mini-batches. The last batch of an epoch may be short.
  #[instrument(level = "info", skip(self, x, y), fields(rows = x.nrows()))]
  pub fn fit(
    &mut self,
    x: &Array2<f32>,
    y: &[f32],
    epochs: usize,
    batch_size: usize,
    seed: u64,
  ) -> Result<History, ModelError> {
    check_rows(x, y)?;
    if epochs == 0 || batch_size == 0 {
      return Err(ModelError::Config(format!(
        "epochs and batch size must be positive, got {} and {}",
        epochs, batch_size
      )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..x.nrows()).collect();
    let mut history = History::default();
    let mut loss_avg = ExponentialAverage::new(1.0);
    let start = Instant::now();
    let mut iter = 0u128;

    for epoch in 0..epochs {
      order.shuffle(&mut rng);
      let (mut loss_sum, mut correct) = (0.0f32, 0.0f32);
      for batch in order.chunks(batch_size) {
        let xb = x.select(Axis(0), batch);
        let yb: Vec<f32> = batch.iter().map(|&i| y[i]).collect();
        let (batch_loss, probabilities) = self.train_batch(&xb, &yb)?;

        loss_avg.update(batch_loss);
        loss_sum += batch_loss * batch.len() as f32;
        correct += Metric::Accuracy.compute(&probabilities, &yb) * batch.len() as f32;
        iter += 1;
        debug!(epoch, loss = batch_loss, smoothed = loss_avg.value, "batch");
      }
      let n = x.nrows() as f32;
      history.loss.push(loss_sum / n);
      history.accuracy.push(correct / n);
      info!(
        epoch = epoch + 1,
        loss = loss_sum / n,
        accuracy = correct / n,
        "epoch finished"
      );
    }

    if iter > 0 {
      tracing::info!("Finished in {iter} iterations");
      tracing::info!(
        "Took {:.2}s, {:.2}µs / iter",
        start.elapsed().as_secs_f32(),
        start.elapsed().as_micros() / iter
      );
    }
    Ok(history)
  }

  /// One forward/backward pass and optimizer step. Returns the batch loss
  /// and the probabilities computed before the update.
  fn train_batch(&mut self, xb: &Array2<f32>, yb: &[f32]) -> Result<(f32, Vec<f32>), ModelError> {
    let trace = self.forward_trace(xb)?;
    let last = self.layers.len() - 1;
    let logits = trace.pre_activations[last].column(0).to_vec();
    let probabilities = trace.activations[last + 1].column(0).to_vec();
    let loss = self.loss.compute(&logits, yb);

    let grad = self.loss.logit_gradient(&logits, yb);
    let mut dz = Array2::from_shape_vec((grad.len(), 1), grad).map_err(|e| ModelError::Shape(e.to_string()))?;

    // Walk the layers backwards; gradients are flattened in row-major order
    // so they line up with the parameter slices.
    let mut grads: Vec<(Vec<f32>, Vec<f32>)> = Vec::with_capacity(self.layers.len());
    for i in (0..=last).rev() {
      let d_kernel = trace.activations[i].t().dot(&dz);
      let d_bias = dz.sum_axis(Axis(0));
      grads.push((d_kernel.iter().copied().collect(), d_bias.to_vec()));
      if i > 0 {
        let da = dz.dot(&self.layers[i].kernel.t());
        dz = da * &self.layers[i - 1].activation.derivative(&trace.pre_activations[i - 1]);
      }
    }
    grads.reverse();

    let mut slots: Vec<(&mut [f32], &[f32])> = Vec::with_capacity(2 * grads.len());
    for (layer, (d_kernel, d_bias)) in self.layers.iter_mut().zip(&grads) {
      let name = layer.name.clone();
      let kernel = layer.kernel.as_slice_mut().ok_or_else(|| non_contiguous(&name))?;
      slots.push((kernel, d_kernel.as_slice()));
      let bias = layer.bias.as_slice_mut().ok_or_else(|| non_contiguous(&name))?;
      slots.push((bias, d_bias.as_slice()));
    }
    self.optimizer.apply(&mut slots)?;

    Ok((loss, probabilities))
  }

  /// Loss and accuracy on held-out data.
  #[instrument(level = "info", skip_all, fields(rows = x.nrows()))]
  pub fn evaluate(&self, x: &Array2<f32>, y: &[f32]) -> Result<Evaluation, ModelError> {
    check_rows(x, y)?;
    let trace = self.forward_trace(x)?;
    let last = self.layers.len() - 1;
    let logits = trace.pre_activations[last].column(0).to_vec();
    let probabilities = trace.activations[last + 1].column(0).to_vec();
    let evaluation = Evaluation {
      loss: self.loss.compute(&logits, y),
      accuracy: Metric::Accuracy.compute(&probabilities, y),
    };
    info!(loss = evaluation.loss, accuracy = evaluation.accuracy, "evaluated");
    Ok(evaluation)
  }
}
