use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Per-column min-max scaling fitted on the training rows.
/// Constant columns map to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
  mins: Vec<f32>,
  ranges: Vec<f32>,
}

impl MinMaxScaler {
  pub fn fit(x: &Array2<f32>) -> Result<Self, DataError> {
    if x.nrows() == 0 {
      return Err(DataError::TooFewRows("cannot fit scaler on zero rows".to_string()));
    }
    let mins: Array1<f32> = x.fold_axis(Axis(0), f32::INFINITY, |acc, &v| acc.min(v));
    let maxs: Array1<f32> = x.fold_axis(Axis(0), f32::NEG_INFINITY, |acc, &v| acc.max(v));
    let ranges = &maxs - &mins;
    Ok(Self {
      mins: mins.to_vec(),
      ranges: ranges.to_vec(),
    })
  }

  pub fn transform(&self, x: &Array2<f32>) -> Result<Array2<f32>, DataError> {
    if x.ncols() != self.mins.len() {
      return Err(DataError::LengthMismatch(format!(
        "scaler fitted on {} columns, got {}",
        self.mins.len(),
        x.ncols()
      )));
    }
    let mut out = x.to_owned();
    for mut row in out.rows_mut() {
      for ((v, &min), &range) in row.iter_mut().zip(&self.mins).zip(&self.ranges) {
        *v = if range > 0.0 { (*v - min) / range } else { 0.0 };
      }
    }
    Ok(out)
  }
}
