use std::collections::BTreeMap;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use super::LabelColumn;
use crate::error::DataError;

/// Row indices of each side of a split, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
  pub train: Vec<usize>,
  pub test: Vec<usize>,
}

/// Splits rows per class, so every class with at least two rows lands in both
/// train and test. A singleton class stays in train.
pub fn stratified_split(labels: &LabelColumn, test_ratio: f64, seed: u64) -> Result<SplitIndices, DataError> {
  if !(test_ratio > 0.0 && test_ratio < 1.0) {
    return Err(DataError::InvalidRatio(test_ratio));
  }

  let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
  for (row, &label) in labels.values().iter().enumerate() {
    by_class.entry(label).or_default().push(row);
  }

  let mut rng = StdRng::seed_from_u64(seed);
  let mut train = Vec::with_capacity(labels.len());
  let mut test = Vec::new();
  for (_, mut rows) in by_class {
    rows.shuffle(&mut rng);
    let n = rows.len();
    let n_test = if n < 2 {
      0
    } else {
      ((n as f64 * test_ratio).round() as usize).clamp(1, n - 1)
    };
    test.extend_from_slice(&rows[..n_test]);
    train.extend_from_slice(&rows[n_test..]);
  }

  if train.is_empty() || test.is_empty() {
    return Err(DataError::TooFewRows(format!(
      "{} rows give {} train and {} test rows",
      labels.len(),
      train.len(),
      test.len()
    )));
  }

  train.sort_unstable();
  test.sort_unstable();
  Ok(SplitIndices { train, test })
}
