use itertools::Itertools;
use ndarray::{Array2, Axis};

use crate::error::DataError;

/// Feature matrix with its column names. Rows line up with a [`LabelColumn`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
  columns: Vec<String>,
  values: Array2<f32>,
}

impl FeatureTable {
  pub fn new(columns: Vec<String>, values: Array2<f32>) -> Result<Self, DataError> {
    if columns.len() != values.ncols() {
      return Err(DataError::LengthMismatch(format!(
        "{} column names for {} feature columns",
        columns.len(),
        values.ncols()
      )));
    }
    Ok(Self { columns, values })
  }

  pub fn columns(&self) -> &[String] {
    &self.columns
  }

  pub fn values(&self) -> &Array2<f32> {
    &self.values
  }

  pub fn n_rows(&self) -> usize {
    self.values.nrows()
  }

  pub fn n_cols(&self) -> usize {
    self.values.ncols()
  }

  pub fn select_rows(&self, rows: &[usize]) -> Self {
    Self {
      columns: self.columns.clone(),
      values: self.values.select(Axis(0), rows),
    }
  }

  pub(crate) fn with_values(&self, values: Array2<f32>) -> Self {
    Self {
      columns: self.columns.clone(),
      values,
    }
  }
}

/// Binary labels (0 or 1) under a fixed column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelColumn {
  name: String,
  values: Vec<u8>,
}

impl LabelColumn {
  pub fn new(name: impl Into<String>, values: Vec<u8>) -> Self {
    Self {
      name: name.into(),
      values,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn values(&self) -> &[u8] {
    &self.values
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Distinct labels in order of first appearance.
  pub fn unique(&self) -> Vec<u8> {
    self.values.iter().copied().unique().collect()
  }

  pub fn select_rows(&self, rows: &[usize]) -> Self {
    Self {
      name: self.name.clone(),
      values: rows.iter().map(|&r| self.values[r]).collect(),
    }
  }

  pub fn as_f32(&self) -> Vec<f32> {
    self.values.iter().map(|&v| v as f32).collect()
  }
}

fn parse_label(row: usize, field: &str) -> Result<u8, DataError> {
  let bad = || DataError::BadLabel {
    row,
    value: field.to_string(),
  };
  let value: f32 = field.parse().map_err(|_| bad())?;
  if value == 0.0 {
    Ok(0)
  } else if value == 1.0 {
    Ok(1)
  } else {
    Err(bad())
  }
}

/// Reads a headed CSV. Every column but `label_column` is a numeric feature.
pub fn parse_csv(data: &[u8], label_column: &str) -> Result<(FeatureTable, LabelColumn), DataError> {
  let mut reader = csv::ReaderBuilder::new()
    .has_headers(true)
    .trim(csv::Trim::All)
    .from_reader(data);
  let headers = reader.headers()?.clone();

  let label_idx = headers
    .iter()
    .position(|h| h == label_column)
    .ok_or_else(|| DataError::MissingLabelColumn(label_column.to_string()))?;
  let columns: Vec<String> = headers
    .iter()
    .enumerate()
    .filter(|(i, _)| *i != label_idx)
    .map(|(_, h)| h.to_string())
    .collect();
  if columns.is_empty() {
    return Err(DataError::NoFeatures);
  }

  let mut flat: Vec<f32> = Vec::new();
  let mut labels: Vec<u8> = Vec::new();
  for (i, record) in reader.records().enumerate() {
    let record = record?;
    // 1-based data rows, header excluded
    let row = i + 1;
    for (col, field) in record.iter().enumerate() {
      if col == label_idx {
        labels.push(parse_label(row, field)?);
      } else {
        let bad = || DataError::BadValue {
          row,
          column: headers.get(col).unwrap_or_default().to_string(),
          value: field.to_string(),
        };
        // f32 parsing accepts nan and inf, neither of which the scaler can handle
        let value = field.parse::<f32>().map_err(|_| bad())?;
        if !value.is_finite() {
          return Err(bad());
        }
        flat.push(value);
      }
    }
  }

  let values = Array2::from_shape_vec((labels.len(), columns.len()), flat)
    .map_err(|e| DataError::LengthMismatch(e.to_string()))?;
  Ok((
    FeatureTable::new(columns, values)?,
    LabelColumn::new(label_column, labels),
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  const WINE: &str = "\
fixed_acidity,volatile_acidity,alcohol,label
7.4,0.70,9.4,0
7.8,0.88,9.8,1
11.2,0.28,9.8,1
";

  #[test]
  fn test_parse_csv() {
    let (features, labels) = parse_csv(WINE.as_bytes(), "label").unwrap();
    assert_eq!(features.columns(), &["fixed_acidity", "volatile_acidity", "alcohol"]);
    assert_eq!(features.n_rows(), 3);
    assert_eq!(features.values()[[2, 0]], 11.2);
    assert_eq!(labels.values(), &[0, 1, 1]);
    assert_eq!(labels.name(), "label");
  }

  #[test]
  fn test_label_column_can_be_anywhere() {
    let csv = "label,a,b\n1,0.5,2\n0,1.5,3\n";
    let (features, labels) = parse_csv(csv.as_bytes(), "label").unwrap();
    assert_eq!(features.columns(), &["a", "b"]);
    assert_eq!(features.values()[[1, 1]], 3.0);
    assert_eq!(labels.values(), &[1, 0]);
  }

  #[test]
  fn test_float_labels_are_accepted() {
    let csv = "a,label\n0.5,1.0\n0.1,0.0\n";
    let (_, labels) = parse_csv(csv.as_bytes(), "label").unwrap();
    assert_eq!(labels.values(), &[1, 0]);
  }

  #[test]
  fn test_missing_label_column() {
    let err = parse_csv(WINE.as_bytes(), "quality").unwrap_err();
    assert!(matches!(err, DataError::MissingLabelColumn(c) if c == "quality"));
  }

  #[test]
  fn test_non_binary_label() {
    let csv = "a,label\n0.5,3\n";
    let err = parse_csv(csv.as_bytes(), "label").unwrap_err();
    assert!(matches!(err, DataError::BadLabel { row: 1, .. }));
  }

  #[test]
  fn test_non_numeric_feature() {
    let csv = "a,b,label\n0.5,red,1\n";
    let err = parse_csv(csv.as_bytes(), "label").unwrap_err();
    assert!(matches!(err, DataError::BadValue { row: 1, ref column, .. } if column == "b"));
  }

  #[test]
  fn test_non_finite_feature() {
    for cell in ["nan", "NaN", "inf", "-inf", "infinity"] {
      let csv = format!("a,b,label\n0.5,1,0\n0.7,{},1\n", cell);
      let err = parse_csv(csv.as_bytes(), "label").unwrap_err();
      assert!(
        matches!(err, DataError::BadValue { row: 2, ref column, ref value } if column == "b" && value == cell),
        "{}",
        cell
      );
    }
  }

  #[test]
  fn test_ragged_rows() {
    let csv = "a,b,label\n0.5,1\n";
    assert!(matches!(parse_csv(csv.as_bytes(), "label"), Err(DataError::Csv(_))));
  }

  #[test]
  fn test_label_only_has_no_features() {
    let csv = "label\n1\n";
    assert!(matches!(parse_csv(csv.as_bytes(), "label"), Err(DataError::NoFeatures)));
  }

  #[test]
  fn test_unique_keeps_first_seen_order() {
    let labels = LabelColumn::new("label", vec![1, 0, 0, 1, 0, 1, 1, 1]);
    assert_eq!(labels.unique(), vec![1, 0]);
  }

  #[test]
  fn test_select_rows() {
    let (features, labels) = parse_csv(WINE.as_bytes(), "label").unwrap();
    let picked = features.select_rows(&[2, 0]);
    assert_eq!(picked.n_rows(), 2);
    assert_eq!(picked.values()[[0, 0]], 11.2);
    assert_eq!(labels.select_rows(&[2, 0]).values(), &[1, 0]);
  }
}
