use std::collections::BTreeSet;

use tracing::{info, instrument};

use super::{parse_csv, stratified_split, FeatureTable, LabelColumn, MinMaxScaler};
use crate::{
  error::{DataError, Result},
  storage::{Storage, StorageUri},
};

pub const DEFAULT_DATASET: &str = "data/dataset.csv";
pub const DEFAULT_LABEL_COLUMN: &str = "label";
pub const DEFAULT_TEST_RATIO: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
  /// Object key of the CSV, relative to the bucket.
  pub dataset: String,
  pub label_column: String,
  pub test_ratio: f64,
  pub seed: u64,
}

impl Default for LoadOptions {
  fn default() -> Self {
    Self {
      dataset: DEFAULT_DATASET.to_string(),
      label_column: DEFAULT_LABEL_COLUMN.to_string(),
      test_ratio: DEFAULT_TEST_RATIO,
      seed: 42,
    }
  }
}

/// Normalized train and test sets. Both sides share one label space.
#[derive(Debug, Clone)]
pub struct DatasetSplit {
  pub test_features: FeatureTable,
  pub test_labels: LabelColumn,
  pub train_features: FeatureTable,
  pub train_labels: LabelColumn,
  pub scaler: MinMaxScaler,
}

impl DatasetSplit {
  /// `(test_features, test_labels, train_features, train_labels)`
  pub fn into_parts(self) -> (FeatureTable, LabelColumn, FeatureTable, LabelColumn) {
    (
      self.test_features,
      self.test_labels,
      self.train_features,
      self.train_labels,
    )
  }

  pub fn n_features(&self) -> usize {
    self.train_features.n_cols()
  }
}

fn label_space(labels: &LabelColumn) -> BTreeSet<u8> {
  labels.values().iter().copied().collect()
}

#[instrument(level = "info", skip(storage))]
pub fn load_data(storage: &dyn Storage, bucket: &StorageUri, options: &LoadOptions) -> Result<DatasetSplit> {
  let uri = bucket.join(&options.dataset);
  let bytes = storage.read(&uri)?;
  let (features, labels) = parse_csv(&bytes, &options.label_column)?;
  info!(
    "read {} rows with {} features from {}",
    features.n_rows(),
    features.n_cols(),
    uri
  );

  let split = stratified_split(&labels, options.test_ratio, options.seed)?;
  let train_features = features.select_rows(&split.train);
  let test_features = features.select_rows(&split.test);
  let train_labels = labels.select_rows(&split.train);
  let test_labels = labels.select_rows(&split.test);

  let scaler = MinMaxScaler::fit(train_features.values())?;
  let train_features = train_features.with_values(scaler.transform(train_features.values())?);
  let test_features = test_features.with_values(scaler.transform(test_features.values())?);

  let (train_space, test_space) = (label_space(&train_labels), label_space(&test_labels));
  if train_space != test_space {
    return Err(
      DataError::LabelSpaceMismatch {
        train: train_space.into_iter().collect(),
        test: test_space.into_iter().collect(),
      }
      .into(),
    );
  }

  info!(
    "split into {} train and {} test rows",
    train_labels.len(),
    test_labels.len()
  );
  Ok(DatasetSplit {
    test_features,
    test_labels,
    train_features,
    train_labels,
    scaler,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    error::{Error, StorageError},
    storage::MemoryStorage,
  };

  fn bucket() -> StorageUri {
    StorageUri::parse("gs://kbc/ccc").unwrap()
  }

  fn store_csv(storage: &MemoryStorage, csv: &str) {
    storage.write(&bucket().join(DEFAULT_DATASET), csv.as_bytes()).unwrap();
  }

  fn balanced_csv(rows: usize) -> String {
    let mut csv = String::from("a,b,label\n");
    for i in 0..rows {
      csv.push_str(&format!("{},{},{}\n", i, (i * 7) % 5, i % 2));
    }
    csv
  }

  #[test]
  fn test_load_data() {
    let storage = MemoryStorage::new();
    store_csv(&storage, &balanced_csv(40));

    let split = load_data(&storage, &bucket(), &LoadOptions::default()).unwrap();
    assert_eq!(split.n_features(), 2);
    assert_eq!(split.train_labels.len() + split.test_labels.len(), 40);
    assert_eq!(split.test_labels.len(), 8);
    assert_eq!(label_space(&split.train_labels), label_space(&split.test_labels));
    for v in split.train_features.values().iter() {
      assert!((0.0..=1.0).contains(v));
    }

    let (test_x, test_y, train_x, train_y) = split.into_parts();
    assert_eq!(test_x.n_rows(), test_y.len());
    assert_eq!(train_x.n_rows(), train_y.len());
  }

  #[test]
  fn test_unreachable_bucket() {
    let storage = MemoryStorage::new();
    let err = load_data(&storage, &bucket(), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Storage(StorageError::NotFound(_))));
  }

  #[test]
  fn test_unexpected_schema() {
    let storage = MemoryStorage::new();
    store_csv(&storage, "a,b,quality\n1,2,1\n");
    let err = load_data(&storage, &bucket(), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Data(DataError::MissingLabelColumn(_))));
  }

  #[test]
  fn test_singleton_class_is_rejected() {
    let storage = MemoryStorage::new();
    store_csv(&storage, "a,label\n1,0\n2,0\n3,0\n4,0\n5,1\n");
    let err = load_data(&storage, &bucket(), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Data(DataError::LabelSpaceMismatch { .. })));
  }

  #[test]
  fn test_custom_options() {
    let storage = MemoryStorage::new();
    let csv = balanced_csv(20).replace("label", "target");
    storage
      .write(&bucket().join("wine/train.csv"), csv.as_bytes())
      .unwrap();
    let options = LoadOptions {
      dataset: "wine/train.csv".to_string(),
      label_column: "target".to_string(),
      test_ratio: 0.5,
      seed: 3,
    };
    let split = load_data(&storage, &bucket(), &options).unwrap();
    assert_eq!(split.test_labels.len(), 10);
    assert_eq!(split.test_labels.name(), "target");
  }
}
