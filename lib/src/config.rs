use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
  data::{LoadOptions, DEFAULT_DATASET, DEFAULT_LABEL_COLUMN, DEFAULT_TEST_RATIO},
  error::{ConfigError, Result},
  model::DEFAULT_LEARNING_RATE,
  report::{ReportPaths, CONFUSION_MATRIX_KEY, DEFAULT_METRICS_PATH, DEFAULT_UI_METADATA_PATH},
  storage::StorageUri,
};

pub const DEFAULT_EPOCHS: i64 = 10;
pub const DEFAULT_BATCH_SIZE: i64 = 32;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_GCS_MOUNT: &str = "/gcs";
/// Model location relative to the bucket when none is given.
pub const DEFAULT_MODEL_DIR: &str = "model";

/// Settings read from a YAML file. Every key is optional and uses the CLI flag name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
  pub epochs: Option<i64>,
  pub batch_size: Option<i64>,
  pub bucket: Option<String>,
  pub model_path: Option<String>,
  pub dataset: Option<String>,
  pub label_column: Option<String>,
  pub test_ratio: Option<f64>,
  pub learning_rate: Option<f32>,
  pub seed: Option<u64>,
  pub metrics_path: Option<String>,
  pub ui_metadata_path: Option<String>,
  pub gcs_mount: Option<PathBuf>,
}

impl FileConfig {
  pub fn from_path(path: &Path) -> std::result::Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.display().to_string(),
      source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
      path: path.display().to_string(),
      source,
    })
  }

  // merge configs where the second overwrites the first
  pub fn merge(self, other: Self) -> Self {
    Self {
      epochs: other.epochs.or(self.epochs),
      batch_size: other.batch_size.or(self.batch_size),
      bucket: other.bucket.or(self.bucket),
      model_path: other.model_path.or(self.model_path),
      dataset: other.dataset.or(self.dataset),
      label_column: other.label_column.or(self.label_column),
      test_ratio: other.test_ratio.or(self.test_ratio),
      learning_rate: other.learning_rate.or(self.learning_rate),
      seed: other.seed.or(self.seed),
      metrics_path: other.metrics_path.or(self.metrics_path),
      ui_metadata_path: other.ui_metadata_path.or(self.ui_metadata_path),
      gcs_mount: other.gcs_mount.or(self.gcs_mount),
    }
  }

  /// Fills in defaults and checks every value.
  pub fn resolve(self) -> Result<TrainConfig> {
    check_values(self.epochs, self.batch_size, self.test_ratio, self.learning_rate)?;
    let bucket = StorageUri::parse(
      &self
        .bucket
        .ok_or_else(|| ConfigError::Validation("a bucket is required".to_string()))?,
    )?;
    let model_path = match self.model_path {
      Some(path) => StorageUri::parse(&path)?,
      None => bucket.join(DEFAULT_MODEL_DIR),
    };
    let metrics_path = self.metrics_path.as_deref().unwrap_or(DEFAULT_METRICS_PATH);
    let ui_metadata_path = self.ui_metadata_path.as_deref().unwrap_or(DEFAULT_UI_METADATA_PATH);
    Ok(TrainConfig {
      epochs: self.epochs.unwrap_or(DEFAULT_EPOCHS),
      batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
      model_path,
      dataset: self.dataset.unwrap_or_else(|| DEFAULT_DATASET.to_string()),
      label_column: self.label_column.unwrap_or_else(|| DEFAULT_LABEL_COLUMN.to_string()),
      test_ratio: self.test_ratio.unwrap_or(DEFAULT_TEST_RATIO),
      learning_rate: self.learning_rate.unwrap_or(DEFAULT_LEARNING_RATE),
      seed: self.seed.unwrap_or(DEFAULT_SEED),
      metrics_path: StorageUri::parse(metrics_path)?,
      ui_metadata_path: StorageUri::parse(ui_metadata_path)?,
      gcs_mount: self.gcs_mount.unwrap_or_else(|| PathBuf::from(DEFAULT_GCS_MOUNT)),
      bucket,
    })
  }
}

/// Checks the values that are present; absent ones fall back to valid defaults.
pub(crate) fn check_values(
  epochs: Option<i64>,
  batch_size: Option<i64>,
  test_ratio: Option<f64>,
  learning_rate: Option<f32>,
) -> std::result::Result<(), ConfigError> {
  let mut problems = Vec::new();
  if let Some(epochs) = epochs.filter(|&e| e <= 0) {
    problems.push(format!("epochs must be positive, got {}", epochs));
  }
  if let Some(batch_size) = batch_size.filter(|&b| b <= 0) {
    problems.push(format!("batch_size must be positive, got {}", batch_size));
  }
  if let Some(ratio) = test_ratio.filter(|r| !(*r > 0.0 && *r < 1.0)) {
    problems.push(format!("test_ratio must be in (0, 1), got {}", ratio));
  }
  if let Some(lr) = learning_rate.filter(|lr| !(*lr > 0.0 && lr.is_finite())) {
    problems.push(format!("learning_rate must be positive, got {}", lr));
  }
  if problems.is_empty() {
    Ok(())
  } else {
    Err(ConfigError::Validation(problems.join("; ")))
  }
}

/// Fully resolved settings of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
  pub epochs: i64,
  pub batch_size: i64,
  pub bucket: StorageUri,
  pub model_path: StorageUri,
  pub dataset: String,
  pub label_column: String,
  pub test_ratio: f64,
  pub learning_rate: f32,
  pub seed: u64,
  pub metrics_path: StorageUri,
  pub ui_metadata_path: StorageUri,
  /// Where `gs://` buckets are mounted.
  pub gcs_mount: PathBuf,
}

impl TrainConfig {
  /// Defaults for everything but the bucket.
  pub fn new(bucket: StorageUri) -> Self {
    Self {
      epochs: DEFAULT_EPOCHS,
      batch_size: DEFAULT_BATCH_SIZE,
      model_path: bucket.join(DEFAULT_MODEL_DIR),
      dataset: DEFAULT_DATASET.to_string(),
      label_column: DEFAULT_LABEL_COLUMN.to_string(),
      test_ratio: DEFAULT_TEST_RATIO,
      learning_rate: DEFAULT_LEARNING_RATE,
      seed: DEFAULT_SEED,
      metrics_path: StorageUri::Local(DEFAULT_METRICS_PATH.into()),
      ui_metadata_path: StorageUri::Local(DEFAULT_UI_METADATA_PATH.into()),
      gcs_mount: PathBuf::from(DEFAULT_GCS_MOUNT),
      bucket,
    }
  }

  pub fn validate(&self) -> std::result::Result<(), ConfigError> {
    check_values(
      Some(self.epochs),
      Some(self.batch_size),
      Some(self.test_ratio),
      Some(self.learning_rate),
    )
  }

  pub fn load_options(&self) -> LoadOptions {
    LoadOptions {
      dataset: self.dataset.clone(),
      label_column: self.label_column.clone(),
      test_ratio: self.test_ratio,
      seed: self.seed,
    }
  }

  pub fn report_paths(&self) -> ReportPaths {
    ReportPaths {
      confusion_matrix_key: CONFUSION_MATRIX_KEY.to_string(),
      metrics: self.metrics_path.clone(),
      ui_metadata: self.ui_metadata_path.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use tempfile::NamedTempFile;

  use super::*;
  use crate::error::Error;

  #[test]
  fn test_merge_second_wins() {
    let file = FileConfig {
      epochs: Some(5),
      batch_size: Some(16),
      ..Default::default()
    };
    let cli = FileConfig {
      epochs: Some(7),
      ..Default::default()
    };
    let merged = file.merge(cli);
    assert_eq!(merged.epochs, Some(7));
    assert_eq!(merged.batch_size, Some(16));
    assert_eq!(merged.bucket, None);
  }

  #[test]
  fn test_from_path_reads_yaml() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "epochs: 3\nbucket: gs://kbc/ccc\ntest_ratio: 0.25").unwrap();
    let config = FileConfig::from_path(file.path()).unwrap();
    assert_eq!(config.epochs, Some(3));
    assert_eq!(config.bucket.as_deref(), Some("gs://kbc/ccc"));
    assert_eq!(config.test_ratio, Some(0.25));
  }

  #[test]
  fn test_from_path_errors() {
    let missing = FileConfig::from_path(Path::new("/definitely/not/here.yaml"));
    assert!(matches!(missing, Err(ConfigError::Read { .. })));

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "epoch: 3").unwrap();
    assert!(matches!(FileConfig::from_path(file.path()), Err(ConfigError::Parse { .. })));
  }

  #[test]
  fn test_resolve_defaults() {
    let config = FileConfig {
      bucket: Some("gs://kbc/ccc".to_string()),
      ..Default::default()
    }
    .resolve()
    .unwrap();
    assert_eq!(config, TrainConfig::new(StorageUri::parse("gs://kbc/ccc").unwrap()));
    assert_eq!(config.model_path.to_string(), "gs://kbc/ccc/model");
    assert_eq!(config.metrics_path.to_string(), "/mlpipeline-metrics.json");
  }

  #[test]
  fn test_resolve_requires_bucket_and_valid_values() {
    assert!(matches!(
      FileConfig::default().resolve(),
      Err(Error::Config(ConfigError::Validation(_)))
    ));
    let bad = FileConfig {
      bucket: Some("gs://kbc/ccc".to_string()),
      epochs: Some(0),
      ..Default::default()
    };
    assert!(matches!(bad.resolve(), Err(Error::Config(ConfigError::Validation(_)))));
    let bad_uri = FileConfig {
      bucket: Some("gs://".to_string()),
      ..Default::default()
    };
    assert!(matches!(bad_uri.resolve(), Err(Error::Storage(_))));
  }

  #[test]
  fn test_check_values_reports_every_problem() {
    let err = check_values(Some(-1), Some(-2), Some(1.5), Some(0.0)).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("epochs"));
    assert!(message.contains("batch_size"));
    assert!(message.contains("test_ratio"));
    assert!(message.contains("learning_rate"));
    assert!(check_values(None, None, None, None).is_ok());
  }
}
