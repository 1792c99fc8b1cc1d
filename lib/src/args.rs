use std::{ffi::OsString, path::PathBuf};

use clap::Parser;

use crate::{
  config::{check_values, FileConfig, TrainConfig},
  error::{ConfigError, Result},
};

/// Train a binary classifier and publish its dashboard artifacts.
#[derive(Parser, Debug, Clone, Default, PartialEq)]
#[command(name = "train-step", version, about)]
pub struct TrainArgs {
  /// Passes over the training set
  #[arg(long, value_name = "INT", allow_negative_numbers = true)]
  pub epochs: Option<i64>,
  /// Rows per optimizer step
  #[arg(long = "batch_size", alias = "batch-size", value_name = "INT", allow_negative_numbers = true)]
  pub batch_size: Option<i64>,
  /// Bucket holding the dataset and receiving the confusion matrix, e.g. gs://kbc/ccc
  #[arg(long, value_name = "URI")]
  pub bucket: Option<String>,
  /// Where the saved model goes (default: <bucket>/model)
  #[arg(long = "model_path", alias = "model-path", value_name = "URI")]
  pub model_path: Option<String>,
  /// CSV object key relative to the bucket
  #[arg(long, value_name = "KEY")]
  pub dataset: Option<String>,
  #[arg(long = "label_column", alias = "label-column", value_name = "NAME")]
  pub label_column: Option<String>,
  /// Share of each class held out for evaluation
  #[arg(long = "test_ratio", alias = "test-ratio", value_name = "FLOAT")]
  pub test_ratio: Option<f64>,
  #[arg(long = "learning_rate", alias = "learning-rate", value_name = "FLOAT")]
  pub learning_rate: Option<f32>,
  /// Seeds the split, weight init and batch shuffling
  #[arg(long, value_name = "INT")]
  pub seed: Option<u64>,
  #[arg(long = "metrics_path", alias = "metrics-path", value_name = "URI")]
  pub metrics_path: Option<String>,
  #[arg(long = "ui_metadata_path", alias = "ui-metadata-path", value_name = "URI")]
  pub ui_metadata_path: Option<String>,
  /// Directory where gs:// buckets are mounted
  #[arg(long = "gcs_mount", alias = "gcs-mount", value_name = "PATH")]
  pub gcs_mount: Option<PathBuf>,
  /// YAML file with any of the settings above; flags take precedence
  #[arg(long, value_name = "PATH")]
  pub config: Option<PathBuf>,
}

impl TrainArgs {
  fn as_file_config(&self) -> FileConfig {
    FileConfig {
      epochs: self.epochs,
      batch_size: self.batch_size,
      bucket: self.bucket.clone(),
      model_path: self.model_path.clone(),
      dataset: self.dataset.clone(),
      label_column: self.label_column.clone(),
      test_ratio: self.test_ratio,
      learning_rate: self.learning_rate,
      seed: self.seed,
      metrics_path: self.metrics_path.clone(),
      ui_metadata_path: self.ui_metadata_path.clone(),
      gcs_mount: self.gcs_mount.clone(),
    }
  }

  /// Flags over `file` over defaults.
  pub fn into_config(self, file: FileConfig) -> Result<TrainConfig> {
    file.merge(self.as_file_config()).resolve()
  }

  /// Reads `--config` when given, then resolves.
  pub fn resolve(self) -> Result<TrainConfig> {
    let file = match &self.config {
      Some(path) => FileConfig::from_path(path)?,
      None => FileConfig::default(),
    };
    self.into_config(file)
  }
}

/// `args` starts with the program name, like `std::env::args_os()`.
pub fn parse_arguments<I, T>(args: I) -> std::result::Result<TrainArgs, clap::Error>
where
  I: IntoIterator<Item = T>,
  T: Into<OsString> + Clone,
{
  TrainArgs::try_parse_from(args)
}

/// Rejects non-positive epochs or batch size, and out-of-range ratio or learning rate.
pub fn validate_arguments(args: &TrainArgs) -> std::result::Result<(), ConfigError> {
  check_values(args.epochs, args.batch_size, args.test_ratio, args.learning_rate)
}
