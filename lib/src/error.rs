use thiserror::Error;

/// Rejected arguments or config file. Aborts the step before any work is done.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("cannot read config file {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed config file {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_yaml::Error,
  },
}

#[derive(Debug, Error)]
pub enum StorageError {
  #[error("object not found: {0}")]
  NotFound(String),

  #[error("IO error at {uri}: {source}")]
  Io {
    uri: String,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid storage URI: {0}")]
  InvalidUri(String),

  #[error("storage backend error: {0}")]
  Backend(String),
}

#[derive(Debug, Error)]
pub enum DataError {
  #[error("malformed CSV: {0}")]
  Csv(#[from] csv::Error),

  #[error("label column `{0}` not present in header")]
  MissingLabelColumn(String),

  #[error("dataset has no feature columns")]
  NoFeatures,

  #[error("row {row}: cannot parse `{value}` in column `{column}` as a number")]
  BadValue {
    row: usize,
    column: String,
    value: String,
  },

  #[error("row {row}: label `{value}` is not binary (expected 0 or 1)")]
  BadLabel { row: usize, value: String },

  #[error("test ratio {0} is outside (0, 1)")]
  InvalidRatio(f64),

  #[error("not enough rows to split: {0}")]
  TooFewRows(String),

  #[error("train labels {train:?} and test labels {test:?} do not share the same values")]
  LabelSpaceMismatch { train: Vec<u8>, test: Vec<u8> },

  #[error("length mismatch: {0}")]
  LengthMismatch(String),
}

#[derive(Debug, Error)]
pub enum ModelError {
  #[error("shape mismatch: {0}")]
  Shape(String),

  #[error("invalid model configuration: {0}")]
  Config(String),

  #[error("unknown identifier: {0}")]
  UnknownIdentifier(String),

  #[error("malformed saved model at {path}: {reason}")]
  Bundle { path: String, reason: String },

  #[error("signature `{0}` not found")]
  MissingSignature(String),
}

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Storage(#[from] StorageError),

  #[error(transparent)]
  Data(#[from] DataError),

  #[error(transparent)]
  Model(#[from] ModelError),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
