//! Artifacts read by the pipeline dashboard: a confusion matrix CSV in the
//! bucket plus the run metrics and UI metadata JSON files.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
  error::{DataError, Result},
  storage::{Storage, StorageUri},
  utils::serialize_to_storage,
};

pub const CONFUSION_MATRIX_KEY: &str = "metadata/cm.csv";
pub const DEFAULT_METRICS_PATH: &str = "/mlpipeline-metrics.json";
pub const DEFAULT_UI_METADATA_PATH: &str = "/mlpipeline-ui-metadata.json";
pub const BINARY_LABELS: [u8; 2] = [0, 1];

/// counts[true][predicted], indexed by position in `labels`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
  labels: Vec<u8>,
  counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
  pub fn from_labels(y_true: &[u8], y_pred: &[u8], labels: &[u8]) -> std::result::Result<Self, DataError> {
    if y_true.len() != y_pred.len() {
      return Err(DataError::LengthMismatch(format!(
        "{} true labels but {} predictions",
        y_true.len(),
        y_pred.len()
      )));
    }
    let position = |row: usize, value: u8| {
      labels.iter().position(|&l| l == value).ok_or(DataError::BadLabel {
        row: row + 1,
        value: value.to_string(),
      })
    };
    let mut counts = vec![vec![0; labels.len()]; labels.len()];
    for (row, (&t, &p)) in y_true.iter().zip(y_pred).enumerate() {
      counts[position(row, t)?][position(row, p)?] += 1;
    }
    Ok(Self {
      labels: labels.to_vec(),
      counts,
    })
  }

  pub fn labels(&self) -> &[u8] {
    &self.labels
  }

  /// Count of rows with label `target` predicted as `predicted`. Unknown labels count zero.
  pub fn get(&self, target: u8, predicted: u8) -> usize {
    let index = |v: u8| self.labels.iter().position(|&l| l == v);
    match (index(target), index(predicted)) {
      (Some(t), Some(p)) => self.counts[t][p],
      _ => 0,
    }
  }

  pub fn total(&self) -> usize {
    self.counts.iter().flatten().sum()
  }

  pub fn accuracy(&self) -> f64 {
    let total = self.total();
    if total == 0 {
      return 0.0;
    }
    let correct: usize = (0..self.labels.len()).map(|i| self.counts[i][i]).sum();
    correct as f64 / total as f64
  }

  /// `(target, predicted, count)` for every cell, row by row.
  pub fn cells(&self) -> impl Iterator<Item = (u8, u8, usize)> + '_ {
    self.labels.iter().enumerate().flat_map(move |(i, &t)| {
      self
        .labels
        .iter()
        .enumerate()
        .map(move |(j, &p)| (t, p, self.counts[i][j]))
    })
  }

  /// Headerless `target,predicted,count` rows, the layout the dashboard expects.
  pub fn to_csv(&self) -> std::result::Result<Vec<u8>, DataError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(vec![]);
    for cell in self.cells() {
      writer.serialize(cell)?;
    }
    writer
      .into_inner()
      .map_err(|e| DataError::Csv(e.into_error().into()))
  }
}

impl fmt::Display for ConfusionMatrix {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "true\\pred")?;
    for p in &self.labels {
      write!(f, " {:>5}", p)?;
    }
    for (i, t) in self.labels.iter().enumerate() {
      write!(f, "\n{:>9}", t)?;
      for count in &self.counts[i] {
        write!(f, " {:>5}", count)?;
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetric {
  pub name: String,
  pub number_value: f64,
  pub format: String,
}

/// Contents of `/mlpipeline-metrics.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
  pub metrics: Vec<PipelineMetric>,
}

impl PipelineMetrics {
  pub fn accuracy(accuracy: f64) -> Self {
    Self {
      metrics: vec![PipelineMetric {
        name: "accuracy-score".to_string(),
        number_value: accuracy,
        format: "PERCENTAGE".to_string(),
      }],
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
  pub name: String,
  #[serde(rename = "type")]
  pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiOutput {
  #[serde(rename = "type")]
  pub kind: String,
  pub format: String,
  pub schema: Vec<SchemaField>,
  pub source: String,
  pub labels: Vec<String>,
}

/// Contents of `/mlpipeline-ui-metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMetadata {
  pub outputs: Vec<UiOutput>,
}

impl UiMetadata {
  pub fn confusion_matrix(source: &StorageUri, labels: &[u8]) -> Self {
    let field = |name: &str, kind: &str| SchemaField {
      name: name.to_string(),
      kind: kind.to_string(),
    };
    Self {
      outputs: vec![UiOutput {
        kind: "confusion_matrix".to_string(),
        format: "csv".to_string(),
        schema: vec![
          field("target", "CATEGORY"),
          field("predicted", "CATEGORY"),
          field("count", "NUMBER"),
        ],
        source: source.to_string(),
        labels: labels.iter().map(u8::to_string).collect(),
      }],
    }
  }
}

/// Where the dashboard artifacts go. The confusion matrix key is relative to the bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPaths {
  pub confusion_matrix_key: String,
  pub metrics: StorageUri,
  pub ui_metadata: StorageUri,
}

impl Default for ReportPaths {
  fn default() -> Self {
    Self {
      confusion_matrix_key: CONFUSION_MATRIX_KEY.to_string(),
      metrics: StorageUri::Local(DEFAULT_METRICS_PATH.into()),
      ui_metadata: StorageUri::Local(DEFAULT_UI_METADATA_PATH.into()),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualizationArtifacts {
  pub confusion_matrix: ConfusionMatrix,
  pub confusion_matrix_uri: StorageUri,
  pub metrics_uri: StorageUri,
  pub ui_metadata_uri: StorageUri,
}

/// Writes the confusion matrix CSV under `bucket`, then the metrics and UI metadata files.
/// `accuracy` is reported as given.
#[instrument(level = "info", skip(storage, y_true, y_pred), fields(rows = y_true.len()))]
pub fn create_visualization(
  storage: &dyn Storage,
  bucket: &StorageUri,
  y_true: &[u8],
  y_pred: &[u8],
  accuracy: f64,
  paths: &ReportPaths,
) -> Result<VisualizationArtifacts> {
  let confusion_matrix = ConfusionMatrix::from_labels(y_true, y_pred, &BINARY_LABELS)?;
  info!("confusion matrix:\n{}", confusion_matrix);

  let confusion_matrix_uri = bucket.join(&paths.confusion_matrix_key);
  storage.write(&confusion_matrix_uri, &confusion_matrix.to_csv()?)?;
  serialize_to_storage(storage, &paths.metrics, &PipelineMetrics::accuracy(accuracy))?;
  serialize_to_storage(
    storage,
    &paths.ui_metadata,
    &UiMetadata::confusion_matrix(&confusion_matrix_uri, confusion_matrix.labels()),
  )?;
  info!(
    accuracy,
    matrix_accuracy = confusion_matrix.accuracy(),
    "wrote {}, {} and {}",
    confusion_matrix_uri,
    paths.metrics,
    paths.ui_metadata
  );

  Ok(VisualizationArtifacts {
    confusion_matrix,
    confusion_matrix_uri,
    metrics_uri: paths.metrics.clone(),
    ui_metadata_uri: paths.ui_metadata.clone(),
  })
}
