use tracing::{info, instrument};

use crate::{
  config::TrainConfig,
  data::{load_data, DatasetSplit},
  error::{ConfigError, ModelError, Result},
  model::{create_model_with_seed, Evaluation, History, ModelInspect, Optimizer},
  persistence::{load_model, save_model, SERVING_SIGNATURE},
  report::{create_visualization, VisualizationArtifacts},
  storage::{FsStorage, Storage, StorageUri},
  utils::serialize_to_storage,
};

/// Scaler fitted on the training rows, stored next to the bundle for serving.
pub const SCALER_FILE: &str = "assets/scaler.json";

/// What one run produced.
#[derive(Debug, Clone)]
pub struct StepOutcome {
  pub history: History,
  pub evaluation: Evaluation,
  pub model_path: StorageUri,
  pub predictions: Vec<u8>,
  pub artifacts: VisualizationArtifacts,
}

pub struct TrainStep {
  config: TrainConfig,
  storage: Box<dyn Storage>,
}

fn positive(name: &str, value: i64) -> std::result::Result<usize, ConfigError> {
  usize::try_from(value)
    .ok()
    .filter(|&v| v > 0)
    .ok_or_else(|| ConfigError::Validation(format!("{} must be positive, got {}", name, value)))
}

impl TrainStep {
  pub fn new(config: TrainConfig, storage: Box<dyn Storage>) -> Self {
    Self { config, storage }
  }

  /// Filesystem storage with `gs://` resolved under the configured mount.
  pub fn from_config(config: TrainConfig) -> Self {
    let storage = FsStorage::new(config.gcs_mount.clone());
    Self::new(config, Box::new(storage))
  }

  pub fn config(&self) -> &TrainConfig {
    &self.config
  }

  /// Runs every stage once, in order. The first failure ends the run.
  #[instrument(level = "info", skip_all)]
  pub fn run(&self) -> Result<StepOutcome> {
    let config = &self.config;
    let storage = self.storage.as_ref();
    info!("starting on {} ({} storage)", config.bucket, storage.backend_type());
    config.validate()?;
    let epochs = positive("epochs", config.epochs)?;
    let batch_size = positive("batch_size", config.batch_size)?;

    let DatasetSplit {
      test_features,
      test_labels,
      train_features,
      train_labels,
      scaler,
    } = load_data(storage, &config.bucket, &config.load_options())?;

    let optimizer = Optimizer::adam_with_lr(config.learning_rate)?;
    let mut model = create_model_with_seed(
      optimizer,
      "binary_crossentropy",
      &["accuracy"],
      train_features.n_cols(),
      config.seed,
    )?;
    info!("model summary:\n{}", model.summary());

    let history = model.fit(
      train_features.values(),
      &train_labels.as_f32(),
      epochs,
      batch_size,
      config.seed,
    )?;
    let evaluation = model.evaluate(test_features.values(), &test_labels.as_f32())?;

    save_model(storage, &config.model_path, &model)?;
    serialize_to_storage(storage, &config.model_path.join(SCALER_FILE), &scaler)?;

    // verify with an independent copy of what was written
    let reloaded = load_model(storage, &config.model_path)?;
    if reloaded.layer_count() != model.layer_count() {
      return Err(
        ModelError::Bundle {
          path: config.model_path.to_string(),
          reason: format!(
            "reloaded {} layers, saved {}",
            reloaded.layer_count(),
            model.layer_count()
          ),
        }
        .into(),
      );
    }
    let predictions: Vec<u8> = reloaded
      .call(SERVING_SIGNATURE, test_features.values())?
      .iter()
      .map(|&p| (p >= 0.5) as u8)
      .collect();

    let artifacts = create_visualization(
      storage,
      &config.bucket,
      test_labels.values(),
      &predictions,
      f64::from(evaluation.accuracy),
      &config.report_paths(),
    )?;

    info!(
      loss = evaluation.loss,
      accuracy = evaluation.accuracy,
      "train step finished, model at {}",
      config.model_path
    );
    Ok(StepOutcome {
      history,
      evaluation,
      model_path: config.model_path.clone(),
      predictions,
      artifacts,
    })
  }
}
