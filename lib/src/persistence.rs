//! Saved-model bundles.
//!
//! A bundle is a directory-like prefix holding two JSON objects:
//!
//! ```text
//! <path>/saved_model.json          architecture, compile config, signatures
//! <path>/variables/variables.json  weights
//! ```
//!
//! Loading rebuilds every layer from the bundle alone, so the result does not
//! share anything with the model that was saved.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::{
  error::{ModelError, Result},
  model::{Activation, Dense, Loss, Metric, ModelInspect, Optimizer, OptimizerConfig, Sequential},
  storage::{Storage, StorageUri},
  utils::{deserialize_from_storage, serialize_to_storage},
};

pub const SAVED_MODEL_FILE: &str = "saved_model.json";
pub const VARIABLES_FILE: &str = "variables/variables.json";
pub const FORMAT_VERSION: u32 = 1;
pub const SERVING_SIGNATURE: &str = "serving_default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LayerSpec {
  name: String,
  input_dim: usize,
  units: usize,
  activation: Activation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompileSpec {
  loss: Loss,
  metrics: Vec<Metric>,
  optimizer: OptimizerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SavedModelSpec {
  format_version: u32,
  input_dim: usize,
  layers: Vec<LayerSpec>,
  compile: CompileSpec,
  signatures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LayerVariables {
  name: String,
  /// [input_dim, units]
  shape: [usize; 2],
  /// Row-major.
  kernel: Vec<f32>,
  bias: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Variables {
  layers: Vec<LayerVariables>,
}

fn bundle_error(path: &StorageUri, reason: impl Into<String>) -> ModelError {
  ModelError::Bundle {
    path: path.to_string(),
    reason: reason.into(),
  }
}

/// Writes the bundle for `model` under `path`, replacing any previous one.
#[instrument(level = "info", skip(storage, model))]
pub fn save_model(storage: &dyn Storage, path: &StorageUri, model: &Sequential) -> Result<()> {
  // JSON has no NaN or infinity, so such a bundle could never be loaded again
  for layer in model.layers() {
    if !layer.kernel().iter().chain(layer.bias().iter()).all(|v| v.is_finite()) {
      return Err(ModelError::Config(format!("layer {} has non-finite weights, refusing to save", layer.name())).into());
    }
  }
  let spec = SavedModelSpec {
    format_version: FORMAT_VERSION,
    input_dim: model.input_dim(),
    layers: model
      .layers()
      .iter()
      .map(|l| LayerSpec {
        name: l.name().to_string(),
        input_dim: l.input_dim(),
        units: l.units(),
        activation: l.activation(),
      })
      .collect(),
    compile: CompileSpec {
      loss: model.loss(),
      metrics: model.metrics(),
      optimizer: *model.optimizer().config(),
    },
    signatures: vec![SERVING_SIGNATURE.to_string()],
  };
  let variables = Variables {
    layers: model
      .layers()
      .iter()
      .map(|l| LayerVariables {
        name: l.name().to_string(),
        shape: [l.input_dim(), l.units()],
        kernel: l.kernel().iter().copied().collect(),
        bias: l.bias().to_vec(),
      })
      .collect(),
  };

  // variables first, so a readable saved_model.json implies complete weights
  serialize_to_storage(storage, &path.join(VARIABLES_FILE), &variables)?;
  serialize_to_storage(storage, &path.join(SAVED_MODEL_FILE), &spec)?;
  info!("saved {} layers to {}", spec.layers.len(), path);
  Ok(())
}

/// Whether `path` holds something that looks like a bundle.
pub fn contains_saved_model(storage: &dyn Storage, path: &StorageUri) -> bool {
  let has = |rel: &str| storage.exists(&path.join(rel)).unwrap_or(false);
  has(SAVED_MODEL_FILE) && has(VARIABLES_FILE)
}

/// A model rebuilt from a bundle.
#[derive(Debug, Clone)]
pub struct LoadedModel {
  model: Sequential,
  signatures: Vec<String>,
}

impl LoadedModel {
  pub fn signatures(&self) -> Vec<&str> {
    self.signatures.iter().map(String::as_str).collect()
  }

  /// Runs the named entry point; every signature maps features to probabilities.
  pub fn call(&self, signature: &str, x: &Array2<f32>) -> std::result::Result<Array1<f32>, ModelError> {
    if !self.signatures.iter().any(|s| s == signature) {
      return Err(ModelError::MissingSignature(signature.to_string()));
    }
    self.model.predict(x)
  }

  pub fn layers(&self) -> &[Dense] {
    self.model.layers()
  }

  /// Hands back a trainable model, optimizer state starting fresh.
  pub fn into_sequential(self) -> Sequential {
    self.model
  }
}

impl ModelInspect for LoadedModel {
  fn layer_count(&self) -> usize {
    self.model.layer_count()
  }

  fn input_dim(&self) -> usize {
    self.model.input_dim()
  }

  fn loss(&self) -> Loss {
    self.model.loss()
  }

  fn optimizer_config(&self) -> BTreeMap<String, Value> {
    self.model.optimizer_config()
  }

  fn metrics(&self) -> Vec<Metric> {
    self.model.metrics()
  }
}

#[instrument(level = "info", skip(storage))]
pub fn load_model(storage: &dyn Storage, path: &StorageUri) -> Result<LoadedModel> {
  let spec: SavedModelSpec = deserialize_from_storage(storage, &path.join(SAVED_MODEL_FILE))?;
  if spec.format_version != FORMAT_VERSION {
    return Err(bundle_error(path, format!("unsupported format version {}", spec.format_version)).into());
  }
  let variables: Variables = deserialize_from_storage(storage, &path.join(VARIABLES_FILE))?;
  if variables.layers.len() != spec.layers.len() {
    return Err(
      bundle_error(
        path,
        format!(
          "{} layers declared but {} have variables",
          spec.layers.len(),
          variables.layers.len()
        ),
      )
      .into(),
    );
  }

  let mut layers = Vec::with_capacity(spec.layers.len());
  for (layer, vars) in spec.layers.iter().zip(variables.layers) {
    if layer.name != vars.name || vars.shape != [layer.input_dim, layer.units] {
      return Err(bundle_error(path, format!("variables do not match layer {}", layer.name)).into());
    }
    let kernel = Array2::from_shape_vec((layer.input_dim, layer.units), vars.kernel)
      .map_err(|e| bundle_error(path, format!("layer {}: {}", layer.name, e)))?;
    layers.push(Dense::from_parts(
      &layer.name,
      kernel,
      Array1::from(vars.bias),
      layer.activation,
    )?);
  }
  if layers.first().map(Dense::input_dim) != Some(spec.input_dim) {
    return Err(bundle_error(path, "input_dim does not match the first layer").into());
  }

  let optimizer = Optimizer::from_config(spec.compile.optimizer)?;
  let model = Sequential::new(layers, optimizer, spec.compile.loss, spec.compile.metrics)?;
  info!("loaded {} layers from {}", model.layer_count(), path);
  Ok(LoadedModel {
    model,
    signatures: spec.signatures,
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use tempfile::TempDir;

  use super::*;
  use crate::{
    error::{Error, StorageError},
    model::create_model,
    storage::{FsStorage, MemoryStorage},
  };

  fn model() -> Sequential {
    create_model(Optimizer::adam(), "binary_crossentropy", &["accuracy"], 6).unwrap()
  }

  #[test]
  fn test_save_then_load_in_memory() {
    let storage = MemoryStorage::new();
    let path = StorageUri::parse("gs://kbc/ccc/model").unwrap();
    let original = model();
    save_model(&storage, &path, &original).unwrap();
    assert!(contains_saved_model(&storage, &path));

    let loaded = load_model(&storage, &path).unwrap();
    assert_eq!(loaded.layer_count(), original.layer_count());
    assert_eq!(loaded.layers(), original.layers());
    assert_eq!(loaded.loss(), "binary_crossentropy");
    assert_eq!(loaded.optimizer_config()["name"], "Adam");
    assert_eq!(loaded.signatures(), vec![SERVING_SIGNATURE]);

    let x = Array2::from_shape_fn((3, 6), |(r, c)| (r + c) as f32 / 10.0);
    let got = loaded.call(SERVING_SIGNATURE, &x).unwrap();
    let want = original.predict(&x).unwrap();
    for (g, w) in got.iter().zip(want.iter()) {
      assert_relative_eq!(*g, *w, epsilon = 1e-6);
    }
    assert!(matches!(loaded.call("predict", &x), Err(ModelError::MissingSignature(_))));
  }

  #[test]
  fn test_save_then_load_on_filesystem() {
    let dir = TempDir::new().unwrap();
    let storage = FsStorage::new(dir.path());
    let path = StorageUri::parse("gs://bucket/models/run-1").unwrap();
    save_model(&storage, &path, &model()).unwrap();
    assert!(dir.path().join("bucket/models/run-1").join(SAVED_MODEL_FILE).is_file());
    assert!(dir.path().join("bucket/models/run-1").join(VARIABLES_FILE).is_file());
    assert_eq!(load_model(&storage, &path).unwrap().layer_count(), 3);
  }

  #[test]
  fn test_refuses_non_finite_weights() {
    let storage = MemoryStorage::new();
    let path = StorageUri::parse("gs://kbc/ccc/model").unwrap();
    let original = model();
    let mut layers = original.layers().to_vec();
    let mut bias = layers[1].bias().clone();
    bias[0] = f32::NAN;
    layers[1] = Dense::from_parts(layers[1].name(), layers[1].kernel().clone(), bias, layers[1].activation()).unwrap();
    let broken = Sequential::new(layers, Optimizer::adam(), Loss::BinaryCrossentropy, vec![Metric::Accuracy]).unwrap();

    assert!(matches!(
      save_model(&storage, &path, &broken),
      Err(Error::Model(ModelError::Config(_)))
    ));
    assert!(!storage.exists(&path.join(VARIABLES_FILE)).unwrap());
    assert!(!storage.exists(&path.join(SAVED_MODEL_FILE)).unwrap());
  }

  #[test]
  fn test_unwritable_path_is_io_error() {
    let dir = TempDir::new().unwrap();
    let storage = FsStorage::new(dir.path());
    let blocker = StorageUri::Local(dir.path().join("blocker"));
    storage.write(&blocker, b"x").unwrap();

    let result = save_model(&storage, &blocker.join("model"), &model());
    assert!(matches!(result, Err(Error::Storage(StorageError::Io { .. }))));
  }

  #[test]
  fn test_missing_bundle() {
    let storage = MemoryStorage::new();
    let path = StorageUri::parse("gs://kbc/empty").unwrap();
    assert!(!contains_saved_model(&storage, &path));
    assert!(matches!(
      load_model(&storage, &path),
      Err(Error::Storage(StorageError::NotFound(_)))
    ));
  }

  #[test]
  fn test_rejects_unknown_version() {
    let storage = MemoryStorage::new();
    let path = StorageUri::parse("gs://kbc/model").unwrap();
    save_model(&storage, &path, &model()).unwrap();

    let spec_uri = path.join(SAVED_MODEL_FILE);
    let mut spec: Value = serde_json::from_slice(&storage.read(&spec_uri).unwrap()).unwrap();
    spec["format_version"] = Value::from(99);
    storage.write(&spec_uri, &serde_json::to_vec(&spec).unwrap()).unwrap();

    assert!(matches!(
      load_model(&storage, &path),
      Err(Error::Model(ModelError::Bundle { .. }))
    ));
  }

  #[test]
  fn test_rejects_truncated_weights() {
    let storage = MemoryStorage::new();
    let path = StorageUri::parse("gs://kbc/model").unwrap();
    save_model(&storage, &path, &model()).unwrap();

    let vars_uri = path.join(VARIABLES_FILE);
    let mut vars: Value = serde_json::from_slice(&storage.read(&vars_uri).unwrap()).unwrap();
    vars["layers"][0]["kernel"] = Value::from(vec![0.0f32; 3]);
    storage.write(&vars_uri, &serde_json::to_vec(&vars).unwrap()).unwrap();

    assert!(matches!(
      load_model(&storage, &path),
      Err(Error::Model(ModelError::Bundle { .. }))
    ));
  }
}
