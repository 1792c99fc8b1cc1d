use std::{io::ErrorKind, path::PathBuf};

use tracing::debug;

use super::{Storage, StorageResult, StorageUri};
use crate::error::StorageError;

/// Filesystem backend. `gs://bucket/key` resolves to `<gcs_mount>/bucket/key`,
/// which is where a GCS FUSE sidecar mounts buckets in the pipeline pod.
#[derive(Debug, Clone)]
pub struct FsStorage {
  gcs_mount: PathBuf,
}

impl FsStorage {
  pub fn new(gcs_mount: impl Into<PathBuf>) -> Self {
    Self {
      gcs_mount: gcs_mount.into(),
    }
  }

  pub fn resolve(&self, uri: &StorageUri) -> PathBuf {
    match uri {
      StorageUri::Local(path) => path.clone(),
      StorageUri::Gcs { bucket, key } => self.gcs_mount.join(bucket).join(key),
    }
  }

  /// Like [`FsStorage::resolve`], but refuses `gs://` keys that would leave the mount.
  fn locate(&self, uri: &StorageUri) -> StorageResult<PathBuf> {
    if uri.has_parent_segment() {
      return Err(StorageError::InvalidUri(uri.to_string()));
    }
    Ok(self.resolve(uri))
  }

  fn io_error(uri: &StorageUri, source: std::io::Error) -> StorageError {
    match source.kind() {
      ErrorKind::NotFound => StorageError::NotFound(uri.to_string()),
      _ => StorageError::Io {
        uri: uri.to_string(),
        source,
      },
    }
  }
}

impl Default for FsStorage {
  fn default() -> Self {
    Self::new("/gcs")
  }
}

impl Storage for FsStorage {
  fn read(&self, uri: &StorageUri) -> StorageResult<Vec<u8>> {
    let path = self.locate(uri)?;
    debug!("reading {} from {}", uri, path.display());
    std::fs::read(&path).map_err(|e| Self::io_error(uri, e))
  }

  fn write(&self, uri: &StorageUri, data: &[u8]) -> StorageResult<()> {
    let path = self.locate(uri)?;
    debug!("writing {} bytes to {}", data.len(), path.display());
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
        uri: uri.to_string(),
        source,
      })?;
    }
    std::fs::write(&path, data).map_err(|source| StorageError::Io {
      uri: uri.to_string(),
      source,
    })
  }

  fn exists(&self, uri: &StorageUri) -> StorageResult<bool> {
    self
      .locate(uri)?
      .try_exists()
      .map_err(|source| StorageError::Io {
        uri: uri.to_string(),
        source,
      })
  }

  fn backend_type(&self) -> &'static str {
    "fs"
  }
}
