use std::{
  collections::BTreeMap,
  sync::RwLock,
};

use super::{Storage, StorageResult, StorageUri};
use crate::error::StorageError;

/// In-memory backend for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Every stored URI, sorted.
  pub fn keys(&self) -> StorageResult<Vec<String>> {
    Ok(
      self
        .objects
        .read()
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .keys()
        .cloned()
        .collect(),
    )
  }
}

impl Storage for MemoryStorage {
  fn read(&self, uri: &StorageUri) -> StorageResult<Vec<u8>> {
    self
      .objects
      .read()
      .map_err(|e| StorageError::Backend(e.to_string()))?
      .get(&uri.to_string())
      .cloned()
      .ok_or_else(|| StorageError::NotFound(uri.to_string()))
  }

  fn write(&self, uri: &StorageUri, data: &[u8]) -> StorageResult<()> {
    self
      .objects
      .write()
      .map_err(|e| StorageError::Backend(e.to_string()))?
      .insert(uri.to_string(), data.to_vec());
    Ok(())
  }

  fn exists(&self, uri: &StorageUri) -> StorageResult<bool> {
    Ok(
      self
        .objects
        .read()
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .contains_key(&uri.to_string()),
    )
  }

  fn backend_type(&self) -> &'static str {
    "memory"
  }
}
