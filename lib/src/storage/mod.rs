//! Object storage seen by the train step.
//!
//! Locations are `gs://bucket/key` URIs or local paths. The step only ever
//! reads and writes whole objects, so a backend needs three operations.

mod fs;
mod memory;

use std::{fmt, path::PathBuf};

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use crate::error::StorageError;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageUri {
  Local(PathBuf),
  Gcs { bucket: String, key: String },
}

impl StorageUri {
  pub fn parse(uri: &str) -> StorageResult<Self> {
    if let Some(rest) = uri.strip_prefix("gs://") {
      let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
      let parsed = StorageUri::Gcs {
        bucket: bucket.to_string(),
        key: key.trim_matches('/').to_string(),
      };
      if bucket.is_empty() || bucket == ".." || parsed.has_parent_segment() {
        return Err(StorageError::InvalidUri(uri.to_string()));
      }
      return Ok(parsed);
    }
    let path = uri.strip_prefix("file://").unwrap_or(uri);
    if path.is_empty() {
      return Err(StorageError::InvalidUri(uri.to_string()));
    }
    Ok(StorageUri::Local(PathBuf::from(path)))
  }

  /// Appends a relative key. Leading slashes in `rel` are ignored.
  pub fn join(&self, rel: &str) -> Self {
    let rel = rel.trim_start_matches('/');
    match self {
      StorageUri::Local(path) => StorageUri::Local(path.join(rel)),
      StorageUri::Gcs { bucket, key } => StorageUri::Gcs {
        bucket: bucket.clone(),
        key: if key.is_empty() {
          rel.to_string()
        } else {
          format!("{}/{}", key, rel)
        },
      },
    }
  }

  pub fn is_remote(&self) -> bool {
    matches!(self, StorageUri::Gcs { .. })
  }

  /// Whether a `gs://` key climbs out of its bucket with a `..` segment.
  pub fn has_parent_segment(&self) -> bool {
    match self {
      StorageUri::Local(_) => false,
      StorageUri::Gcs { key, .. } => key.split('/').any(|segment| segment == ".."),
    }
  }
}

impl fmt::Display for StorageUri {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StorageUri::Local(path) => write!(f, "{}", path.display()),
      StorageUri::Gcs { bucket, key } if key.is_empty() => write!(f, "gs://{}", bucket),
      StorageUri::Gcs { bucket, key } => write!(f, "gs://{}/{}", bucket, key),
    }
  }
}

impl std::str::FromStr for StorageUri {
  type Err = StorageError;

  fn from_str(s: &str) -> StorageResult<Self> {
    StorageUri::parse(s)
  }
}

/// Whole-object access to a bucket or filesystem.
pub trait Storage {
  fn read(&self, uri: &StorageUri) -> StorageResult<Vec<u8>>;

  /// Creates or replaces the object, including any missing parents.
  fn write(&self, uri: &StorageUri, data: &[u8]) -> StorageResult<()>;

  fn exists(&self, uri: &StorageUri) -> StorageResult<bool>;

  fn backend_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  #[test]
  fn test_parse_gcs() {
    let uri = StorageUri::parse("gs://kbc/ccc/test").unwrap();
    assert_eq!(
      uri,
      StorageUri::Gcs {
        bucket: "kbc".to_string(),
        key: "ccc/test".to_string()
      }
    );
    assert!(uri.is_remote());
  }

  #[test]
  fn test_parse_bucket_only() {
    let uri = StorageUri::parse("gs://kbc").unwrap();
    assert_eq!(uri.to_string(), "gs://kbc");
    assert_eq!(uri.join("metadata/cm.csv").to_string(), "gs://kbc/metadata/cm.csv");
  }

  #[test]
  fn test_parse_local() {
    assert_eq!(
      StorageUri::parse("/tmp/model").unwrap(),
      StorageUri::Local(PathBuf::from("/tmp/model"))
    );
    assert_eq!(
      StorageUri::parse("file:///tmp/model").unwrap(),
      StorageUri::Local(PathBuf::from("/tmp/model"))
    );
  }

  #[test]
  fn test_parse_invalid() {
    assert!(matches!(StorageUri::parse("gs:///x"), Err(StorageError::InvalidUri(_))));
    assert!(matches!(StorageUri::parse(""), Err(StorageError::InvalidUri(_))));
  }

  #[test]
  fn test_parse_rejects_parent_segments() {
    for uri in ["gs://kbc/../../etc/x", "gs://kbc/ccc/..", "gs://../x"] {
      assert!(matches!(StorageUri::parse(uri), Err(StorageError::InvalidUri(_))), "{}", uri);
    }
    let joined = StorageUri::parse("gs://kbc/ccc").unwrap().join("../../etc/passwd");
    assert!(joined.has_parent_segment());
    assert!(!StorageUri::parse("gs://kbc/a..b/c").unwrap().has_parent_segment());
  }

  #[test]
  fn test_join_strips_leading_slash() {
    let uri = StorageUri::parse("gs://kbc/ccc/").unwrap();
    assert_eq!(uri.join("/metadata/cm.csv").to_string(), "gs://kbc/ccc/metadata/cm.csv");
  }

  proptest! {
    #[test]
    fn prop_gcs_display_round_trips(bucket in "[a-z][a-z0-9-]{0,20}", key in "([a-z0-9_]{1,8}/){0,3}[a-z0-9_.]{1,8}") {
      let text = format!("gs://{}/{}", bucket, key);
      let uri = StorageUri::parse(&text).unwrap();
      prop_assert_eq!(uri.to_string(), text);
    }
  }
}
