use serde::{de::DeserializeOwned, Serialize};

#[cfg(not(debug_assertions))]
use human_panic::setup_panic;
use tracing::subscriber::{DefaultGuard, SetGlobalDefaultError};

#[cfg(debug_assertions)]
extern crate better_panic;

use tracing_subscriber::EnvFilter;

use crate::{
  error,
  storage::{Storage, StorageUri},
};

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn install_logger() -> Result<(), SetGlobalDefaultError> {
  let subscriber = tracing_subscriber::fmt()
    .compact()
    .with_env_filter(env_filter())
    .finish();
  tracing::subscriber::set_global_default(subscriber)
}

pub fn init_logging() -> Result<(), SetGlobalDefaultError> {
  // Human Panic. Only enabled when *not* debugging.
  #[cfg(not(debug_assertions))]
  {
    setup_panic!();
  }

  // Better Panic. Only enabled *when* debugging.
  #[cfg(debug_assertions)]
  {
    better_panic::Settings::debug()
      .most_recent_first(false)
      .lineno_suffix(true)
      .verbosity(better_panic::Verbosity::Full)
      .install();
  }

  install_logger()?;

  Ok(())
}

/// Logger for tests. Scoped to the returned guard, so tests can each install one.
pub fn init_logging_tests() -> DefaultGuard {
  let subscriber = tracing_subscriber::fmt()
    .compact()
    .with_test_writer()
    .with_env_filter(env_filter())
    .finish();
  tracing::subscriber::set_default(subscriber)
}

pub fn serialize_to_storage<T: Serialize>(
  storage: &dyn Storage,
  uri: &StorageUri,
  obj: &T,
) -> error::Result<()> {
  let buff = serde_json::to_vec_pretty(obj)?;
  storage.write(uri, &buff)?;
  Ok(())
}

pub fn deserialize_from_storage<T: DeserializeOwned>(
  storage: &dyn Storage,
  uri: &StorageUri,
) -> error::Result<T> {
  let buff = storage.read(uri)?;
  Ok(serde_json::from_slice(&buff)?)
}
