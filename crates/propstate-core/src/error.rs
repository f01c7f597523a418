//! Error types for `propstate-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown property status: {0:?}")]
  UnknownStatus(String),

  #[error("unknown conflict resolution: {0:?}")]
  UnknownResolution(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
