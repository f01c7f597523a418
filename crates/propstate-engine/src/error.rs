//! Error type for `propstate-engine`.
//!
//! Field-level rejections are not errors; they are reported in the
//! [`Outcome`](propstate_core::outcome::Outcome). These variants are the
//! failures of the call as a whole.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid request: {0}")]
  Validation(String),

  #[error("property not found: {0}")]
  NotFound(Uuid),

  /// Every attempt lost the conditional-update race.
  #[error("concurrent update: gave up after {attempts} attempts")]
  ConcurrentUpdate { attempts: u32 },

  /// The stored address of this record opens under no configured key.
  #[error("stored address of property {0} could not be decrypted")]
  Decryption(Uuid),

  #[error("codec error: {0}")]
  Codec(#[from] propstate_codec::Error),

  #[error("deadline exceeded after {retries} retries")]
  Timeout { retries: u32 },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
