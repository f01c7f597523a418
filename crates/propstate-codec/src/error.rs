//! Error type for `propstate-codec`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
  #[error("invalid key material: {0}")]
  InvalidKey(String),

  #[error("malformed envelope: {0}")]
  Malformed(String),

  /// No configured key authenticates the ciphertext.
  #[error("ciphertext could not be decrypted with any configured key")]
  Decryption,

  #[error("encryption failed")]
  Encryption,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
