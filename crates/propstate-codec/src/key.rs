//! 256-bit key material, zeroised on drop.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, Result};

pub const KEY_LEN: usize = 32;

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; KEY_LEN]);

impl KeyMaterial {
  pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self { Self(bytes) }

  /// Decode standard base64 holding exactly 32 bytes.
  pub fn from_base64(encoded: &str) -> Result<Self> {
    let mut decoded = B64
      .decode(encoded.trim())
      .map_err(|e| Error::InvalidKey(e.to_string()))?;
    if decoded.len() != KEY_LEN {
      let len = decoded.len();
      decoded.zeroize();
      return Err(Error::InvalidKey(format!(
        "expected {KEY_LEN} bytes, got {len}"
      )));
    }
    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&decoded);
    decoded.zeroize();
    Ok(Self(bytes))
  }

  /// Fresh key material from the OS random source.
  pub fn generate() -> Self {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut bytes);
    Self(bytes)
  }

  pub fn to_base64(&self) -> String { B64.encode(self.0) }

  pub fn as_bytes(&self) -> &[u8; KEY_LEN] { &self.0 }

  /// Short public identifier; safe to store next to ciphertext.
  pub fn key_id(&self) -> String {
    let digest = Sha256::digest(self.0);
    hex::encode(&digest[..8])
  }
}

impl fmt::Debug for KeyMaterial {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("KeyMaterial").field("kid", &self.key_id()).finish()
  }
}
