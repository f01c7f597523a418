//! The at-rest JSON envelope around a sealed value.

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const NONCE_LEN: usize = 12;

#[derive(Debug, Serialize, Deserialize)]
struct RawEnvelope {
  kid:   String,
  nonce: String,
  ct:    String,
}

/// A decoded envelope.
pub struct Envelope {
  pub key_id:     String,
  pub nonce:      [u8; NONCE_LEN],
  pub ciphertext: Vec<u8>,
}

impl Envelope {
  pub fn encode(&self) -> Result<String> {
    let raw = RawEnvelope {
      kid:   self.key_id.clone(),
      nonce: B64.encode(self.nonce),
      ct:    B64.encode(&self.ciphertext),
    };
    serde_json::to_string(&raw).map_err(|e| Error::Malformed(e.to_string()))
  }

  pub fn decode(encoded: &str) -> Result<Self> {
    let raw: RawEnvelope =
      serde_json::from_str(encoded).map_err(|e| Error::Malformed(e.to_string()))?;

    let nonce_bytes = B64
      .decode(&raw.nonce)
      .map_err(|e| Error::Malformed(format!("nonce: {e}")))?;
    let nonce: [u8; NONCE_LEN] = nonce_bytes
      .try_into()
      .map_err(|_| Error::Malformed(format!("nonce must be {NONCE_LEN} bytes")))?;

    let ciphertext = B64
      .decode(&raw.ct)
      .map_err(|e| Error::Malformed(format!("ciphertext: {e}")))?;

    Ok(Self { key_id: raw.kid, nonce, ciphertext })
  }
}
