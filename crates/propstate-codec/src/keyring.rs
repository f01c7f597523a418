//! [`Keyring`]: the current key plus keys retained for rotation.

use aes_gcm::{
  Aes256Gcm, Nonce,
  aead::{Aead, KeyInit},
};
use propstate_core::property::SealedAddress;
use rand_core::{OsRng, RngCore};

use crate::{
  Error, Result,
  envelope::{Envelope, NONCE_LEN},
  key::KeyMaterial,
};

struct Slot {
  key_id: String,
  cipher: Aes256Gcm,
}

impl Slot {
  fn new(key: &KeyMaterial) -> Self {
    Self { key_id: key.key_id(), cipher: Aes256Gcm::new(key.as_bytes().into()) }
  }
}

/// Process-wide encryption configuration. Built once at startup and shared
/// read-only behind an `Arc`.
pub struct Keyring {
  current:  Slot,
  previous: Vec<Slot>,
}

impl Keyring {
  pub fn new(
    current: KeyMaterial,
    previous: impl IntoIterator<Item = KeyMaterial>,
  ) -> Self {
    Self {
      current:  Slot::new(&current),
      previous: previous.into_iter().map(|k| Slot::new(&k)).collect(),
    }
  }

  /// Build from base64-encoded key material, as found in configuration.
  pub fn from_base64(current: &str, previous: &[String]) -> Result<Self> {
    let current = KeyMaterial::from_base64(current)?;
    let previous = previous
      .iter()
      .map(|k| KeyMaterial::from_base64(k))
      .collect::<Result<Vec<_>>>()?;
    Ok(Self::new(current, previous))
  }

  /// Generate base64 key material suitable for `encryption.current_key`.
  pub fn generate_key() -> String { KeyMaterial::generate().to_base64() }

  pub fn current_key_id(&self) -> &str { &self.current.key_id }

  /// Seal `plaintext` under the current key with a fresh nonce.
  pub fn encrypt(&self, plaintext: &str) -> Result<SealedAddress> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = self
      .current
      .cipher
      .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
      .map_err(|_| Error::Encryption)?;

    let envelope = Envelope { key_id: self.current.key_id.clone(), nonce, ciphertext };
    Ok(SealedAddress::new(envelope.encode()?))
  }

  /// Open a sealed value. Tries the key named by the envelope first, then the
  /// current key, then prior keys in order.
  pub fn decrypt(&self, sealed: &SealedAddress) -> Result<String> {
    let envelope = Envelope::decode(sealed.as_str())?;
    let nonce = Nonce::from_slice(&envelope.nonce);

    let slots = std::iter::once(&self.current).chain(&self.previous);
    let (named, others): (Vec<&Slot>, Vec<&Slot>) =
      slots.partition(|slot| slot.key_id == envelope.key_id);

    for slot in named.into_iter().chain(others) {
      if let Ok(plaintext) = slot.cipher.decrypt(nonce, envelope.ciphertext.as_slice()) {
        return String::from_utf8(plaintext)
          .map_err(|_| Error::Malformed("plaintext is not UTF-8".into()));
      }
    }
    Err(Error::Decryption)
  }
}
