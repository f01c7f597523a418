//! Field-level encryption for property addresses.
//!
//! Addresses are sealed with AES-256-GCM under a fresh random nonce, so two
//! encryptions of the same plaintext never produce the same envelope. A
//! [`Keyring`] holds the current key plus any prior keys still accepted for
//! decryption during a rotation window.
//!
//! # Envelope
//!
//! ```json
//! {"kid":"3f2a9c01d4e5b6a7","nonce":"<base64>","ct":"<base64>"}
//! ```
//!
//! `kid` is the hex of the first 8 bytes of SHA-256 over the key material.

mod envelope;
mod key;
mod keyring;

pub mod error;

pub use error::{Error, Result};
pub use key::KeyMaterial;
pub use keyring::Keyring;
