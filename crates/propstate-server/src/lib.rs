//! Server wiring for the property state engine: configuration, keyring
//! construction, and the HTTP application.

use std::{fmt, path::PathBuf, sync::Arc};

use axum::Router;
use propstate_codec::Keyring;
use propstate_core::{store::PropertyStore, trust::TrustPolicy};
use propstate_engine::{Engine, EngineConfig};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` layered with
/// `PROPSTATE__*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  pub encryption: EncryptionConfig,
  #[serde(default)]
  pub engine:     EngineConfig,
  #[serde(default)]
  pub trust:      TrustPolicy,
}

fn default_host() -> String { "127.0.0.1".into() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("propstate.db") }

/// Base64 key material. Never printed.
#[derive(Deserialize, Clone)]
pub struct EncryptionConfig {
  pub current_key:   String,
  /// Keys retired by rotation that may still open stored addresses.
  #[serde(default)]
  pub previous_keys: Vec<String>,
}

impl fmt::Debug for EncryptionConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EncryptionConfig")
      .field("current_key", &"<redacted>")
      .field("previous_keys", &self.previous_keys.len())
      .finish()
  }
}

impl ServerConfig {
  pub fn keyring(&self) -> propstate_codec::Result<Keyring> {
    Keyring::from_base64(&self.encryption.current_key, &self.encryption.previous_keys)
  }

  /// Build the engine over `store` from this configuration.
  pub fn engine<S: PropertyStore>(
    &self,
    store: Arc<S>,
  ) -> propstate_codec::Result<Engine<S>> {
    let keyring = self.keyring()?;
    tracing::info!(
      key_id = keyring.current_key_id(),
      previous_keys = self.encryption.previous_keys.len(),
      "keyring loaded"
    );
    Ok(Engine::new(
      store,
      Arc::new(keyring),
      Arc::new(self.trust.clone()),
      self.engine.clone(),
    ))
  }
}

// ─── Application ──────────────────────────────────────────────────────────────

/// The full HTTP application: the JSON API with request tracing.
pub fn app<S>(engine: Arc<Engine<S>>) -> Router
where
  S: PropertyStore + 'static,
{
  propstate_api::api_router(engine).layer(TraceLayer::new_for_http())
}
