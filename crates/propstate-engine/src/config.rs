//! Engine tuning knobs. Deserialises from the `[engine]` config section.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Conflicts absorbed before a reconcile gives up.
  pub max_retries:        u32,
  /// Default deadline for [`Engine::reconcile`](crate::Engine::reconcile).
  pub timeout_ms:         u64,
  pub backoff_initial_ms: u64,
  pub backoff_max_ms:     u64,
  /// How long cached stats are served before recomputation.
  pub stats_max_age_secs: u64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_retries:        3,
      timeout_ms:         5_000,
      backoff_initial_ms: 10,
      backoff_max_ms:     200,
      stats_max_age_secs: 30,
    }
  }
}

impl EngineConfig {
  pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }

  /// Pause before retry number `retry` (1-based): doubles from the initial
  /// backoff, capped at the maximum.
  pub fn backoff(&self, retry: u32) -> Duration {
    let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
    let millis = self.backoff_initial_ms.saturating_mul(factor);
    Duration::from_millis(millis.min(self.backoff_max_ms))
  }

  pub fn stats_max_age(&self) -> Duration { Duration::from_secs(self.stats_max_age_secs) }
}
