//! The property state reconciliation engine.
//!
//! [`Engine`] is the only component that holds a store handle. Integrations
//! submit sparse [`PropertyUpdateRequest`]s; the engine merges them into the
//! canonical record field by field under the configured
//! [`TrustPolicy`](propstate_core::trust::TrustPolicy), validates status
//! changes against the lifecycle, seals the address, and commits through the
//! store's conditional update, retrying on lost races.
//!
//! [`PropertyUpdateRequest`]: propstate_core::request::PropertyUpdateRequest

mod engine;
mod merge;

pub mod config;
pub mod error;
pub mod stats;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use stats::{PropertyStats, StatsAggregator};

#[cfg(test)]
mod tests;
