//! JSON REST API for the property state engine.
//!
//! Exposes an axum [`Router`] over a shared [`Engine`]. Collaborators never
//! see the store; every route goes through the engine. Auth, TLS, and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", propstate_api::api_router(engine.clone()))
//! ```

pub mod error;
pub mod properties;
pub mod reconcile;
pub mod stats;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use propstate_core::store::PropertyStore;
use propstate_engine::Engine;

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Arc<Engine<S>>) -> Router<()>
where
  S: PropertyStore + 'static,
{
  Router::new()
    // Writes
    .route("/reconcile", post(reconcile::handler::<S>))
    // Properties
    .route("/properties", get(properties::list::<S>))
    .route("/properties/public", get(properties::list_public::<S>))
    .route("/properties/{id}", get(properties::get_one::<S>))
    .route("/properties/{id}/transitions", get(properties::transitions::<S>))
    .route("/properties/{id}/resolve", post(properties::resolve::<S>))
    .route("/listings/{listing_id}", get(properties::get_by_listing::<S>))
    // Stats
    .route("/stats", get(stats::handler::<S>))
    .with_state(engine)
}
