//! Handler for `GET /stats`.

use std::sync::Arc;

use axum::{Json, extract::State};
use propstate_core::store::PropertyStore;
use propstate_engine::{Engine, PropertyStats};

use crate::error::ApiError;

/// `GET /stats`: cached aggregate counts; eventually consistent.
pub async fn handler<S: PropertyStore + 'static>(
  State(engine): State<Arc<Engine<S>>>,
) -> Result<Json<PropertyStats>, ApiError> {
  Ok(Json(engine.stats().await?))
}
