//! Handler for `POST /reconcile`.
//!
//! Body: a [`PropertyUpdateRequest`]. Responds `201 Created` when the call
//! created the record, `200 OK` otherwise. Field-level rejections are part
//! of a successful response, not errors.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use propstate_core::{
  lifecycle::PropertyView,
  outcome::Outcome,
  request::PropertyUpdateRequest,
  store::PropertyStore,
};
use propstate_engine::Engine;
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
  pub state:   PropertyView,
  pub outcome: Outcome,
}

/// `POST /reconcile`
pub async fn handler<S: PropertyStore + 'static>(
  State(engine): State<Arc<Engine<S>>>,
  Json(request): Json<PropertyUpdateRequest>,
) -> Result<(StatusCode, Json<ReconcileResponse>), ApiError> {
  let (state, outcome) = engine.reconcile(request).await?;
  let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
  Ok((status, Json(ReconcileResponse { state: engine.open(state), outcome })))
}
