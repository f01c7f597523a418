//! Handlers for `/properties` and `/listings` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/properties` | Optional `?status=`, `?limit=`, `?offset=` |
//! | `GET`  | `/properties/public` | Publicly listed records |
//! | `GET`  | `/properties/{id}` | 404 if not found |
//! | `GET`  | `/properties/{id}/transitions` | Status log, oldest first |
//! | `POST` | `/properties/{id}/resolve` | Body: `{"field":"price","resolution":"manual_override"}` |
//! | `GET`  | `/listings/{listing_id}` | Lookup by external listing id |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use propstate_core::{
  field::Field,
  lifecycle::{PropertyView, TransitionRecord},
  status::PropertyStatus,
  store::{PropertyQuery, PropertyStore},
  trust::Resolution,
};
use propstate_engine::Engine;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status: Option<PropertyStatus>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// `GET /properties[?status=<status>&limit=<n>&offset=<n>]`
///
/// `status=active` also returns records stored as `available`.
pub async fn list<S>(
  State(engine): State<Arc<Engine<S>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<PropertyView>>, ApiError>
where
  S: PropertyStore + 'static,
{
  let query = PropertyQuery {
    statuses:      params.status.map(|s| s.read_set().to_vec()).unwrap_or_default(),
    showable_only: false,
    limit:         params.limit,
    offset:        params.offset,
  };
  Ok(Json(engine.list(&query).await?))
}

/// `GET /properties/public`
pub async fn list_public<S>(
  State(engine): State<Arc<Engine<S>>>,
) -> Result<Json<Vec<PropertyView>>, ApiError>
where
  S: PropertyStore + 'static,
{
  Ok(Json(engine.list_public().await?))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /properties/{id}`
pub async fn get_one<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<PropertyView>, ApiError>
where
  S: PropertyStore + 'static,
{
  let view = engine
    .get_by_id(id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("property {id} not found")))?;
  Ok(Json(view))
}

/// `GET /listings/{listing_id}`
pub async fn get_by_listing<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(listing_id): Path<String>,
) -> Result<Json<PropertyView>, ApiError>
where
  S: PropertyStore + 'static,
{
  let view = engine
    .get_by_listing_id(&listing_id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("listing {listing_id} not found")))?;
  Ok(Json(view))
}

/// `GET /properties/{id}/transitions`
pub async fn transitions<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<TransitionRecord>>, ApiError>
where
  S: PropertyStore + 'static,
{
  Ok(Json(engine.transitions(id).await?))
}

// ─── Resolve ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
  pub field:      Field,
  /// Parsed leniently so the legacy `har_`/`fub_authoritative` names work.
  pub resolution: String,
}

/// `POST /properties/{id}/resolve`
pub async fn resolve<S>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ResolveBody>,
) -> Result<Json<PropertyView>, ApiError>
where
  S: PropertyStore + 'static,
{
  let resolution: Resolution = body
    .resolution
    .parse()
    .map_err(|e: propstate_core::Error| ApiError::BadRequest(e.to_string()))?;
  let state = engine.resolve_conflict(id, body.field, resolution).await?;
  Ok(Json(engine.open(state)))
}
