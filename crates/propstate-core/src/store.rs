//! The `PropertyStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `propstate-store-sqlite`).
//! Only the reconciliation engine holds a store handle; other subsystems go
//! through the engine.

use std::{collections::BTreeMap, future::Future};

use uuid::Uuid;

use crate::{
  lifecycle::{NewTransition, TransitionRecord},
  property::PropertyState,
  status::PropertyStatus,
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`PropertyStore::list`].
#[derive(Debug, Clone, Default)]
pub struct PropertyQuery {
  /// Restrict to these statuses; empty means all.
  pub statuses:      Vec<PropertyStatus>,
  /// Skip records explicitly marked unavailable for showings. Unset counts
  /// as available.
  pub showable_only: bool,
  pub limit:         Option<usize>,
  pub offset:        Option<usize>,
}

/// Predicates the stats aggregator counts by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountFilter {
  All,
  Statuses(Vec<PropertyStatus>),
  /// Records in a publicly listed status that are not withheld from showings.
  Public,
}

/// Result of a write that may lose a race.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
  /// The write landed; carries the record exactly as stored.
  Committed(PropertyState),
  /// `conditional_update`: the stored version no longer matches.
  /// `create`: the listing identifier is already taken.
  Conflict,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a property store backend.
///
/// `create` and `conditional_update` are the only mutation paths. Each is a
/// single atomic write: the row change and any transition log entries commit
/// together or not at all.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait PropertyStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_by_id(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<PropertyState>, Self::Error>> + Send + '_;

  fn get_by_listing_id<'a>(
    &'a self,
    listing_id: &'a str,
  ) -> impl Future<Output = Result<Option<PropertyState>, Self::Error>> + Send + 'a;

  /// All records whose status reads as `status` (see
  /// [`PropertyStatus::read_set`]).
  fn list_by_status(
    &self,
    status: PropertyStatus,
  ) -> impl Future<Output = Result<Vec<PropertyState>, Self::Error>> + Send + '_;

  /// Paged listing, oldest first.
  fn list<'a>(
    &'a self,
    query: &'a PropertyQuery,
  ) -> impl Future<Output = Result<Vec<PropertyState>, Self::Error>> + Send + 'a;

  /// The transition log for a record, in sequence order.
  fn transitions(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Vec<TransitionRecord>, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist a new record at version 1, appending `transitions`.
  fn create(
    &self,
    state: PropertyState,
    transitions: Vec<NewTransition>,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + '_;

  /// Replace record `id` with `state` only if its stored version is still
  /// `expected_version`. The stored version becomes `expected_version + 1`.
  fn conditional_update(
    &self,
    id: Uuid,
    expected_version: u64,
    state: PropertyState,
    transitions: Vec<NewTransition>,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + '_;

  // ── Aggregates ────────────────────────────────────────────────────────

  fn count_by<'a>(
    &'a self,
    filter: &'a CountFilter,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Record counts grouped by stored status.
  fn status_counts(
    &self,
  ) -> impl Future<Output = Result<BTreeMap<PropertyStatus, u64>, Self::Error>> + Send + '_;

  /// Mean price over priced records in `statuses`; `None` if there are none.
  fn average_price<'a>(
    &'a self,
    statuses: &'a [PropertyStatus],
  ) -> impl Future<Output = Result<Option<f64>, Self::Error>> + Send + 'a;
}
