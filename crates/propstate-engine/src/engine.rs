//! The [`Engine`]: reconcile loop and read path.

use std::{future::Future, sync::Arc};

use chrono::Utc;
use propstate_codec::Keyring;
use propstate_core::{
  field::Field,
  lifecycle::{AddressView, PropertyView, TransitionRecord},
  outcome::Outcome,
  property::{Address, FieldProvenance, PropertyState},
  request::PropertyUpdateRequest,
  status::PropertyStatus,
  store::{PropertyQuery, PropertyStore, WriteOutcome},
  trust::{Resolution, TrustPolicy},
};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  config::EngineConfig,
  merge::{self, MergePlan},
  stats::{PropertyStats, StatsAggregator},
};

/// The single entry point for mutating and reading properties.
///
/// Construct once at startup and share behind an `Arc`; every method takes
/// `&self`.
pub struct Engine<S> {
  store:   Arc<S>,
  keyring: Arc<Keyring>,
  policy:  Arc<TrustPolicy>,
  config:  EngineConfig,
  stats:   StatsAggregator<S>,
}

impl<S: PropertyStore> Engine<S> {
  pub fn new(
    store: Arc<S>,
    keyring: Arc<Keyring>,
    policy: Arc<TrustPolicy>,
    config: EngineConfig,
  ) -> Self {
    let stats = StatsAggregator::new(store.clone(), config.stats_max_age());
    Self { store, keyring, policy, config, stats }
  }

  // ─── Reconcile ─────────────────────────────────────────────────────────────

  /// Merge `request` into its target record, creating it if needed, under
  /// the configured default deadline.
  pub async fn reconcile(
    &self,
    request: PropertyUpdateRequest,
  ) -> Result<(PropertyState, Outcome)> {
    let deadline = Instant::now() + self.config.timeout();
    self.reconcile_until(request, deadline).await
  }

  /// As [`reconcile`](Self::reconcile), giving up with [`Error::Timeout`]
  /// once `deadline` passes. A write already handed to the store is always
  /// allowed to finish.
  pub async fn reconcile_until(
    &self,
    request: PropertyUpdateRequest,
    deadline: Instant,
  ) -> Result<(PropertyState, Outcome)> {
    validate(&request)?;

    let mut retries = 0;
    loop {
      if Instant::now() >= deadline {
        warn!(retries, "reconcile deadline exceeded");
        return Err(Error::Timeout { retries });
      }

      let current = bounded(deadline, retries, self.locate(&request)).await?;
      let created = current.is_none();
      let base = match current {
        Some(state) => state,
        None => {
          if request.listing_id.is_none() || request.address.is_none() {
            return Err(Error::Validation(
              "a new property needs a listing id and an address".into(),
            ));
          }
          PropertyState::blank(Uuid::new_v4(), None, Utc::now())
        }
      };
      let property_id = base.id;
      let expected_version = base.version;

      let MergePlan { state, transitions, report } = merge::merge(
        base,
        created,
        &request,
        &self.policy,
        &self.keyring,
        Utc::now(),
      )?;

      if !created && report.is_noop() {
        debug!(%property_id, source = %request.source, "nothing to write");
        let version = state.version;
        return Ok((state, report.into_outcome(property_id, false, version, retries)));
      }

      let written = if created {
        self.store.create(state, transitions).await
      } else {
        self
          .store
          .conditional_update(property_id, expected_version, state, transitions)
          .await
      }
      .map_err(Error::store)?;

      match written {
        WriteOutcome::Committed(stored) => {
          info!(
            %property_id,
            source = %request.source,
            created,
            version = stored.version,
            applied = report.applied.len(),
            rejected = report.rejected.len(),
            "property reconciled"
          );
          let version = stored.version;
          return Ok((stored, report.into_outcome(property_id, created, version, retries)));
        }
        WriteOutcome::Conflict => {
          if retries >= self.config.max_retries {
            warn!(%property_id, retries, "giving up after repeated conflicts");
            return Err(Error::ConcurrentUpdate { attempts: retries + 1 });
          }
          retries += 1;
          warn!(%property_id, retries, "conditional update lost a race; retrying");
          self.pause(retries, deadline).await;
        }
      }
    }
  }

  /// Find the record a request targets: by listing id first, then by id.
  async fn locate(&self, request: &PropertyUpdateRequest) -> Result<Option<PropertyState>> {
    if let Some(listing_id) = request.listing_id.as_deref() {
      let found = self
        .store
        .get_by_listing_id(listing_id)
        .await
        .map_err(Error::store)?;
      if let Some(state) = found {
        if request.id.is_some_and(|id| id != state.id) {
          return Err(Error::Validation(format!(
            "listing id {listing_id} belongs to a different property"
          )));
        }
        return Ok(Some(state));
      }
    }

    let Some(id) = request.id else { return Ok(None) };
    let state = self
      .store
      .get_by_id(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::NotFound(id))?;

    if let (Some(stored), Some(requested)) = (&state.listing_id, &request.listing_id) {
      if stored != requested {
        return Err(Error::Validation(format!(
          "property {id} is already listed as {stored}"
        )));
      }
    }
    Ok(Some(state))
  }

  /// Back off before retry number `retry`, never sleeping past `deadline`.
  async fn pause(&self, retry: u32, deadline: Instant) {
    let wake = (Instant::now() + self.config.backoff(retry)).min(deadline);
    tokio::time::sleep_until(wake).await;
  }

  // ─── Conflict resolution ───────────────────────────────────────────────────

  /// Hand `field` of record `id` to the source named by `resolution`, so
  /// later merges are judged against that holder.
  pub async fn resolve_conflict(
    &self,
    id: Uuid,
    field: Field,
    resolution: Resolution,
  ) -> Result<PropertyState> {
    if !field.tracks_provenance() {
      return Err(Error::Validation(format!("{field} is not a contended field")));
    }
    let deadline = Instant::now() + self.config.timeout();

    let mut retries = 0;
    loop {
      if Instant::now() >= deadline {
        return Err(Error::Timeout { retries });
      }

      let mut state = bounded(deadline, retries, async {
        self.store.get_by_id(id).await.map_err(Error::store)
      })
      .await?
      .ok_or(Error::NotFound(id))?;

      let expected_version = state.version;
      let now = Utc::now();
      state
        .provenance
        .insert(field, FieldProvenance { source: resolution.holder(), written_at: now });
      state.updated_at = now;

      let written = self
        .store
        .conditional_update(id, expected_version, state, vec![])
        .await
        .map_err(Error::store)?;

      match written {
        WriteOutcome::Committed(stored) => {
          info!(%id, %field, holder = %resolution.holder(), "conflict resolved");
          return Ok(stored);
        }
        WriteOutcome::Conflict if retries >= self.config.max_retries => {
          return Err(Error::ConcurrentUpdate { attempts: retries + 1 });
        }
        WriteOutcome::Conflict => {
          retries += 1;
          self.pause(retries, deadline).await;
        }
      }
    }
  }

  // ─── Reads ─────────────────────────────────────────────────────────────────

  /// Open a record for reading. An address that no configured key can open
  /// reads as [`AddressView::Unavailable`].
  pub fn open(&self, state: PropertyState) -> PropertyView {
    let address = match &state.address {
      None => AddressView::Unknown,
      Some(sealed) => match self.keyring.decrypt(sealed) {
        Ok(plaintext) => AddressView::Available(Address::new(plaintext)),
        Err(e) => {
          warn!(property_id = %state.id, error = %e, "stored address is unavailable");
          AddressView::Unavailable
        }
      },
    };
    PropertyView::from_state(state, address)
  }

  pub async fn get_by_id(&self, id: Uuid) -> Result<Option<PropertyView>> {
    let state = self.store.get_by_id(id).await.map_err(Error::store)?;
    Ok(state.map(|s| self.open(s)))
  }

  pub async fn get_by_listing_id(&self, listing_id: &str) -> Result<Option<PropertyView>> {
    let state = self
      .store
      .get_by_listing_id(listing_id)
      .await
      .map_err(Error::store)?;
    Ok(state.map(|s| self.open(s)))
  }

  /// Records whose status reads as `status`; `active` includes `available`.
  pub async fn list_by_status(&self, status: PropertyStatus) -> Result<Vec<PropertyView>> {
    let states = self.store.list_by_status(status).await.map_err(Error::store)?;
    Ok(states.into_iter().map(|s| self.open(s)).collect())
  }

  /// Records in a publicly listed status, minus those withheld from showings.
  pub async fn list_public(&self) -> Result<Vec<PropertyView>> {
    let query = PropertyQuery {
      statuses:      PropertyStatus::PUBLIC.to_vec(),
      showable_only: true,
      ..PropertyQuery::default()
    };
    self.list(&query).await
  }

  pub async fn list(&self, query: &PropertyQuery) -> Result<Vec<PropertyView>> {
    let states = self.store.list(query).await.map_err(Error::store)?;
    Ok(states.into_iter().map(|s| self.open(s)).collect())
  }

  /// The status transition log of record `id`, oldest first.
  pub async fn transitions(&self, id: Uuid) -> Result<Vec<TransitionRecord>> {
    if self.store.get_by_id(id).await.map_err(Error::store)?.is_none() {
      return Err(Error::NotFound(id));
    }
    self.store.transitions(id).await.map_err(Error::store)
  }

  // ─── Stats ─────────────────────────────────────────────────────────────────

  pub async fn stats(&self) -> Result<PropertyStats> { self.stats.get().await }

  pub async fn refresh_stats(&self) -> Result<PropertyStats> { self.stats.refresh().await }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn validate(request: &PropertyUpdateRequest) -> Result<()> {
  if request.source.as_str().trim().is_empty() {
    return Err(Error::Validation("source is required".into()));
  }
  if request.listing_id.as_deref().is_some_and(|l| l.trim().is_empty()) {
    return Err(Error::Validation("listing id must not be empty".into()));
  }
  if request.listing_id.is_none() && request.id.is_none() {
    return Err(Error::Validation("a listing id or a property id is required".into()));
  }
  Ok(())
}

/// Run a read, failing with [`Error::Timeout`] if `deadline` passes first.
async fn bounded<T>(
  deadline: Instant,
  retries: u32,
  read: impl Future<Output = Result<T>>,
) -> Result<T> {
  tokio::time::timeout_at(deadline, read)
    .await
    .map_err(|_| Error::Timeout { retries })?
}
