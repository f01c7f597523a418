//! Field-by-field merge of a request into a loaded record.
//!
//! Merging is pure apart from sealing the address: it never touches the
//! store, so the engine can re-run it against a freshly loaded record after
//! losing a conditional-update race.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use propstate_codec::Keyring;
use propstate_core::{
  field::Field,
  lifecycle::NewTransition,
  outcome::{FieldRejection, Outcome, Rejection, StatusDecision},
  property::{Address, FieldProvenance, PropertyState, SealedAddress},
  request::PropertyUpdateRequest,
  source::Source,
  status::{self, PropertyStatus},
  trust::TrustPolicy,
};
use tracing::debug;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Plan ────────────────────────────────────────────────────────────────────

/// What a merge decided, before anything is persisted.
pub(crate) struct MergePlan {
  pub state:       PropertyState,
  pub transitions: Vec<NewTransition>,
  pub report:      Report,
}

/// The per-field decisions, turned into an [`Outcome`] once the write lands.
pub(crate) struct Report {
  pub applied:   Vec<Field>,
  pub unchanged: Vec<Field>,
  pub rejected:  Vec<FieldRejection>,
  pub status:    StatusDecision,
}

impl Report {
  pub fn is_noop(&self) -> bool { self.applied.is_empty() }

  pub fn into_outcome(
    self,
    property_id: Uuid,
    created: bool,
    version: u64,
    retries: u32,
  ) -> Outcome {
    Outcome {
      property_id,
      created,
      applied: self.applied,
      unchanged: self.unchanged,
      rejected: self.rejected,
      status: self.status,
      version,
      retries,
    }
  }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// Accumulates decisions and provenance while a request is merged.
struct Ledger<'a> {
  policy:      &'a TrustPolicy,
  source:      &'a Source,
  observed_at: DateTime<Utc>,
  provenance:  BTreeMap<Field, FieldProvenance>,
  applied:     Vec<Field>,
  unchanged:   Vec<Field>,
  rejected:    Vec<FieldRejection>,
}

impl<'a> Ledger<'a> {
  /// Whether the incoming source may replace the current holder of `field`.
  /// Records an [`Rejection::Outranked`] when it may not.
  fn contend(&mut self, field: Field) -> bool {
    let Some(holder) = self.provenance.get(&field) else {
      return true;
    };
    if self.policy.prevails(field, self.source, self.observed_at, holder) {
      return true;
    }
    let holder = holder.source.clone();
    self.reject(field, Rejection::Outranked { holder });
    false
  }

  fn claim(&mut self, field: Field) {
    if field.tracks_provenance() {
      self.provenance.insert(field, FieldProvenance {
        source:     self.source.clone(),
        written_at: self.observed_at,
      });
    }
  }

  fn record(&mut self, field: Field) {
    debug!(%field, source = %self.source, "field applied");
    self.applied.push(field);
    self.claim(field);
  }

  fn unchanged(&mut self, field: Field) { self.unchanged.push(field); }

  fn reject(&mut self, field: Field, rejection: Rejection) {
    debug!(%field, source = %self.source, ?rejection, "field rejected");
    self.rejected.push(FieldRejection { field, rejection });
  }

  /// Merge a plain optional value.
  fn assign<T: PartialEq>(&mut self, field: Field, slot: &mut Option<T>, incoming: Option<T>) {
    let Some(incoming) = incoming else { return };
    let wins = match slot {
      Some(current) if *current == incoming => {
        self.unchanged(field);
        return;
      }
      None => true,
      Some(_) => self.contend(field),
    };
    if wins {
      *slot = Some(incoming);
      self.record(field);
    }
  }

  /// Merge the address. Equality is decided on plaintext, so the stored
  /// envelope has to be opened first.
  fn assign_address(
    &mut self,
    keyring: &Keyring,
    property_id: Uuid,
    slot: &mut Option<SealedAddress>,
    incoming: Option<&Address>,
  ) -> Result<()> {
    let Some(incoming) = incoming else { return Ok(()) };
    let wins = match slot.as_ref() {
      None => true,
      Some(sealed) => {
        let current = keyring
          .decrypt(sealed)
          .map_err(|_| Error::Decryption(property_id))?;
        if current == incoming.expose() {
          self.unchanged(Field::Address);
          return Ok(());
        }
        self.contend(Field::Address)
      }
    };
    if wins {
      *slot = Some(keyring.encrypt(incoming.expose())?);
      self.record(Field::Address);
    }
    Ok(())
  }

  /// Union the incoming photos into `media`. Appends are open to every
  /// source; dropping existing photos requires authority.
  fn merge_media(&mut self, media: &mut Vec<String>, incoming: Option<&[String]>, clear: bool) {
    if incoming.is_none() && !clear {
      return;
    }
    let incoming = incoming.unwrap_or_default();
    let base = if clear { Vec::new() } else { media.clone() };
    let mut next = union(base, incoming);

    if next == *media {
      self.unchanged(Field::Media);
      return;
    }

    let removes = media.iter().any(|m| !next.contains(m));
    let cleared = removes && self.contend(Field::Media);
    if removes && !cleared {
      // The clear lost; keep whatever the append alone contributes.
      next = union(media.clone(), incoming);
      if next == *media {
        return;
      }
    }

    *media = next;
    debug!(field = %Field::Media, source = %self.source, cleared, "field applied");
    self.applied.push(Field::Media);
    // A plain append does not take the field away from its holder.
    if cleared || !self.provenance.contains_key(&Field::Media) {
      self.claim(Field::Media);
    }
  }

  /// Administrative fields: only configured sources may write, and nobody
  /// holds them.
  fn assign_administrative(
    &mut self,
    field: Field,
    slot: &mut Option<String>,
    incoming: Option<String>,
  ) {
    let Some(incoming) = incoming else { return };
    if slot.as_ref() == Some(&incoming) {
      self.unchanged(field);
      return;
    }
    if !self.policy.may_write_administrative(self.source) {
      self.reject(field, Rejection::AdministrativeOnly);
      return;
    }
    *slot = Some(incoming);
    self.record(field);
  }

  /// Decide a status claim: same-state, then legality, then the
  /// forward-only rule, then authority.
  fn merge_status(
    &mut self,
    current: &mut PropertyStatus,
    requested: Option<PropertyStatus>,
    now: DateTime<Utc>,
    transitions: &mut Vec<NewTransition>,
  ) -> StatusDecision {
    let Some(requested) = requested else {
      return StatusDecision::NotRequested;
    };
    let from = *current;
    if requested == from {
      self.unchanged(Field::Status);
      return StatusDecision::Unchanged;
    }

    let blocked = if !status::is_legal(from, requested) {
      Some(Rejection::IllegalTransition { from, to: requested })
    } else if self.policy.is_forward_only(self.source) && !from.is_forward_to(requested) {
      Some(Rejection::ForwardOnly { from, to: requested })
    } else {
      None
    };
    if let Some(rejection) = blocked {
      self.reject(Field::Status, rejection);
      return StatusDecision::Rejected { requested };
    }
    if !self.contend(Field::Status) {
      return StatusDecision::Rejected { requested };
    }

    *current = requested;
    self.record(Field::Status);
    transitions.push(NewTransition {
      from:        Some(from),
      to:          requested,
      source:      self.source.clone(),
      recorded_at: now,
    });
    StatusDecision::Accepted { from: Some(from), to: requested }
  }
}

/// Append `extra` to `base`, skipping anything already present.
fn union(mut base: Vec<String>, extra: &[String]) -> Vec<String> {
  for item in extra {
    if !base.contains(item) {
      base.push(item.clone());
    }
  }
  base
}

// ─── Merge ───────────────────────────────────────────────────────────────────

/// Merge `request` into `base`.
///
/// When `created` is set, `base` is a blank record that has never been
/// stored: the initial status is logged and the creating source takes
/// provenance of the status.
pub(crate) fn merge(
  base: PropertyState,
  created: bool,
  request: &PropertyUpdateRequest,
  policy: &TrustPolicy,
  keyring: &Keyring,
  now: DateTime<Utc>,
) -> Result<MergePlan> {
  let PropertyState {
    id,
    mut listing_id,
    mut address,
    mut attributes,
    status: mut current_status,
    mut provenance,
    version,
    created_at,
    mut updated_at,
  } = base;

  let observed_at = request.observed_at.unwrap_or(now);
  let mut transitions = Vec::new();

  if created {
    transitions.push(NewTransition {
      from:        None,
      to:          current_status,
      source:      request.source.clone(),
      recorded_at: now,
    });
    provenance.insert(Field::Status, FieldProvenance {
      source:     request.source.clone(),
      written_at: observed_at,
    });
  }

  let mut ledger = Ledger {
    policy,
    source: &request.source,
    observed_at,
    provenance,
    applied: Vec::new(),
    unchanged: Vec::new(),
    rejected: Vec::new(),
  };

  ledger.assign(Field::ListingId, &mut listing_id, request.listing_id.clone());
  ledger.assign_address(keyring, id, &mut address, request.address.as_ref())?;

  let a = &mut attributes;
  ledger.assign(Field::City, &mut a.city, request.city.clone());
  ledger.assign(Field::State, &mut a.state, request.state.clone());
  ledger.assign(Field::PostalCode, &mut a.postal_code, request.postal_code.clone());
  ledger.assign(Field::Bedrooms, &mut a.bedrooms, request.bedrooms);
  ledger.assign(Field::Bathrooms, &mut a.bathrooms, request.bathrooms);
  ledger.assign(Field::SquareFeet, &mut a.square_feet, request.square_feet);
  ledger.assign(Field::PropertyType, &mut a.property_type, request.property_type.clone());
  ledger.assign(Field::Price, &mut a.price, request.price);
  ledger.assign(Field::Description, &mut a.description, request.description.clone());
  ledger.merge_media(&mut a.media, request.media.as_deref(), request.clear_media);
  ledger.assign(Field::ListingAgent, &mut a.listing_agent, request.listing_agent.clone());
  ledger.assign(Field::ListingOffice, &mut a.listing_office, request.listing_office.clone());
  ledger.assign(Field::SourceUrl, &mut a.source_url, request.source_url.clone());
  ledger.assign(
    Field::Availability,
    &mut a.available_for_showing,
    request.available_for_showing,
  );
  ledger.assign_administrative(
    Field::InternalNotes,
    &mut a.internal_notes,
    request.internal_notes.clone(),
  );

  let decision = ledger.merge_status(&mut current_status, request.status, now, &mut transitions);

  if created || !ledger.applied.is_empty() {
    updated_at = now;
  }

  let Ledger { provenance, applied, unchanged, rejected, .. } = ledger;

  Ok(MergePlan {
    state: PropertyState {
      id,
      listing_id,
      address,
      attributes,
      status: current_status,
      provenance,
      version,
      created_at,
      updated_at,
    },
    transitions,
    report: Report { applied, unchanged, rejected, status: decision },
  })
}
