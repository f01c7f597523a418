//! Status transition log entries and the opened read model.
//!
//! The live record only carries its current status. Every accepted change is
//! also appended to an immutable transition log, which is what audits read.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  field::Field,
  property::{Address, Attributes, FieldProvenance, PropertyState},
  source::Source,
  status::PropertyStatus,
};

// ─── Transition log ──────────────────────────────────────────────────────────

/// A persisted transition log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
  pub property_id: Uuid,
  /// Per-property sequence number, starting at 1.
  pub seq:         u64,
  /// `None` for the initial status assigned at creation.
  pub from:        Option<PropertyStatus>,
  pub to:          PropertyStatus,
  pub source:      Source,
  pub recorded_at: DateTime<Utc>,
}

/// A transition waiting to be appended. The store assigns `seq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransition {
  pub from:        Option<PropertyStatus>,
  pub to:          PropertyStatus,
  pub source:      Source,
  pub recorded_at: DateTime<Utc>,
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// The address as seen by a reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum AddressView {
  Available(Address),
  /// Stored ciphertext could not be opened with any configured key.
  Unavailable,
  /// No address has been recorded.
  Unknown,
}

impl AddressView {
  pub fn as_plaintext(&self) -> Option<&str> {
    match self {
      Self::Available(address) => Some(address.expose()),
      _ => None,
    }
  }
}

/// A property with its address opened. Derived on read, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyView {
  pub id:         Uuid,
  pub listing_id: Option<String>,
  pub address:    AddressView,
  #[serde(flatten)]
  pub attributes: Attributes,
  pub status:     PropertyStatus,
  pub provenance: BTreeMap<Field, FieldProvenance>,
  pub version:    u64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl PropertyView {
  pub fn from_state(state: PropertyState, address: AddressView) -> Self {
    Self {
      id: state.id,
      listing_id: state.listing_id,
      address,
      attributes: state.attributes,
      status: state.status,
      provenance: state.provenance,
      version: state.version,
      created_at: state.created_at,
      updated_at: state.updated_at,
    }
  }
}
