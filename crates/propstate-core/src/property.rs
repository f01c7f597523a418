//! The canonical property record.
//!
//! A [`PropertyState`] never holds a plaintext street address. The address is
//! kept as a [`SealedAddress`] envelope produced by the codec crate and is
//! only opened on the read path (see [`crate::lifecycle::PropertyView`]).

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{field::Field, source::Source, status::PropertyStatus};

// ─── Address types ───────────────────────────────────────────────────────────

/// A plaintext street address.
///
/// `Debug` and `Display` are redacted so the value cannot end up in a log
/// line by accident. Use [`Address::expose`] at the codec boundary.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
  pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

  pub fn expose(&self) -> &str { &self.0 }
}

impl fmt::Debug for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Address(<redacted>)")
  }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("<redacted>")
  }
}

/// An encrypted address envelope, exactly as stored at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedAddress(String);

impl SealedAddress {
  pub fn new(envelope: impl Into<String>) -> Self { Self(envelope.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

// ─── Provenance ──────────────────────────────────────────────────────────────

/// Who last won the right to set a field, and when they observed the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldProvenance {
  pub source:     Source,
  pub written_at: DateTime<Utc>,
}

// ─── Attributes ──────────────────────────────────────────────────────────────

/// Descriptive attributes. `None` means unknown, never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
  pub city:                  Option<String>,
  pub state:                 Option<String>,
  pub postal_code:           Option<String>,
  pub bedrooms:              Option<u32>,
  pub bathrooms:             Option<f32>,
  pub square_feet:           Option<u32>,
  pub property_type:         Option<String>,
  pub price:                 Option<f64>,
  pub description:           Option<String>,
  /// Photo references, in the order they were first seen.
  #[serde(default)]
  pub media:                 Vec<String>,
  pub listing_agent:         Option<String>,
  pub listing_office:        Option<String>,
  pub source_url:            Option<String>,
  /// Whether the property can currently be booked for a showing.
  pub available_for_showing: Option<bool>,
  pub internal_notes:        Option<String>,
}

// ─── PropertyState ───────────────────────────────────────────────────────────

/// The canonical record other subsystems read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyState {
  pub id:         Uuid,
  /// External (MLS-style) listing identifier; unique when present.
  pub listing_id: Option<String>,
  pub address:    Option<SealedAddress>,
  pub attributes: Attributes,
  pub status:     PropertyStatus,
  pub provenance: BTreeMap<Field, FieldProvenance>,
  /// Starts at 1 on creation; incremented by every committed write.
  pub version:    u64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl PropertyState {
  /// An empty, not-yet-persisted record in the initial status.
  pub fn blank(id: Uuid, listing_id: Option<String>, at: DateTime<Utc>) -> Self {
    Self {
      id,
      listing_id,
      address: None,
      attributes: Attributes::default(),
      status: PropertyStatus::PendingImages,
      provenance: BTreeMap::new(),
      version: 0,
      created_at: at,
      updated_at: at,
    }
  }

  pub fn provenance_of(&self, field: Field) -> Option<&FieldProvenance> {
    self.provenance.get(&field)
  }
}
