//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings.
//! Provenance and media are compact JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use propstate_core::{
  field::Field,
  lifecycle::TransitionRecord,
  property::{Attributes, FieldProvenance, PropertyState, SealedAddress},
  source::Source,
  status::PropertyStatus,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Status ───────────────────────────────────────────────────────────────────

pub fn encode_status(status: PropertyStatus) -> String { status.as_str().to_owned() }

pub fn decode_status(s: &str) -> Result<PropertyStatus> { Ok(s.parse()?) }

pub fn encode_statuses(statuses: &[PropertyStatus]) -> Vec<String> {
  statuses.iter().copied().map(encode_status).collect()
}

/// `?, ?, ?` for an `IN (...)` clause, numbered from `start`.
pub fn placeholders(start: usize, count: usize) -> String {
  (start..start + count)
    .map(|n| format!("?{n}"))
    .collect::<Vec<_>>()
    .join(", ")
}

// ─── Provenance / media ──────────────────────────────────────────────────────

pub fn encode_provenance(p: &BTreeMap<Field, FieldProvenance>) -> Result<String> {
  Ok(serde_json::to_string(p)?)
}

pub fn decode_provenance(s: &str) -> Result<BTreeMap<Field, FieldProvenance>> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_media(media: &[String]) -> Result<String> { Ok(serde_json::to_string(media)?) }

pub fn decode_media(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

fn decode_u32(column: &'static str, value: Option<i64>) -> Result<Option<u32>> {
  value
    .map(|v| {
      u32::try_from(v).map_err(|_| Error::Corrupt { column, value: v.to_string() })
    })
    .transpose()
}

fn decode_u64(column: &'static str, value: i64) -> Result<u64> {
  u64::try_from(value).map_err(|_| Error::Corrupt { column, value: value.to_string() })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list shared by every `SELECT` on `properties`, in [`RawProperty`]
/// field order.
pub const PROPERTY_COLUMNS: &str = "
  property_id, listing_id, address_sealed, city, state, postal_code,
  bedrooms, bathrooms, square_feet, property_type, price, description,
  media, listing_agent, listing_office, source_url, available_for_showing,
  internal_notes, status, provenance, version, created_at, updated_at";

/// Raw values read directly from a `properties` row, and the values written
/// back by inserts and updates.
pub struct RawProperty {
  pub property_id:           String,
  pub listing_id:            Option<String>,
  pub address_sealed:        Option<String>,
  pub city:                  Option<String>,
  pub state:                 Option<String>,
  pub postal_code:           Option<String>,
  pub bedrooms:              Option<i64>,
  pub bathrooms:             Option<f64>,
  pub square_feet:           Option<i64>,
  pub property_type:         Option<String>,
  pub price:                 Option<f64>,
  pub description:           Option<String>,
  pub media:                 String,
  pub listing_agent:         Option<String>,
  pub listing_office:        Option<String>,
  pub source_url:            Option<String>,
  pub available_for_showing: Option<bool>,
  pub internal_notes:        Option<String>,
  pub status:                String,
  pub provenance:            String,
  pub version:               i64,
  pub created_at:            String,
  pub updated_at:            String,
}

impl RawProperty {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      property_id:           row.get(0)?,
      listing_id:            row.get(1)?,
      address_sealed:        row.get(2)?,
      city:                  row.get(3)?,
      state:                 row.get(4)?,
      postal_code:           row.get(5)?,
      bedrooms:              row.get(6)?,
      bathrooms:             row.get(7)?,
      square_feet:           row.get(8)?,
      property_type:         row.get(9)?,
      price:                 row.get(10)?,
      description:           row.get(11)?,
      media:                 row.get(12)?,
      listing_agent:         row.get(13)?,
      listing_office:        row.get(14)?,
      source_url:            row.get(15)?,
      available_for_showing: row.get(16)?,
      internal_notes:        row.get(17)?,
      status:                row.get(18)?,
      provenance:            row.get(19)?,
      version:               row.get(20)?,
      created_at:            row.get(21)?,
      updated_at:            row.get(22)?,
    })
  }

  /// Flatten a domain record for writing. `version` is supplied by the caller
  /// because the store, not the engine, decides the stored version.
  pub fn from_state(state: &PropertyState, version: u64) -> Result<Self> {
    let a = &state.attributes;
    Ok(Self {
      property_id:           encode_uuid(state.id),
      listing_id:            state.listing_id.clone(),
      address_sealed:        state.address.as_ref().map(|s| s.as_str().to_owned()),
      city:                  a.city.clone(),
      state:                 a.state.clone(),
      postal_code:           a.postal_code.clone(),
      bedrooms:              a.bedrooms.map(i64::from),
      bathrooms:             a.bathrooms.map(f64::from),
      square_feet:           a.square_feet.map(i64::from),
      property_type:         a.property_type.clone(),
      price:                 a.price,
      description:           a.description.clone(),
      media:                 encode_media(&a.media)?,
      listing_agent:         a.listing_agent.clone(),
      listing_office:        a.listing_office.clone(),
      source_url:            a.source_url.clone(),
      available_for_showing: a.available_for_showing,
      internal_notes:        a.internal_notes.clone(),
      status:                encode_status(state.status),
      provenance:            encode_provenance(&state.provenance)?,
      version:               i64::try_from(version).map_err(|_| Error::Corrupt {
        column: "version",
        value:  version.to_string(),
      })?,
      created_at:            encode_dt(state.created_at),
      updated_at:            encode_dt(state.updated_at),
    })
  }

  pub fn into_state(self) -> Result<PropertyState> {
    let attributes = Attributes {
      city:                  self.city,
      state:                 self.state,
      postal_code:           self.postal_code,
      bedrooms:              decode_u32("bedrooms", self.bedrooms)?,
      bathrooms:             self.bathrooms.map(|b| b as f32),
      square_feet:           decode_u32("square_feet", self.square_feet)?,
      property_type:         self.property_type,
      price:                 self.price,
      description:           self.description,
      media:                 decode_media(&self.media)?,
      listing_agent:         self.listing_agent,
      listing_office:        self.listing_office,
      source_url:            self.source_url,
      available_for_showing: self.available_for_showing,
      internal_notes:        self.internal_notes,
    };

    Ok(PropertyState {
      id: decode_uuid(&self.property_id)?,
      listing_id: self.listing_id,
      address: self.address_sealed.map(SealedAddress::new),
      attributes,
      status: decode_status(&self.status)?,
      provenance: decode_provenance(&self.provenance)?,
      version: decode_u64("version", self.version)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read from a `status_transitions` row.
pub struct RawTransition {
  pub property_id: String,
  pub seq:         i64,
  pub from_status: Option<String>,
  pub to_status:   String,
  pub source:      String,
  pub recorded_at: String,
}

impl RawTransition {
  pub fn into_record(self) -> Result<TransitionRecord> {
    Ok(TransitionRecord {
      property_id: decode_uuid(&self.property_id)?,
      seq:         decode_u64("seq", self.seq)?,
      from:        self.from_status.as_deref().map(decode_status).transpose()?,
      to:          decode_status(&self.to_status)?,
      source:      Source::parse(&self.source),
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
