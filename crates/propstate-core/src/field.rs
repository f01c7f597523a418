//! Field names used for provenance tracking and trust decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Every field of a property record that an update can touch.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Field {
  ListingId,
  Address,
  City,
  State,
  PostalCode,
  Bedrooms,
  Bathrooms,
  SquareFeet,
  PropertyType,
  Price,
  Description,
  Media,
  ListingAgent,
  ListingOffice,
  SourceUrl,
  Availability,
  Status,
  InternalNotes,
}

/// Trust is configured per class, not per field.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FieldClass {
  /// Price, availability and status. Contended by every integration.
  Market,
  /// Listing agent and office.
  Agent,
  /// Photos; merged by union.
  Media,
  /// Everything else describing the property itself.
  Descriptive,
  /// Internal notes; written only by administrators, no provenance.
  Administrative,
}

impl Field {
  pub fn class(self) -> FieldClass {
    match self {
      Self::Price | Self::Availability | Self::Status => FieldClass::Market,
      Self::ListingAgent | Self::ListingOffice => FieldClass::Agent,
      Self::Media => FieldClass::Media,
      Self::InternalNotes => FieldClass::Administrative,
      Self::ListingId
      | Self::Address
      | Self::City
      | Self::State
      | Self::PostalCode
      | Self::Bedrooms
      | Self::Bathrooms
      | Self::SquareFeet
      | Self::PropertyType
      | Self::Description
      | Self::SourceUrl => FieldClass::Descriptive,
    }
  }

  /// Whether the last writer of this field is recorded.
  pub fn tracks_provenance(self) -> bool {
    self.class() != FieldClass::Administrative
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::ListingId => "listing_id",
      Self::Address => "address",
      Self::City => "city",
      Self::State => "state",
      Self::PostalCode => "postal_code",
      Self::Bedrooms => "bedrooms",
      Self::Bathrooms => "bathrooms",
      Self::SquareFeet => "square_feet",
      Self::PropertyType => "property_type",
      Self::Price => "price",
      Self::Description => "description",
      Self::Media => "media",
      Self::ListingAgent => "listing_agent",
      Self::ListingOffice => "listing_office",
      Self::SourceUrl => "source_url",
      Self::Availability => "availability",
      Self::Status => "status",
      Self::InternalNotes => "internal_notes",
    }
  }
}

impl fmt::Display for Field {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
