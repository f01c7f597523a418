//! The inbound change submitted by an integration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{property::Address, source::Source, status::PropertyStatus};

/// A sparse update. Only fields that are present are considered; an absent
/// field is left untouched and is never read as "clear this field".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyUpdateRequest {
  pub source:                Source,
  /// Internal identity of an existing record.
  pub id:                    Option<Uuid>,
  /// External listing identifier; used first when locating a record.
  pub listing_id:            Option<String>,
  pub address:               Option<Address>,
  pub city:                  Option<String>,
  pub state:                 Option<String>,
  pub postal_code:           Option<String>,
  pub bedrooms:              Option<u32>,
  pub bathrooms:             Option<f32>,
  pub square_feet:           Option<u32>,
  pub property_type:         Option<String>,
  pub price:                 Option<f64>,
  pub description:           Option<String>,
  /// Photo references to append to the existing set.
  pub media:                 Option<Vec<String>>,
  /// Clear existing photos before appending `media`.
  #[serde(default)]
  pub clear_media:           bool,
  pub listing_agent:         Option<String>,
  pub listing_office:        Option<String>,
  pub source_url:            Option<String>,
  pub available_for_showing: Option<bool>,
  pub internal_notes:        Option<String>,
  /// The source's claim about the current status.
  pub status:                Option<PropertyStatus>,
  /// When the source observed this data. Defaults to the time of the call.
  pub observed_at:           Option<DateTime<Utc>>,
}

impl PropertyUpdateRequest {
  /// An empty request from `source`; set the fields you need afterwards.
  pub fn new(source: impl Into<Source>) -> Self {
    Self {
      source: source.into(),
      id: None,
      listing_id: None,
      address: None,
      city: None,
      state: None,
      postal_code: None,
      bedrooms: None,
      bathrooms: None,
      square_feet: None,
      property_type: None,
      price: None,
      description: None,
      media: None,
      clear_media: false,
      listing_agent: None,
      listing_office: None,
      source_url: None,
      available_for_showing: None,
      internal_notes: None,
      status: None,
      observed_at: None,
    }
  }

  /// Convenience constructor for the common "listing feed" shape.
  pub fn for_listing(source: impl Into<Source>, listing_id: impl Into<String>) -> Self {
    Self { listing_id: Some(listing_id.into()), ..Self::new(source) }
  }
}
