//! Source trust policy.
//!
//! Each [`FieldClass`] carries an ordered list of sources, most trusted first.
//! A listed source ranks above every unlisted one, by its distance from the
//! bottom of the list. Known sources missing from the list rank one; unknown
//! integrations rank zero, below every known source on every field. Equal
//! ranks are settled by recency.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error,
  field::{Field, FieldClass},
  property::FieldProvenance,
  source::Source,
};

/// Configurable trust table. Deserialises from the `[trust]` config section;
/// every key is optional and falls back to the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustPolicy {
  /// Price, availability and status.
  pub market:            Vec<Source>,
  /// Listing agent and office.
  pub agent:             Vec<Source>,
  /// Ranking used when a source asks to clear photos.
  pub media:             Vec<Source>,
  pub descriptive:       Vec<Source>,
  /// Sources allowed to write administrative fields at all.
  pub administrative:    Vec<Source>,
  /// Sources that may only move status forward along the happy path.
  pub forward_only:      Vec<Source>,
}

impl Default for TrustPolicy {
  fn default() -> Self {
    use Source::*;
    Self {
      market:         vec![Syndication, Admin, Crm, Booking],
      agent:          vec![Admin, Syndication],
      media:          vec![Admin, Syndication, Crm, Booking],
      descriptive:    vec![Admin, Syndication, Crm, Booking],
      administrative: vec![Admin],
      forward_only:   vec![Booking],
    }
  }
}

impl TrustPolicy {
  pub fn ranking(&self, class: FieldClass) -> &[Source] {
    match class {
      FieldClass::Market => &self.market,
      FieldClass::Agent => &self.agent,
      FieldClass::Media => &self.media,
      FieldClass::Descriptive => &self.descriptive,
      FieldClass::Administrative => &self.administrative,
    }
  }

  /// Rank of `source` for `field`. Higher wins.
  pub fn authority(&self, field: Field, source: &Source) -> usize {
    let ranking = self.ranking(field.class());
    match ranking.iter().position(|s| s == source) {
      Some(index) => 1 + ranking.len() - index,
      None if source.is_known() => 1,
      None => 0,
    }
  }

  /// Whether a write from `incoming`, observed at `observed_at`, may replace
  /// a value last written under `holder`.
  pub fn prevails(
    &self,
    field: Field,
    incoming: &Source,
    observed_at: DateTime<Utc>,
    holder: &FieldProvenance,
  ) -> bool {
    let challenger = self.authority(field, incoming);
    let incumbent = self.authority(field, &holder.source);
    challenger > incumbent || (challenger == incumbent && observed_at >= holder.written_at)
  }

  pub fn may_write_administrative(&self, source: &Source) -> bool {
    self.administrative.contains(source)
  }

  pub fn is_forward_only(&self, source: &Source) -> bool {
    self.forward_only.contains(source)
  }
}

// ─── Conflict resolution ─────────────────────────────────────────────────────

/// An administrative decision about which source holds a contended field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
  /// Pin the field to the admin's manual value.
  ManualOverride,
  SyndicationAuthoritative,
  CrmAuthoritative,
}

impl Resolution {
  /// The source that holds the field after the resolution is applied.
  pub fn holder(self) -> Source {
    match self {
      Self::ManualOverride => Source::Admin,
      Self::SyndicationAuthoritative => Source::Syndication,
      Self::CrmAuthoritative => Source::Crm,
    }
  }
}

impl FromStr for Resolution {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "manual_override" => Ok(Self::ManualOverride),
      "syndication_authoritative" | "har_authoritative" => {
        Ok(Self::SyndicationAuthoritative)
      }
      "crm_authoritative" | "fub_authoritative" => Ok(Self::CrmAuthoritative),
      _ => Err(Error::UnknownResolution(s.to_owned())),
    }
  }
}
