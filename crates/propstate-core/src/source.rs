//! Source identifiers: who is asking to change a property.
//!
//! Integrations identify themselves with free-form strings at the boundary.
//! Those strings are folded into a closed set of known sources here, so that
//! trust decisions never compare raw strings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A system that submits property updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Source {
  /// The listing-syndication scraper (MLS/HAR feed).
  Syndication,
  /// A human editing through the admin dashboard.
  Admin,
  /// The CRM integration.
  Crm,
  /// The booking/showing pipeline.
  Booking,
  /// Any integration we do not recognise. Keeps the caller's name for audit.
  Unknown(String),
}

impl Source {
  /// Parse a boundary identifier, accepting the legacy names each
  /// integration has used over time.
  pub fn parse(name: &str) -> Self {
    let trimmed = name.trim();
    match trimmed.to_ascii_lowercase().as_str() {
      "syndication" | "scraper" | "har" | "listing_sync" | "listing-sync" => {
        Self::Syndication
      }
      "admin" | "manual" => Self::Admin,
      "crm" | "fub" => Self::Crm,
      "booking" => Self::Booking,
      _ => Self::Unknown(trimmed.to_owned()),
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      Self::Syndication => "syndication",
      Self::Admin => "admin",
      Self::Crm => "crm",
      Self::Booking => "booking",
      Self::Unknown(name) => name,
    }
  }

  pub fn is_known(&self) -> bool { !matches!(self, Self::Unknown(_)) }
}

impl From<String> for Source {
  fn from(value: String) -> Self { Self::parse(&value) }
}

impl From<&str> for Source {
  fn from(value: &str) -> Self { Self::parse(value) }
}

impl From<Source> for String {
  fn from(value: Source) -> Self { value.as_str().to_owned() }
}

impl fmt::Display for Source {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
