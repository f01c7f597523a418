//! The property status lifecycle.
//!
//! ```text
//! pending_images ─► active ⇄ pending ─► sold
//!                     ⇅                 withdrawn
//!                  available            deleted
//! ```
//!
//! `sold`, `withdrawn` and `deleted` are terminal. Re-listing a property
//! creates a new identity rather than resurrecting the old one, so bookings
//! that reference the old identity stay valid.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum PropertyStatus {
  /// Listed but still waiting for photos. The initial status.
  PendingImages,
  Active,
  /// Read-alias of [`Active`](Self::Active), kept distinct for transitions.
  Available,
  /// Under contract.
  Pending,
  Sold,
  Withdrawn,
  Deleted,
}

impl PropertyStatus {
  pub const ALL: [Self; 7] = [
    Self::PendingImages,
    Self::Active,
    Self::Available,
    Self::Pending,
    Self::Sold,
    Self::Withdrawn,
    Self::Deleted,
  ];

  /// Statuses shown on public listing pages.
  pub const PUBLIC: [Self; 3] = [Self::Active, Self::Available, Self::Pending];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::PendingImages => "pending_images",
      Self::Active => "active",
      Self::Available => "available",
      Self::Pending => "pending",
      Self::Sold => "sold",
      Self::Withdrawn => "withdrawn",
      Self::Deleted => "deleted",
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Sold | Self::Withdrawn | Self::Deleted)
  }

  /// The statuses a read for `self` should match. `active` and `available`
  /// are the same thing to readers.
  pub fn read_set(self) -> &'static [Self] {
    match self {
      Self::Active | Self::Available => &[Self::Active, Self::Available],
      Self::PendingImages => &[Self::PendingImages],
      Self::Pending => &[Self::Pending],
      Self::Sold => &[Self::Sold],
      Self::Withdrawn => &[Self::Withdrawn],
      Self::Deleted => &[Self::Deleted],
    }
  }

  /// Legal successor states.
  pub fn successors(self) -> &'static [Self] {
    match self {
      Self::PendingImages => {
        &[Self::Active, Self::Available, Self::Withdrawn, Self::Deleted]
      }
      Self::Active => &[
        Self::Available,
        Self::Pending,
        Self::Sold,
        Self::Withdrawn,
        Self::Deleted,
      ],
      Self::Available => &[
        Self::Active,
        Self::Pending,
        Self::Sold,
        Self::Withdrawn,
        Self::Deleted,
      ],
      Self::Pending => &[
        Self::Active,
        Self::Available,
        Self::Sold,
        Self::Withdrawn,
        Self::Deleted,
      ],
      Self::Sold | Self::Withdrawn | Self::Deleted => &[],
    }
  }

  /// Position on the happy path, if the status is on it.
  fn happy_path_rank(self) -> Option<u8> {
    match self {
      Self::PendingImages => Some(0),
      Self::Active | Self::Available => Some(1),
      Self::Pending => Some(2),
      Self::Sold => Some(3),
      Self::Withdrawn | Self::Deleted => None,
    }
  }

  /// Whether `self → to` moves strictly forward along
  /// `pending_images → active → pending → sold`.
  pub fn is_forward_to(self, to: Self) -> bool {
    match (self.happy_path_rank(), to.happy_path_rank()) {
      (Some(from), Some(to)) => to > from,
      _ => false,
    }
  }
}

/// Whether `current → proposed` is a legal transition. Staying in the same
/// status is not a transition and is therefore not legal.
pub fn is_legal(current: PropertyStatus, proposed: PropertyStatus) -> bool {
  current.successors().contains(&proposed)
}

impl FromStr for PropertyStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalised = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    match normalised.as_str() {
      "pending_images" | "pendingimages" => Ok(Self::PendingImages),
      "active" => Ok(Self::Active),
      "available" => Ok(Self::Available),
      "pending" => Ok(Self::Pending),
      "sold" => Ok(Self::Sold),
      "withdrawn" | "off_market" => Ok(Self::Withdrawn),
      "deleted" => Ok(Self::Deleted),
      _ => Err(Error::UnknownStatus(s.to_owned())),
    }
  }
}

impl TryFrom<String> for PropertyStatus {
  type Error = Error;

  fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<PropertyStatus> for String {
  fn from(value: PropertyStatus) -> Self { value.as_str().to_owned() }
}

impl fmt::Display for PropertyStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
