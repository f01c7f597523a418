//! The structured result of a reconcile call.
//!
//! Field-level rejections are not errors. They are reported here so the
//! caller can see exactly which parts of its update took effect.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{field::Field, source::Source, status::PropertyStatus};

/// Why a field in the request was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
  /// The stored value was written by a source with more authority.
  Outranked { holder: Source },
  /// Only administrative sources may write this field.
  AdministrativeOnly,
  /// The status change is not allowed by the lifecycle.
  IllegalTransition { from: PropertyStatus, to: PropertyStatus },
  /// The source may only move status forward along the happy path.
  ForwardOnly { from: PropertyStatus, to: PropertyStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRejection {
  pub field:     Field,
  #[serde(flatten)]
  pub rejection: Rejection,
}

/// What happened to the status claim in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum StatusDecision {
  NotRequested,
  /// The requested status is already current.
  Unchanged,
  Accepted {
    from: Option<PropertyStatus>,
    to:   PropertyStatus,
  },
  /// The reason is listed in [`Outcome::rejected`].
  Rejected { requested: PropertyStatus },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
  pub property_id: Uuid,
  /// The record did not exist before this call.
  pub created:     bool,
  pub applied:     Vec<Field>,
  /// Present in the request with the value already stored.
  pub unchanged:   Vec<Field>,
  pub rejected:    Vec<FieldRejection>,
  pub status:      StatusDecision,
  /// Version of the record after the call.
  pub version:     u64,
  /// Conditional-update conflicts absorbed before the call settled.
  pub retries:     u32,
}

impl Outcome {
  pub fn status_accepted(&self) -> bool {
    matches!(self.status, StatusDecision::Accepted { .. })
  }

  pub fn rejection(&self, field: Field) -> Option<&Rejection> {
    self
      .rejected
      .iter()
      .find(|r| r.field == field)
      .map(|r| &r.rejection)
  }

  pub fn was_applied(&self, field: Field) -> bool { self.applied.contains(&field) }

  /// Nothing was written by this call.
  pub fn is_noop(&self) -> bool { !self.created && self.applied.is_empty() }
}
