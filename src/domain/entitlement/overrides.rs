//! Manual entitlement overrides set by operators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{EntitlementId, SubscriberId, Timestamp, ValidationError};

/// Whether an override adds or removes an entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
    Grant,
    Revoke,
}

impl OverrideKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideKind::Grant => "grant",
            OverrideKind::Revoke => "revoke",
        }
    }
}

impl fmt::Display for OverrideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverrideKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grant" => Ok(OverrideKind::Grant),
            "revoke" => Ok(OverrideKind::Revoke),
            other => Err(ValidationError::invalid_format(
                "override_kind",
                format!("unknown override kind '{}'", other),
            )),
        }
    }
}

/// Operator-issued grant or revoke of one entitlement for one subscriber.
///
/// At most one override exists per `(subscriber, entitlement)`; writing a new
/// one replaces the previous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOverride {
    pub subscriber_id: SubscriberId,
    pub entitlement_id: EntitlementId,
    pub entitlement_identifier: String,
    pub kind: OverrideKind,
    /// `None` means the override never lapses.
    pub expires_at: Option<Timestamp>,
    pub reason: Option<String>,
    pub created_at: Timestamp,
}

impl ManualOverride {
    /// Returns true while the override still applies.
    pub fn is_in_effect(&self, now: Timestamp) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at.is_after(&now),
        }
    }
}
