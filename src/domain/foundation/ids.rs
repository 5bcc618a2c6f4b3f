//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

/// Maximum accepted length for an app-scoped user identifier.
const MAX_APP_USER_ID_LEN: usize = 255;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier for a registered app.
    AppId
);

uuid_identifier!(
    /// Unique identifier for a subscriber (one per app and end user).
    SubscriberId
);

uuid_identifier!(
    /// Unique identifier for a stored subscription row.
    SubscriptionId
);

uuid_identifier!(
    /// Unique identifier for a catalog product.
    ProductId
);

uuid_identifier!(
    /// Unique identifier for an app-scoped entitlement.
    EntitlementId
);

/// App-scoped end-user identifier supplied by the app developer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppUserId(String);

impl AppUserId {
    /// Creates a new AppUserId, rejecting empty or oversized values.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(ValidationError::empty_field("app_user_id"));
        }
        if id.len() > MAX_APP_USER_ID_LEN {
            return Err(ValidationError::invalid_format(
                "app_user_id",
                format!("must be at most {} characters", MAX_APP_USER_ID_LEN),
            ));
        }
        Ok(Self(id))
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AppUserId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AppUserId> for String {
    fn from(id: AppUserId) -> Self {
        id.0
    }
}

impl fmt::Display for AppUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_id_generates_unique_values() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn subscription_id_parses_from_string() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id: SubscriptionId = uuid_str.parse().unwrap();
        assert_eq!(id.to_string(), uuid_str);
    }

    #[test]
    fn app_id_rejects_invalid_uuid() {
        assert!("not-a-uuid".parse::<AppId>().is_err());
    }

    #[test]
    fn product_id_serializes_transparently() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let id = ProductId::from_uuid(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
    }

    #[test]
    fn app_user_id_trims_whitespace() {
        let id = AppUserId::new("  user-42  ").unwrap();
        assert_eq!(id.as_str(), "user-42");
    }

    #[test]
    fn app_user_id_rejects_empty() {
        assert!(AppUserId::new("").is_err());
        assert!(AppUserId::new("   ").is_err());
    }

    #[test]
    fn app_user_id_rejects_oversized() {
        let long = "x".repeat(MAX_APP_USER_ID_LEN + 1);
        assert!(AppUserId::new(long).is_err());
    }

    #[test]
    fn app_user_id_deserialization_validates() {
        let ok: Result<AppUserId, _> = serde_json::from_str("\"abc\"");
        assert!(ok.is_ok());
        let empty: Result<AppUserId, _> = serde_json::from_str("\"\"");
        assert!(empty.is_err());
    }
}
