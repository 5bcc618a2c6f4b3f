//! Store platform vocabulary shared by both store adapters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Mobile store a purchase originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Apple App Store (StoreKit 2).
    Ios,
    /// Google Play Billing.
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            other => Err(ValidationError::invalid_format(
                "platform",
                format!("expected 'ios' or 'android', got '{}'", other),
            )),
        }
    }
}

/// Store environment a transaction was made in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreEnvironment {
    #[default]
    Production,
    Sandbox,
}

impl StoreEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreEnvironment::Production => "production",
            StoreEnvironment::Sandbox => "sandbox",
        }
    }
}

impl FromStr for StoreEnvironment {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(StoreEnvironment::Production),
            "sandbox" => Ok(StoreEnvironment::Sandbox),
            other => Err(ValidationError::invalid_format(
                "environment",
                format!("unknown store environment '{}'", other),
            )),
        }
    }
}

/// Kind of offer applied to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferType {
    Introductory,
    Promotional,
    OfferCode,
    WinBack,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parses_wire_names() {
        assert_eq!("ios".parse::<Platform>().unwrap(), Platform::Ios);
        assert_eq!("android".parse::<Platform>().unwrap(), Platform::Android);
        assert!("windows".parse::<Platform>().is_err());
    }

    #[test]
    fn platform_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Platform::Ios).unwrap(), "\"ios\"");
        assert_eq!(serde_json::to_string(&Platform::Android).unwrap(), "\"android\"");
    }

    #[test]
    fn environment_round_trips_through_str() {
        for env in [StoreEnvironment::Production, StoreEnvironment::Sandbox] {
            assert_eq!(env.as_str().parse::<StoreEnvironment>().unwrap(), env);
        }
    }
}
