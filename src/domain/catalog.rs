//! App registry and product catalog.
//!
//! These are owned by the surrounding admin system. The reconciliation core
//! only reads them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{AppId, EntitlementId, ProductId, ValidationError};
use crate::domain::subscription::Platform;

/// A registered app and its store identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub id: AppId,
    pub name: String,
    /// Apple bundle identifier.
    pub bundle_id: Option<String>,
    /// Google Play package name.
    pub package_name: Option<String>,
}

impl App {
    /// Store-side identifier of this app on the given platform.
    pub fn store_identifier(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Ios => self.bundle_id.as_deref(),
            Platform::Android => self.package_name.as_deref(),
        }
    }

    /// Returns true if a store-reported app identifier belongs to this app.
    ///
    /// Payloads that carry no identifier are accepted.
    pub fn matches_store_identifier(&self, platform: Platform, reported: Option<&str>) -> bool {
        match (self.store_identifier(platform), reported) {
            (_, None) => true,
            (Some(expected), Some(reported)) => expected == reported,
            (None, Some(_)) => false,
        }
    }
}

/// Product type as configured in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Consumable,
    NonConsumable,
    AutoRenewableSubscription,
    NonRenewingSubscription,
}

impl ProductType {
    /// Consumables are used up and never grant durable entitlements.
    pub fn grants_entitlements(&self) -> bool {
        !matches!(self, ProductType::Consumable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Consumable => "consumable",
            ProductType::NonConsumable => "non_consumable",
            ProductType::AutoRenewableSubscription => "auto_renewable_subscription",
            ProductType::NonRenewingSubscription => "non_renewing_subscription",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consumable" => Ok(ProductType::Consumable),
            "non_consumable" => Ok(ProductType::NonConsumable),
            "auto_renewable_subscription" => Ok(ProductType::AutoRenewableSubscription),
            "non_renewing_subscription" => Ok(ProductType::NonRenewingSubscription),
            other => Err(ValidationError::invalid_format(
                "product_type",
                format!("unknown product type '{}'", other),
            )),
        }
    }
}

/// App-scoped catalog entry for one store product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub app_id: AppId,
    pub platform: Platform,
    pub store_product_id: String,
    pub product_type: ProductType,
    pub display_name: Option<String>,
}

/// App-scoped named capability, e.g. `pro_access`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entitlement {
    pub id: EntitlementId,
    pub app_id: AppId,
    pub identifier: String,
    pub description: Option<String>,
}
