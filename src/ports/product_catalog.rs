//! ProductCatalog port - read-only product and entitlement catalog.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::catalog::{Entitlement, Product};
use crate::domain::foundation::{AppId, DomainError, ProductId};
use crate::domain::subscription::Platform;

/// Port for catalog lookups. The reconciliation core never writes the catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Find the catalog product for a store product identifier.
    async fn find_by_store_product_id(
        &self,
        app_id: &AppId,
        platform: Platform,
        store_product_id: &str,
    ) -> Result<Option<Product>, DomainError>;

    /// Products by ID. Unknown IDs are skipped.
    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, DomainError>;

    /// Entitlements attached to each product. Products without any are omitted.
    async fn entitlements_for_products(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Vec<Entitlement>>, DomainError>;

    async fn find_entitlement_by_identifier(
        &self,
        app_id: &AppId,
        identifier: &str,
    ) -> Result<Option<Entitlement>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_catalog_is_object_safe() {
        fn _accepts_dyn(_catalog: &dyn ProductCatalog) {}
    }
}
