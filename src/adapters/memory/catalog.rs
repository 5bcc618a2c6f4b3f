//! In-memory app registry and product catalog.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::catalog::{App, Entitlement, Product};
use crate::domain::foundation::{AppId, DomainError, EntitlementId, ProductId};
use crate::domain::subscription::Platform;
use crate::ports::{AppRegistry, ProductCatalog};

use super::{read, write};

/// Catalog seeded directly by tests.
#[derive(Default)]
pub struct InMemoryCatalog {
    apps: RwLock<HashMap<AppId, App>>,
    products: RwLock<HashMap<ProductId, Product>>,
    entitlements: RwLock<HashMap<EntitlementId, Entitlement>>,
    product_entitlements: RwLock<HashMap<ProductId, Vec<EntitlementId>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_app(&self, app: App) {
        write(&self.apps).insert(app.id, app);
    }

    pub fn add_product(&self, product: Product) {
        write(&self.products).insert(product.id, product);
    }

    pub fn add_entitlement(&self, entitlement: Entitlement) {
        write(&self.entitlements).insert(entitlement.id, entitlement);
    }

    /// Attach an entitlement to a product.
    pub fn attach(&self, product_id: ProductId, entitlement_id: EntitlementId) {
        let mut links = write(&self.product_entitlements);
        let entry = links.entry(product_id).or_default();
        if !entry.contains(&entitlement_id) {
            entry.push(entitlement_id);
        }
    }
}

#[async_trait]
impl AppRegistry for InMemoryCatalog {
    async fn find_by_id(&self, id: &AppId) -> Result<Option<App>, DomainError> {
        Ok(read(&self.apps).get(id).cloned())
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn find_by_store_product_id(
        &self,
        app_id: &AppId,
        platform: Platform,
        store_product_id: &str,
    ) -> Result<Option<Product>, DomainError> {
        Ok(read(&self.products)
            .values()
            .find(|p| {
                p.app_id == *app_id
                    && p.platform == platform
                    && p.store_product_id == store_product_id
            })
            .cloned())
    }

    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, DomainError> {
        let products = read(&self.products);
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }

    async fn entitlements_for_products(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Vec<Entitlement>>, DomainError> {
        let links = read(&self.product_entitlements);
        let entitlements = read(&self.entitlements);
        let mut result = HashMap::new();
        for id in ids {
            let granted: Vec<Entitlement> = links
                .get(id)
                .map(|ids| ids.iter().filter_map(|e| entitlements.get(e).cloned()).collect())
                .unwrap_or_default();
            if !granted.is_empty() {
                result.insert(*id, granted);
            }
        }
        Ok(result)
    }

    async fn find_entitlement_by_identifier(
        &self,
        app_id: &AppId,
        identifier: &str,
    ) -> Result<Option<Entitlement>, DomainError> {
        Ok(read(&self.entitlements)
            .values()
            .find(|e| e.app_id == *app_id && e.identifier == identifier)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::ProductType;

    #[tokio::test]
    async fn attached_entitlements_are_returned_per_product() {
        let catalog = InMemoryCatalog::new();
        let app_id = AppId::new();
        let product = Product {
            id: ProductId::new(),
            app_id,
            platform: Platform::Ios,
            store_product_id: "pro.monthly".to_string(),
            product_type: ProductType::AutoRenewableSubscription,
            display_name: None,
        };
        let pro = Entitlement {
            id: EntitlementId::new(),
            app_id,
            identifier: "pro".to_string(),
            description: None,
        };
        catalog.add_product(product.clone());
        catalog.add_entitlement(pro.clone());
        catalog.attach(product.id, pro.id);
        catalog.attach(product.id, pro.id);

        let map = catalog
            .entitlements_for_products(&[product.id, ProductId::new()])
            .await
            .unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[&product.id], vec![pro]);

        let found = catalog
            .find_by_store_product_id(&app_id, Platform::Ios, "pro.monthly")
            .await
            .unwrap();
        assert_eq!(found, Some(product));
        assert!(catalog
            .find_by_store_product_id(&app_id, Platform::Android, "pro.monthly")
            .await
            .unwrap()
            .is_none());
    }
}
