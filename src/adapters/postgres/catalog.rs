//! PostgreSQL implementation of AppRegistry and ProductCatalog.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::catalog::{App, Entitlement, Product};
use crate::domain::foundation::{AppId, DomainError, EntitlementId, ProductId};
use crate::domain::subscription::Platform;
use crate::ports::{AppRegistry, ProductCatalog};

use super::{db_error, parse_column};

pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AppRow {
    id: Uuid,
    name: String,
    bundle_id: Option<String>,
    package_name: Option<String>,
}

impl From<AppRow> for App {
    fn from(row: AppRow) -> Self {
        App {
            id: AppId::from_uuid(row.id),
            name: row.name,
            bundle_id: row.bundle_id,
            package_name: row.package_name,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    app_id: Uuid,
    platform: String,
    store_product_id: String,
    product_type: String,
    display_name: Option<String>,
}

impl TryFrom<ProductRow> for Product {
    type Error = DomainError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: ProductId::from_uuid(row.id),
            app_id: AppId::from_uuid(row.app_id),
            platform: parse_column("platform", &row.platform)?,
            store_product_id: row.store_product_id,
            product_type: parse_column("product_type", &row.product_type)?,
            display_name: row.display_name,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    id: Uuid,
    app_id: Uuid,
    identifier: String,
    description: Option<String>,
}

impl From<EntitlementRow> for Entitlement {
    fn from(row: EntitlementRow) -> Self {
        Entitlement {
            id: EntitlementId::from_uuid(row.id),
            app_id: AppId::from_uuid(row.app_id),
            identifier: row.identifier,
            description: row.description,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductEntitlementRow {
    product_id: Uuid,
    #[sqlx(flatten)]
    entitlement: EntitlementRow,
}

fn uuids<T, F: Fn(&T) -> Uuid>(ids: &[T], f: F) -> Vec<Uuid> {
    ids.iter().map(f).collect()
}

#[async_trait]
impl AppRegistry for PostgresCatalog {
    async fn find_by_id(&self, id: &AppId) -> Result<Option<App>, DomainError> {
        let row: Option<AppRow> =
            sqlx::query_as("SELECT id, name, bundle_id, package_name FROM apps WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to load app", e))?;

        Ok(row.map(App::from))
    }
}

#[async_trait]
impl ProductCatalog for PostgresCatalog {
    async fn find_by_store_product_id(
        &self,
        app_id: &AppId,
        platform: Platform,
        store_product_id: &str,
    ) -> Result<Option<Product>, DomainError> {
        let row: Option<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, app_id, platform, store_product_id, product_type, display_name
            FROM products
            WHERE app_id = $1 AND platform = $2 AND store_product_id = $3
            "#,
        )
        .bind(app_id.as_uuid())
        .bind(platform.as_str())
        .bind(store_product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load product", e))?;

        row.map(Product::try_from).transpose()
    }

    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, app_id, platform, store_product_id, product_type, display_name
            FROM products
            WHERE id = ANY($1)
            "#,
        )
        .bind(uuids(ids, |id| *id.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load products", e))?;

        rows.into_iter().map(Product::try_from).collect()
    }

    async fn entitlements_for_products(
        &self,
        ids: &[ProductId],
    ) -> Result<HashMap<ProductId, Vec<Entitlement>>, DomainError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<ProductEntitlementRow> = sqlx::query_as(
            r#"
            SELECT pe.product_id, e.id, e.app_id, e.identifier, e.description
            FROM product_entitlements pe
            JOIN entitlements e ON e.id = pe.entitlement_id
            WHERE pe.product_id = ANY($1)
            ORDER BY e.identifier
            "#,
        )
        .bind(uuids(ids, |id| *id.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load product entitlements", e))?;

        let mut map: HashMap<ProductId, Vec<Entitlement>> = HashMap::new();
        for row in rows {
            map.entry(ProductId::from_uuid(row.product_id))
                .or_default()
                .push(row.entitlement.into());
        }
        Ok(map)
    }

    async fn find_entitlement_by_identifier(
        &self,
        app_id: &AppId,
        identifier: &str,
    ) -> Result<Option<Entitlement>, DomainError> {
        let row: Option<EntitlementRow> = sqlx::query_as(
            r#"
            SELECT id, app_id, identifier, description
            FROM entitlements
            WHERE app_id = $1 AND identifier = $2
            "#,
        )
        .bind(app_id.as_uuid())
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load entitlement", e))?;

        Ok(row.map(Entitlement::from))
    }
}
