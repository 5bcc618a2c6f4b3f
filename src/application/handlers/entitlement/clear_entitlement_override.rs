//! ClearEntitlementOverrideHandler - Removes a manual grant or revoke.

use std::sync::Arc;

use crate::domain::entitlement::SubscriberEntitlement;
use crate::domain::foundation::{AppId, AppUserId};
use crate::domain::subscription::ReconcileError;
use crate::ports::{AppRegistry, EntitlementOverrideRepository, ProductCatalog, SubscriberRepository};

use super::EntitlementRecomputer;

#[derive(Debug, Clone)]
pub struct ClearEntitlementOverrideCommand {
    pub app_id: AppId,
    pub app_user_id: String,
    pub entitlement: String,
}

#[derive(Debug, Clone)]
pub struct ClearEntitlementOverrideResult {
    /// False when no override existed.
    pub removed: bool,
    pub entitlements: Vec<SubscriberEntitlement>,
}

pub struct ClearEntitlementOverrideHandler {
    apps: Arc<dyn AppRegistry>,
    catalog: Arc<dyn ProductCatalog>,
    subscribers: Arc<dyn SubscriberRepository>,
    overrides: Arc<dyn EntitlementOverrideRepository>,
    recomputer: Arc<EntitlementRecomputer>,
}

impl ClearEntitlementOverrideHandler {
    pub fn new(
        apps: Arc<dyn AppRegistry>,
        catalog: Arc<dyn ProductCatalog>,
        subscribers: Arc<dyn SubscriberRepository>,
        overrides: Arc<dyn EntitlementOverrideRepository>,
        recomputer: Arc<EntitlementRecomputer>,
    ) -> Self {
        Self {
            apps,
            catalog,
            subscribers,
            overrides,
            recomputer,
        }
    }

    pub async fn handle(
        &self,
        cmd: ClearEntitlementOverrideCommand,
    ) -> Result<ClearEntitlementOverrideResult, ReconcileError> {
        let app_user_id = AppUserId::new(cmd.app_user_id)
            .map_err(|e| ReconcileError::Validation(e.to_string()))?;
        self.apps
            .find_by_id(&cmd.app_id)
            .await?
            .ok_or(ReconcileError::AppNotFound(cmd.app_id))?;

        let Some(subscriber) = self
            .subscribers
            .find_by_app_user(&cmd.app_id, &app_user_id)
            .await?
        else {
            return Ok(ClearEntitlementOverrideResult {
                removed: false,
                entitlements: Vec::new(),
            });
        };
        let Some(entitlement) = self
            .catalog
            .find_entitlement_by_identifier(&cmd.app_id, &cmd.entitlement)
            .await?
        else {
            return Err(ReconcileError::Validation(format!(
                "Unknown entitlement '{}'",
                cmd.entitlement
            )));
        };

        let removed = self.overrides.delete(&subscriber.id, &entitlement.id).await?;
        let entitlements = self.recomputer.recompute(&subscriber.id).await?;

        Ok(ClearEntitlementOverrideResult {
            removed,
            entitlements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::entitlement::{
        RevokeEntitlementCommand, RevokeEntitlementHandler,
    };
    use crate::application::handlers::test_support::Harness;
    use crate::domain::subscription::SubscriptionStatus;

    #[tokio::test]
    async fn clearing_revoke_restores_subscription_grant() {
        let h = Harness::new();
        let subscriber = h.subscriber("user-1").await;
        h.seed_subscription(&subscriber.id, "1000", SubscriptionStatus::Active, Some(30))
            .await;
        RevokeEntitlementHandler::new(
            h.catalog.clone(),
            h.catalog.clone(),
            h.subscribers.clone(),
            h.overrides.clone(),
            h.recomputer(),
        )
        .handle(RevokeEntitlementCommand {
            app_id: h.app.id,
            app_user_id: "user-1".to_string(),
            entitlement: "pro".to_string(),
            expires_at: None,
            reason: None,
        })
        .await
        .unwrap();

        let handler = ClearEntitlementOverrideHandler::new(
            h.catalog.clone(),
            h.catalog.clone(),
            h.subscribers.clone(),
            h.overrides.clone(),
            h.recomputer(),
        );
        let cmd = ClearEntitlementOverrideCommand {
            app_id: h.app.id,
            app_user_id: "user-1".to_string(),
            entitlement: "pro".to_string(),
        };
        let result = handler.handle(cmd.clone()).await.unwrap();

        assert!(result.removed);
        assert!(result.entitlements.iter().any(|e| e.identifier == "pro" && e.is_active));

        let again = handler.handle(cmd).await.unwrap();
        assert!(!again.removed);
    }
}
