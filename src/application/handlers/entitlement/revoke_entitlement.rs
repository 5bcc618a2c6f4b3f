//! RevokeEntitlementHandler - Command handler for manual entitlement revokes.
//!
//! A revoke wins over every subscription-derived grant of the entitlement
//! until it expires or is cleared.

use std::sync::Arc;

use crate::domain::entitlement::OverrideKind;
use crate::domain::foundation::{AppId, Timestamp};
use crate::domain::subscription::ReconcileError;
use crate::ports::{AppRegistry, EntitlementOverrideRepository, ProductCatalog, SubscriberRepository};

use super::grant_entitlement::{ManualOverrideResult, OverrideWriter};
use super::EntitlementRecomputer;

/// Command to revoke an entitlement from an app user.
#[derive(Debug, Clone)]
pub struct RevokeEntitlementCommand {
    pub app_id: AppId,
    pub app_user_id: String,
    pub entitlement: String,
    /// `None` revokes until cleared.
    pub expires_at: Option<Timestamp>,
    pub reason: Option<String>,
}

pub struct RevokeEntitlementHandler {
    writer: OverrideWriter,
}

impl RevokeEntitlementHandler {
    pub fn new(
        apps: Arc<dyn AppRegistry>,
        catalog: Arc<dyn ProductCatalog>,
        subscribers: Arc<dyn SubscriberRepository>,
        overrides: Arc<dyn EntitlementOverrideRepository>,
        recomputer: Arc<EntitlementRecomputer>,
    ) -> Self {
        Self {
            writer: OverrideWriter {
                apps,
                catalog,
                subscribers,
                overrides,
                recomputer,
            },
        }
    }

    pub async fn handle(
        &self,
        cmd: RevokeEntitlementCommand,
    ) -> Result<ManualOverrideResult, ReconcileError> {
        self.writer
            .write(
                cmd.app_id,
                cmd.app_user_id,
                &cmd.entitlement,
                OverrideKind::Revoke,
                cmd.expires_at,
                cmd.reason,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::test_support::Harness;
    use crate::domain::subscription::SubscriptionStatus;

    #[tokio::test]
    async fn revoke_overrides_active_subscription() {
        let h = Harness::new();
        let subscriber = h.subscriber("user-1").await;
        h.seed_subscription(&subscriber.id, "1000", SubscriptionStatus::Active, Some(30))
            .await;
        let handler = RevokeEntitlementHandler::new(
            h.catalog.clone(),
            h.catalog.clone(),
            h.subscribers.clone(),
            h.overrides.clone(),
            h.recomputer(),
        );

        let result = handler
            .handle(RevokeEntitlementCommand {
                app_id: h.app.id,
                app_user_id: "user-1".to_string(),
                entitlement: "pro".to_string(),
                expires_at: None,
                reason: Some("fraud".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(result.entry.subscriber_id, subscriber.id);
        let pro = result
            .entitlements
            .iter()
            .find(|e| e.identifier == "pro")
            .unwrap();
        assert!(!pro.is_active);
    }
}
