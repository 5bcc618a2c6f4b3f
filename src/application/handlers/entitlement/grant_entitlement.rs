//! GrantEntitlementHandler - Command handler for manual entitlement grants.
//!
//! Manual grants add an entitlement regardless of subscriptions, optionally
//! until an expiry. A later revoke of the same entitlement replaces the grant.

use std::sync::Arc;

use crate::domain::catalog::Entitlement;
use crate::domain::entitlement::{ManualOverride, OverrideKind, SubscriberEntitlement};
use crate::domain::foundation::{AppId, AppUserId, Timestamp};
use crate::domain::subscriber::Subscriber;
use crate::domain::subscription::ReconcileError;
use crate::ports::{AppRegistry, EntitlementOverrideRepository, ProductCatalog, SubscriberRepository};

use super::EntitlementRecomputer;

/// Command to grant an entitlement to an app user.
#[derive(Debug, Clone)]
pub struct GrantEntitlementCommand {
    pub app_id: AppId,
    pub app_user_id: String,
    /// Entitlement identifier, e.g. `"pro"`.
    pub entitlement: String,
    /// `None` grants indefinitely.
    pub expires_at: Option<Timestamp>,
    pub reason: Option<String>,
}

/// Result of writing a manual override.
#[derive(Debug, Clone)]
pub struct ManualOverrideResult {
    pub entry: ManualOverride,
    pub entitlements: Vec<SubscriberEntitlement>,
}

/// Resolves, writes and applies manual overrides.
pub(super) struct OverrideWriter {
    pub apps: Arc<dyn AppRegistry>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub subscribers: Arc<dyn SubscriberRepository>,
    pub overrides: Arc<dyn EntitlementOverrideRepository>,
    pub recomputer: Arc<EntitlementRecomputer>,
}

impl OverrideWriter {
    pub async fn resolve(
        &self,
        app_id: &AppId,
        app_user_id: String,
        identifier: &str,
    ) -> Result<(Subscriber, Entitlement), ReconcileError> {
        let app_user_id =
            AppUserId::new(app_user_id).map_err(|e| ReconcileError::Validation(e.to_string()))?;
        self.apps
            .find_by_id(app_id)
            .await?
            .ok_or(ReconcileError::AppNotFound(*app_id))?;
        let entitlement = self
            .catalog
            .find_entitlement_by_identifier(app_id, identifier)
            .await?
            .ok_or_else(|| {
                ReconcileError::Validation(format!("Unknown entitlement '{}'", identifier))
            })?;
        let subscriber = self.subscribers.get_or_create(app_id, &app_user_id).await?;
        Ok((subscriber, entitlement))
    }

    pub async fn write(
        &self,
        app_id: AppId,
        app_user_id: String,
        identifier: &str,
        kind: OverrideKind,
        expires_at: Option<Timestamp>,
        reason: Option<String>,
    ) -> Result<ManualOverrideResult, ReconcileError> {
        let now = Timestamp::now();
        if expires_at.is_some_and(|t| !t.is_after(&now)) {
            return Err(ReconcileError::Validation(
                "expires_at must be in the future".to_string(),
            ));
        }

        let (subscriber, entitlement) = self.resolve(&app_id, app_user_id, identifier).await?;
        let entry = ManualOverride {
            subscriber_id: subscriber.id,
            entitlement_id: entitlement.id,
            entitlement_identifier: entitlement.identifier,
            kind,
            expires_at,
            reason,
            created_at: now,
        };
        self.overrides.upsert(&entry).await?;

        tracing::info!(
            subscriber_id = %subscriber.id,
            entitlement = %entry.entitlement_identifier,
            kind = %entry.kind,
            "Wrote manual entitlement override"
        );

        let entitlements = self.recomputer.recompute(&subscriber.id).await?;
        Ok(ManualOverrideResult {
            entry,
            entitlements,
        })
    }
}

pub struct GrantEntitlementHandler {
    writer: OverrideWriter,
}

impl GrantEntitlementHandler {
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
        cmd: GrantEntitlementCommand,
    ) -> Result<ManualOverrideResult, ReconcileError> {
        self.writer
            .write(
                cmd.app_id,
                cmd.app_user_id,
                &cmd.entitlement,
                OverrideKind::Grant,
                cmd.expires_at,
                cmd.reason,
            )
            .await
    }
}
