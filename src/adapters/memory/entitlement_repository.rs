//! In-memory derived entitlements and manual overrides.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::entitlement::{ManualOverride, SubscriberEntitlement};
use crate::domain::foundation::{DomainError, EntitlementId, SubscriberId};
use crate::ports::{EntitlementOverrideRepository, EntitlementRepository};

use super::{read, write};

#[derive(Default)]
pub struct InMemoryEntitlementRepository {
    sets: RwLock<HashMap<SubscriberId, Vec<SubscriberEntitlement>>>,
    writes: RwLock<usize>,
}

impl InMemoryEntitlementRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `replace_for_subscriber` calls so far.
    pub fn write_count(&self) -> usize {
        *read(&self.writes)
    }
}

#[async_trait]
impl EntitlementRepository for InMemoryEntitlementRepository {
    async fn replace_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
        entitlements: &[SubscriberEntitlement],
    ) -> Result<(), DomainError> {
        write(&self.sets).insert(*subscriber_id, entitlements.to_vec());
        *write(&self.writes) += 1;
        Ok(())
    }

    async fn list_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Vec<SubscriberEntitlement>, DomainError> {
        let mut set = read(&self.sets)
            .get(subscriber_id)
            .cloned()
            .unwrap_or_default();
        set.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(set)
    }
}

#[derive(Default)]
pub struct InMemoryEntitlementOverrideRepository {
    overrides: RwLock<HashMap<(SubscriberId, EntitlementId), ManualOverride>>,
}

impl InMemoryEntitlementOverrideRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntitlementOverrideRepository for InMemoryEntitlementOverrideRepository {
    async fn list_for_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Vec<ManualOverride>, DomainError> {
        Ok(read(&self.overrides)
            .values()
            .filter(|o| o.subscriber_id == *subscriber_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, entry: &ManualOverride) -> Result<(), DomainError> {
        write(&self.overrides).insert((entry.subscriber_id, entry.entitlement_id), entry.clone());
        Ok(())
    }

    async fn delete(
        &self,
        subscriber_id: &SubscriberId,
        entitlement_id: &EntitlementId,
    ) -> Result<bool, DomainError> {
        Ok(write(&self.overrides)
            .remove(&(*subscriber_id, *entitlement_id))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entitlement::OverrideKind;
    use crate::domain::foundation::Timestamp;

    #[tokio::test]
    async fn upsert_replaces_existing_override() {
        let repo = InMemoryEntitlementOverrideRepository::new();
        let mut entry = ManualOverride {
            subscriber_id: SubscriberId::new(),
            entitlement_id: EntitlementId::new(),
            entitlement_identifier: "pro".to_string(),
            kind: OverrideKind::Grant,
            expires_at: None,
            reason: None,
            created_at: Timestamp::now(),
        };
        repo.upsert(&entry).await.unwrap();
        entry.kind = OverrideKind::Revoke;
        repo.upsert(&entry).await.unwrap();

        let listed = repo.list_for_subscriber(&entry.subscriber_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].kind, OverrideKind::Revoke);

        assert!(repo
            .delete(&entry.subscriber_id, &entry.entitlement_id)
            .await
            .unwrap());
        assert!(!repo
            .delete(&entry.subscriber_id, &entry.entitlement_id)
            .await
            .unwrap());
    }
}
