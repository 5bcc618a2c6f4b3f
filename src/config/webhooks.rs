//! Webhook ledger configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Webhook claim and retention settings
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Seconds a claimed delivery stays locked before a redelivery may take it over
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: u64,

    /// Days processed events are kept in the ledger
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    /// Seconds between ledger purge runs
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl WebhookConfig {
    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 3600)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(60))
    }

    /// Validate webhook configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=3600).contains(&self.claim_lease_secs) {
            return Err(ValidationError::InvalidClaimLease);
        }
        if !(1..=3650).contains(&self.retention_days) {
            return Err(ValidationError::InvalidRetention);
        }
        Ok(())
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            claim_lease_secs: default_claim_lease(),
            retention_days: default_retention_days(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

fn default_claim_lease() -> u64 {
    300
}

fn default_retention_days() -> u64 {
    90
}

fn default_purge_interval() -> u64 {
    3600
}
