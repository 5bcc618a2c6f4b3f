//! Google Play configuration

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use super::error::ValidationError;
use super::server::Environment;

/// Google Play configuration (Developer API and Pub/Sub push)
#[derive(Clone, Deserialize)]
pub struct GoogleConfig {
    /// Service account key JSON with access to the Android Publisher API
    pub service_account_json: Option<String>,

    /// Shared token expected on the Pub/Sub push endpoint query string
    pub pubsub_push_token: Option<String>,

    /// Play Developer API request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,
}

impl GoogleConfig {
    /// Check if the Play Developer API is configured
    pub fn has_developer_api(&self) -> bool {
        self.service_account_json
            .as_ref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    pub fn has_push_token(&self) -> bool {
        self.pubsub_push_token
            .as_ref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Validate Google Play configuration
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if let Some(json) = self.service_account_json.as_deref() {
            if !json.trim().is_empty() && serde_json::from_str::<serde_json::Value>(json).is_err() {
                return Err(ValidationError::InvalidServiceAccountJson);
            }
        }

        if *environment == Environment::Production
            && self.has_developer_api()
            && !self.has_push_token()
        {
            return Err(ValidationError::MissingRequired("GOOGLE__PUBSUB_PUSH_TOKEN"));
        }

        if self.api_timeout_secs == 0 || self.api_timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }

        Ok(())
    }
}

impl fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleConfig")
            .field(
                "service_account_json",
                &self.service_account_json.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "pubsub_push_token",
                &self.pubsub_push_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            service_account_json: None,
            pubsub_push_token: None,
            api_timeout_secs: default_api_timeout(),
        }
    }
}

fn default_api_timeout() -> u64 {
    10
}
