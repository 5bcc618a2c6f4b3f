//! Google Play Developer API client.

use secrecy::SecretString;
use std::time::Duration;

use crate::ports::StoreError;

use super::auth::{ServiceAccountKey, ServiceAccountTokenProvider};
use super::models::SubscriptionPurchaseV2;

pub const ANDROID_PUBLISHER_BASE_URL: &str = "https://androidpublisher.googleapis.com";

/// Play Developer API settings.
#[derive(Clone)]
pub struct GooglePlayConfig {
    service_account_json: SecretString,
    base_url: String,
    timeout: Duration,
}

impl GooglePlayConfig {
    pub fn new(service_account_json: SecretString) -> Self {
        Self {
            service_account_json,
            base_url: ANDROID_PUBLISHER_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Override base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for GooglePlayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GooglePlayConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

pub struct PlayDeveloperClient {
    base_url: String,
    http_client: reqwest::Client,
    tokens: ServiceAccountTokenProvider,
}

impl PlayDeveloperClient {
    pub fn new(config: GooglePlayConfig) -> Result<Self, StoreError> {
        let key = ServiceAccountKey::from_json(&config.service_account_json)?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::NotConfigured(format!("HTTP client: {}", e)))?;
        let tokens = ServiceAccountTokenProvider::new(key, http_client.clone())?;

        Ok(Self {
            base_url: config.base_url,
            http_client,
            tokens,
        })
    }

    /// `GET .../purchases/subscriptionsv2/tokens/{token}`.
    pub async fn get_subscription(
        &self,
        package_name: &str,
        purchase_token: &str,
    ) -> Result<SubscriptionPurchaseV2, StoreError> {
        let url = format!(
            "{}/androidpublisher/v3/applications/{}/purchases/subscriptionsv2/tokens/{}",
            self.base_url.trim_end_matches('/'),
            package_name,
            purchase_token
        );
        let access_token = self.tokens.access_token().await?;

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, package_name, "Play Developer API request failed");
                StoreError::Network(e.to_string())
            })?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status_code, body = %body, package_name, "Play Developer API error");
            return Err(StoreError::Api { status_code, body });
        }

        response.json::<SubscriptionPurchaseV2>().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Play subscription resource");
            StoreError::MalformedPayload(format!("Invalid Play response: {}", e))
        })
    }
}

impl std::fmt::Debug for PlayDeveloperClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayDeveloperClient")
            .field("base_url", &self.base_url)
            .field("client_email", &self.tokens.client_email())
            .finish_non_exhaustive()
    }
}
