//! Service-account OAuth for the Google Play Developer API.
//!
//! A signed RS256 assertion is exchanged for an access token at the key's
//! `token_uri` (JWT bearer grant). The token is cached until shortly before
//! it expires.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::ports::StoreError;

pub const ANDROID_PUBLISHER_SCOPE: &str = "https://www.googleapis.com/auth/androidpublisher";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(120);

/// Fields read from a service-account JSON key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Parses a service-account JSON key.
    pub fn from_json(json: &SecretString) -> Result<Self, StoreError> {
        serde_json::from_str(json.expose_secret()).map_err(|e| {
            StoreError::NotConfigured(format!("Invalid service account key: {}", e))
        })
    }
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Access-token source for one service account.
pub struct ServiceAccountTokenProvider {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    http_client: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

impl ServiceAccountTokenProvider {
    pub fn new(key: ServiceAccountKey, http_client: reqwest::Client) -> Result<Self, StoreError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            StoreError::NotConfigured(format!("Invalid service account private key: {}", e))
        })?;
        Ok(Self {
            key,
            encoding_key,
            http_client,
            cached: RwLock::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Returns a valid access token, refreshing it when needed.
    pub async fn access_token(&self) -> Result<String, StoreError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                    return Ok(token.token.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.token.clone());
            }
        }

        let response = self.exchange_assertion().await?;
        let token = response.access_token.clone();
        *cached = Some(CachedToken {
            token: response.access_token,
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        });
        tracing::debug!(client_email = %self.key.client_email, "Refreshed Google access token");
        Ok(token)
    }

    fn sign_assertion(&self) -> Result<String, StoreError> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: ANDROID_PUBLISHER_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| StoreError::NotConfigured(format!("Cannot sign assertion: {}", e)))
    }

    async fn exchange_assertion(&self) -> Result<TokenResponse, StoreError> {
        let assertion = self.sign_assertion()?;

        let response = self
            .http_client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Google token request failed");
                StoreError::Network(e.to_string())
            })?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status_code, body = %body, "Google token exchange rejected");
            return Err(StoreError::Api { status_code, body });
        }

        response.json::<TokenResponse>().await.map_err(|e| {
            StoreError::MalformedPayload(format!("Invalid token response: {}", e))
        })
    }
}
