//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Lock pool needs at least two connections")]
    InvalidLockPoolSize,

    #[error("Data and lock pools together exceed the maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("App Store Server API needs issuer_id, key_id and private_key together")]
    IncompleteAppleCredentials,

    #[error("Apple private key must be a PEM-encoded PKCS#8 key")]
    InvalidApplePrivateKey,

    #[error("Invalid Apple root certificate fingerprint: {0}")]
    InvalidRootFingerprint(String),

    #[error("Signature verification cannot be disabled in production")]
    InsecureVerificationInProduction,

    #[error("Google service account JSON is not valid JSON")]
    InvalidServiceAccountJson,

    #[error("Webhook claim lease must be between 1 and 3600 seconds")]
    InvalidClaimLease,

    #[error("Webhook retention must be between 1 and 3650 days")]
    InvalidRetention,
}
