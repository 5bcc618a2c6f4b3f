//! App Store JWS verification.
//!
//! Apple signs transactions, renewal info and notifications as compact JWS
//! values (ES256). The header carries the signing chain in `x5c`:
//! leaf, Apple WWDR intermediate, Apple Root CA - G3.
//!
//! # Verification steps
//!
//! 1. Header algorithm is ES256 and `x5c` holds at least three certificates
//! 2. Each certificate is signed by the next one and is currently valid
//! 3. The last certificate matches a pinned root SHA-256 fingerprint
//! 4. Leaf and intermediate carry Apple's marker extensions
//! 5. The JWS signature verifies against the leaf public key

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use x509_parser::certificate::X509Certificate;
use x509_parser::parse_x509_certificate;

use crate::ports::StoreError;

/// SHA-256 fingerprint of Apple Root CA - G3.
pub const APPLE_ROOT_CA_G3_FINGERPRINT: &str =
    "63343abfb89a6a03ebb57e9b3f5fa7be7c4f5c756f3017b3a8c488c3653e9179";

/// Marker extension on App Store receipt signing leaf certificates.
const LEAF_MARKER_OID: &str = "1.2.840.113635.100.6.11.1";

/// Marker extension on the Apple WWDR intermediate.
const INTERMEDIATE_MARKER_OID: &str = "1.2.840.113635.100.6.2.1";

/// How strictly JWS values are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    /// Full chain and signature verification.
    Verify,
    /// Decode the payload without any verification. Never for production.
    InsecureDecodeOnly,
}

/// Verifier for App Store signed payloads.
#[derive(Debug, Clone)]
pub struct AppleJwsVerifier {
    mode: VerificationMode,
    root_fingerprints: Vec<String>,
}

impl AppleJwsVerifier {
    /// Verifier pinned to Apple Root CA - G3.
    pub fn new() -> Self {
        Self::with_root_fingerprints(vec![APPLE_ROOT_CA_G3_FINGERPRINT.to_string()])
    }

    /// Verifier pinned to the given root fingerprints (hex, colons allowed).
    pub fn with_root_fingerprints(fingerprints: Vec<String>) -> Self {
        Self {
            mode: VerificationMode::Verify,
            root_fingerprints: fingerprints
                .into_iter()
                .map(|f| normalize_fingerprint(&f))
                .collect(),
        }
    }

    /// Decoder that skips all verification.
    pub fn insecure_decode_only() -> Self {
        Self {
            mode: VerificationMode::InsecureDecodeOnly,
            root_fingerprints: Vec::new(),
        }
    }

    pub fn mode(&self) -> VerificationMode {
        self.mode
    }

    /// Verify a JWS and deserialize its payload.
    pub fn verify<T: DeserializeOwned>(&self, jws: &str) -> Result<T, StoreError> {
        let jws = jws.trim();
        if jws.split('.').count() != 3 {
            return Err(StoreError::MalformedPayload(
                "JWS must have three segments".to_string(),
            ));
        }

        match self.mode {
            VerificationMode::InsecureDecodeOnly => {
                tracing::warn!("Decoding App Store JWS without signature verification");
                decode_payload_unverified(jws)
            }
            VerificationMode::Verify => self.verify_chain_and_decode(jws),
        }
    }

    /// Verify a JWS and return its payload as JSON.
    pub fn verify_value(&self, jws: &str) -> Result<serde_json::Value, StoreError> {
        self.verify(jws)
    }

    fn verify_chain_and_decode<T: DeserializeOwned>(&self, jws: &str) -> Result<T, StoreError> {
        let header = decode_header(jws)
            .map_err(|e| StoreError::MalformedPayload(format!("Invalid JWS header: {}", e)))?;

        if header.alg != Algorithm::ES256 {
            tracing::warn!(alg = ?header.alg, "App Store JWS with unexpected algorithm");
            return Err(StoreError::InvalidSignature(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }

        let chain_b64 = header
            .x5c
            .ok_or_else(|| StoreError::InvalidSignature("missing x5c header".to_string()))?;
        if chain_b64.len() < 3 {
            return Err(StoreError::InvalidSignature(format!(
                "x5c chain has {} certificates, expected 3",
                chain_b64.len()
            )));
        }

        let ders = chain_b64
            .iter()
            .map(|c| STANDARD.decode(c))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::MalformedPayload(format!("Invalid x5c encoding: {}", e)))?;

        let root_der = ders
            .last()
            .ok_or_else(|| StoreError::InvalidSignature("empty x5c chain".to_string()))?;
        let root_fingerprint = hex::encode(Sha256::digest(root_der));
        if !self.root_fingerprints.iter().any(|f| *f == root_fingerprint) {
            tracing::warn!(
                fingerprint = %root_fingerprint,
                "App Store JWS chain ends in an unpinned root"
            );
            return Err(StoreError::InvalidSignature(
                "root certificate is not trusted".to_string(),
            ));
        }

        let certs = ders
            .iter()
            .map(|der| {
                parse_x509_certificate(der)
                    .map(|(_, cert)| cert)
                    .map_err(|e| StoreError::InvalidSignature(format!("Invalid certificate: {}", e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (position, pair) in certs.windows(2).enumerate() {
            let (child, issuer) = (&pair[0], &pair[1]);
            child.verify_signature(Some(issuer.public_key())).map_err(|_| {
                tracing::warn!(position, "App Store certificate chain signature mismatch");
                StoreError::InvalidSignature(format!(
                    "certificate {} is not signed by its issuer",
                    position
                ))
            })?;
        }
        for cert in &certs {
            if !cert.validity().is_valid() {
                return Err(StoreError::InvalidSignature(
                    "certificate outside its validity period".to_string(),
                ));
            }
        }

        if !has_extension(&certs[0], LEAF_MARKER_OID) {
            return Err(StoreError::InvalidSignature(
                "leaf certificate lacks App Store marker".to_string(),
            ));
        }
        if !has_extension(&certs[1], INTERMEDIATE_MARKER_OID) {
            return Err(StoreError::InvalidSignature(
                "intermediate certificate lacks Apple WWDR marker".to_string(),
            ));
        }

        let leaf_key =
            DecodingKey::from_ec_der(&certs[0].public_key().subject_public_key.data);

        let mut validation = Validation::new(Algorithm::ES256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        decode::<T>(jws, &leaf_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::Json(_) => {
                    StoreError::MalformedPayload(format!("Invalid JWS payload: {}", e))
                }
                _ => {
                    tracing::warn!(error = %e, "App Store JWS signature verification failed");
                    StoreError::InvalidSignature(e.to_string())
                }
            })
    }
}

impl Default for AppleJwsVerifier {
    fn default() -> Self {
        Self::new()
    }
}

fn has_extension(cert: &X509Certificate<'_>, oid: &str) -> bool {
    cert.extensions()
        .iter()
        .any(|ext| ext.oid.to_id_string() == oid)
}

fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn decode_payload_unverified<T: DeserializeOwned>(jws: &str) -> Result<T, StoreError> {
    let payload = jws
        .split('.')
        .nth(1)
        .ok_or_else(|| StoreError::MalformedPayload("missing JWS payload".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| StoreError::MalformedPayload(format!("Invalid base64 payload: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::MalformedPayload(format!("Invalid JSON payload: {}", e)))
}

/// Builds an unsigned compact JWS around a JSON payload.
///
/// Only decodes under [`VerificationMode::InsecureDecodeOnly`].
pub fn unsigned_jws(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.", header, body)
}
