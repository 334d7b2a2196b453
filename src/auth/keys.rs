// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key detection for operator-supplied key material.
//!
//! Operators pass keys as plain strings (flags or env vars), so the key type
//! is inferred from the content:
//!
//! - Validating keys: PEM public keys (RSA, EC, Ed25519), otherwise a
//!   symmetric secret (base64-decoded when possible, raw otherwise).
//! - Signing keys: restricted to the family of the configured signing method.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use tracing::info;

use super::error::ConfigError;

/// A key used to verify token signatures.
#[derive(Clone)]
pub enum ValidatingKey {
    Rsa(DecodingKey),
    Ec(DecodingKey),
    Ed(DecodingKey),
    Secret(Vec<u8>),
}

impl ValidatingKey {
    pub fn decoding_key(&self) -> DecodingKey {
        match self {
            ValidatingKey::Rsa(key) | ValidatingKey::Ec(key) | ValidatingKey::Ed(key) => {
                key.clone()
            }
            ValidatingKey::Secret(secret) => DecodingKey::from_secret(secret),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ValidatingKey::Rsa(_) => "rsa public key",
            ValidatingKey::Ec(_) => "ec public key",
            ValidatingKey::Ed(_) => "ed25519 public key",
            ValidatingKey::Secret(_) => "symmetric secret",
        }
    }
}

impl fmt::Debug for ValidatingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        f.debug_tuple("ValidatingKey").field(&self.kind()).finish()
    }
}

/// Infer the validating key type from raw key material. Never fails: anything
/// that is not a recognised PEM public key is treated as a secret.
pub fn detect_validating_key(raw: &[u8]) -> ValidatingKey {
    if let Ok(key) = DecodingKey::from_rsa_pem(raw) {
        info!("detected RSA public key");
        return ValidatingKey::Rsa(key);
    }

    if let Ok(key) = DecodingKey::from_ec_pem(raw) {
        info!("detected EC public key");
        return ValidatingKey::Ec(key);
    }

    if let Ok(key) = DecodingKey::from_ed_pem(raw) {
        info!("detected Ed25519 public key");
        return ValidatingKey::Ed(key);
    }

    if let Ok(secret) = STANDARD.decode(raw) {
        info!("detected base64-encoded symmetric key");
        return ValidatingKey::Secret(secret);
    }

    info!("detected raw symmetric key");
    ValidatingKey::Secret(raw.to_vec())
}

/// A private key bound to the algorithm it signs with.
#[derive(Clone)]
pub struct SigningKey {
    pub algorithm: Algorithm,
    pub key: EncodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Resolve a signing method name, case-insensitively.
pub fn parse_signing_method(method: &str) -> Result<Algorithm, ConfigError> {
    let upper = method.trim().to_uppercase();
    if upper == "EDDSA" {
        return Ok(Algorithm::EdDSA);
    }
    Algorithm::from_str(&upper).map_err(|_| ConfigError::UnknownSigningMethod(method.to_string()))
}

/// Load a private key for the given signing method.
pub fn detect_signing_key(raw: &[u8], method: &str) -> Result<SigningKey, ConfigError> {
    let algorithm = parse_signing_method(method)?;
    let invalid = |source| ConfigError::InvalidSigningKey {
        method: format!("{algorithm:?}"),
        source,
    };

    let key = match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => match STANDARD.decode(raw) {
            Ok(secret) => {
                info!("detected base64-encoded symmetric key");
                EncodingKey::from_secret(&secret)
            }
            Err(_) => {
                info!("detected raw symmetric key");
                EncodingKey::from_secret(raw)
            }
        },
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => {
            let key = EncodingKey::from_rsa_pem(raw).map_err(invalid)?;
            info!("detected RSA private key");
            key
        }
        Algorithm::ES256 | Algorithm::ES384 => {
            let key = EncodingKey::from_ec_pem(raw).map_err(invalid)?;
            info!("detected EC private key");
            key
        }
        Algorithm::EdDSA => {
            let key = EncodingKey::from_ed_pem(raw).map_err(invalid)?;
            info!("detected Ed25519 private key");
            key
        }
        #[allow(unreachable_patterns)]
        other => return Err(ConfigError::UnsupportedSigningKey(format!("{other:?}"))),
    };

    Ok(SigningKey { algorithm, key })
}
