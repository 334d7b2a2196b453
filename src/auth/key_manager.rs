// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token validation for ingress mode.
//!
//! A key manager decides whether a presented token is authentic and then
//! hands its claims to [`ExpectedClaims::validate`]. Three strategies exist:
//!
//! - **Static**: the token must equal a configured token exactly.
//! - **Manual**: the signature must verify with one configured key.
//! - **JWKS**: the signature must verify with a key from a remote key set
//!   (see [`super::jwks`]).

use std::collections::{HashMap, HashSet};
use std::future::Future;

use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::claims::{decode_unverified, ClaimSet, ExpectedClaims};
use super::error::{ConfigError, ValidationError};
use super::jwks::JwksKeyManager;
use super::keys::{detect_validating_key, ValidatingKey};
use crate::config::IngressConfig;

/// Validates presented tokens.
pub trait KeyManager: Send + Sync {
    fn validate(&self, token: &str) -> impl Future<Output = Result<(), ValidationError>> + Send;
}

/// Verify the signature (and `exp`, when present) and return the claims.
///
/// The algorithm comes from the token header; a header algorithm from a
/// different family than `key` is rejected. Audience is left to the claim
/// validator.
pub(crate) fn verify_signed(token: &str, key: &DecodingKey) -> Result<ClaimSet, ValidationError> {
    let header = decode_header(token)?;
    let mut validation = Validation::new(header.alg);
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let data = decode::<HashMap<String, Value>>(token, key, &validation)?;
    Ok(ClaimSet::from_json_map(data.claims))
}

/// Accepts exactly one pre-shared token.
#[derive(Debug, Clone)]
pub struct StaticKeyManager {
    token: String,
    expected: ExpectedClaims,
}

impl StaticKeyManager {
    pub fn new(token: impl Into<String>, expected: ExpectedClaims) -> Self {
        Self {
            token: token.into(),
            expected,
        }
    }
}

impl KeyManager for StaticKeyManager {
    async fn validate(&self, token: &str) -> Result<(), ValidationError> {
        if token != self.token {
            return Err(ValidationError::TokenMismatch);
        }
        let claims = decode_unverified(token)?;
        self.expected.validate(&claims)
    }
}

/// Verifies signatures with a single operator-supplied key.
#[derive(Debug, Clone)]
pub struct ManualKeyManager {
    key: ValidatingKey,
    expected: ExpectedClaims,
}

impl ManualKeyManager {
    pub fn new(key: ValidatingKey, expected: ExpectedClaims) -> Self {
        Self { key, expected }
    }
}

impl KeyManager for ManualKeyManager {
    async fn validate(&self, token: &str) -> Result<(), ValidationError> {
        let claims = verify_signed(token, &self.key.decoding_key())?;
        self.expected.validate(&claims)
    }
}

/// Key manager selected from ingress configuration.
#[derive(Debug)]
pub enum AnyKeyManager {
    Static(StaticKeyManager),
    Manual(ManualKeyManager),
    Jwks(JwksKeyManager),
}

impl AnyKeyManager {
    /// Pick the first configured source: JWKS URL, then validating key, then
    /// static token.
    pub async fn from_config(
        config: &IngressConfig,
        expected: ExpectedClaims,
        shutdown: CancellationToken,
    ) -> Result<Self, ConfigError> {
        if !config.jwks_url.is_empty() {
            info!(url = %config.jwks_url, "validating tokens against JWKS");
            let manager = JwksKeyManager::new(&config.jwks_url, expected, shutdown).await?;
            return Ok(AnyKeyManager::Jwks(manager));
        }

        if !config.validating_key.is_empty() {
            let key = detect_validating_key(config.validating_key.as_bytes());
            info!(kind = key.kind(), "validating tokens against configured key");
            return Ok(AnyKeyManager::Manual(ManualKeyManager::new(key, expected)));
        }

        if !config.static_token.is_empty() {
            info!("validating tokens against static token");
            return Ok(AnyKeyManager::Static(StaticKeyManager::new(
                config.static_token.clone(),
                expected,
            )));
        }

        Err(ConfigError::Invalid(
            "ingress requires a JWKS URL, a validating key or a static token".to_string(),
        ))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnyKeyManager::Static(_) => "static",
            AnyKeyManager::Manual(_) => "manual",
            AnyKeyManager::Jwks(_) => "jwks",
        }
    }
}

impl KeyManager for AnyKeyManager {
    async fn validate(&self, token: &str) -> Result<(), ValidationError> {
        match self {
            AnyKeyManager::Static(m) => m.validate(token).await,
            AnyKeyManager::Manual(m) => m.validate(token).await,
            AnyKeyManager::Jwks(m) => m.validate(token).await,
        }
    }
}
