// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Self-signed identity tokens.
//!
//! The proxy signs its own OIDC-shaped tokens with an operator-provided key.
//! Each token is valid for one hour from the moment it is minted.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use clap::Args;
use jsonwebtoken::{encode, Header};
use serde_json::Value;

use super::claims::{ClaimSet, RESERVED_CLAIMS};
use super::convert::literal_claims;
use super::error::{ConfigError, TokenError};
use super::keys::{detect_signing_key, SigningKey};
use super::retriever::TokenRetriever;

/// Lifetime of a minted token, in seconds.
const TOKEN_LIFETIME_SECS: i64 = 3600;

/// Manual (self-signed) token settings.
#[derive(Debug, Clone, Default, Args)]
pub struct ManualTokenConfig {
    /// Manual authentication issuer claim
    #[arg(
        long = "egress-auth-manual-issuer",
        env = "OIDC_PROXY_EGRESS_AUTH_MANUAL_ISSUER",
        default_value = ""
    )]
    pub issuer: String,

    /// Manual authentication subject claim
    #[arg(
        long = "egress-auth-manual-subject",
        env = "OIDC_PROXY_EGRESS_AUTH_MANUAL_SUBJECT",
        default_value = ""
    )]
    pub subject: String,

    /// Manual authentication signing key (PEM private key or secret)
    #[arg(
        id = "egress_auth_manual_signing_key",
        long = "egress-auth-manual-signing-key",
        env = "OIDC_PROXY_EGRESS_AUTH_MANUAL_SIGNING_KEY",
        default_value = "",
        hide_env_values = true
    )]
    pub key: String,

    /// Manual authentication signing method (e.g. RS256, HS256)
    #[arg(
        long = "egress-auth-manual-signing-method",
        env = "OIDC_PROXY_EGRESS_AUTH_MANUAL_SIGNING_METHOD",
        default_value = ""
    )]
    pub signing_method: String,

    /// Manual authentication additional claims (JSON or YAML map)
    #[arg(
        long = "egress-auth-manual-claims",
        env = "OIDC_PROXY_EGRESS_AUTH_MANUAL_CLAIMS",
        default_value = ""
    )]
    pub claims: String,
}

/// Mints and signs tokens locally.
pub struct ManualTokenRetriever {
    issuer: String,
    subject: String,
    signing: SigningKey,
    extra_claims: ClaimSet,
}

impl std::fmt::Debug for ManualTokenRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualTokenRetriever")
            .field("issuer", &self.issuer)
            .field("subject", &self.subject)
            .field("algorithm", &self.signing.algorithm)
            .field("extra_claims", &self.extra_claims.len())
            .finish()
    }
}

impl ManualTokenRetriever {
    pub fn configure(config: &ManualTokenConfig) -> Result<Self, ConfigError> {
        if config.key.is_empty() {
            return Err(ConfigError::Missing("key"));
        }
        if config.signing_method.is_empty() {
            return Err(ConfigError::Missing("signing method"));
        }
        if config.subject.is_empty() {
            return Err(ConfigError::Missing("subject"));
        }
        if config.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer"));
        }

        let signing = detect_signing_key(config.key.as_bytes(), &config.signing_method)?;

        let extra_claims = literal_claims(&config.claims)?;
        if let Some(reserved) = RESERVED_CLAIMS.iter().find(|name| extra_claims.contains(name)) {
            return Err(ConfigError::ReservedClaim(reserved.to_string()));
        }

        Ok(Self {
            issuer: config.issuer.clone(),
            subject: config.subject.clone(),
            signing,
            extra_claims,
        })
    }

    fn sign(&self, audience: &str) -> Result<String, TokenError> {
        let now = Utc::now();

        let mut payload: BTreeMap<String, Value> = self
            .extra_claims
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        payload.insert("iat".to_string(), now.timestamp().into());
        let exp = now + Duration::seconds(TOKEN_LIFETIME_SECS);
        payload.insert("exp".to_string(), exp.timestamp().into());
        payload.insert("aud".to_string(), audience.into());
        payload.insert("iss".to_string(), self.issuer.as_str().into());
        payload.insert("sub".to_string(), self.subject.as_str().into());

        encode(&Header::new(self.signing.algorithm), &payload, &self.signing.key)
            .map_err(TokenError::Signing)
    }
}

impl TokenRetriever for ManualTokenRetriever {
    async fn get_token(&self, audience: &str) -> Result<String, TokenError> {
        self.sign(audience)
    }
}
