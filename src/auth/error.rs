// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Three tiers, matching when they can occur:
//!
//! - [`ConfigError`]: raised while building retrievers, key managers and
//!   expected claims at startup. Never retried; startup aborts.
//! - [`TokenError`]: raised while acquiring a token in egress mode. Surfaced
//!   to the caller as `400`.
//! - [`ValidationError`]: raised while checking a presented token in ingress
//!   mode. Surfaced to the caller as `401`.

/// Configuration-time failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Missing(&'static str),

    #[error("unknown signing method was specified: {0}")]
    UnknownSigningMethod(String),

    #[error("no appropriate key detected for signing method {0}")]
    UnsupportedSigningKey(String),

    #[error("unable to parse signing key for {method}: {source}")]
    InvalidSigningKey {
        method: String,
        #[source]
        source: jsonwebtoken::errors::Error,
    },

    #[error("reserved claim must be specified in config: {0}")]
    ReservedClaim(String),

    #[error("unable to decode claim map")]
    ClaimMap,

    #[error("unsupported type for claim key: {0}")]
    UnsupportedClaimType(String),

    #[error("unable to compile regular expression for claim {claim}: {source}")]
    InvalidPattern {
        claim: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown egress auth type: {0:?}")]
    UnknownAuthType(String),

    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Failure while acquiring a token for egress.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to fetch token: {0}")]
    Fetch(#[source] reqwest::Error),

    #[error("failed to read token response: {0}")]
    Read(#[source] reqwest::Error),

    #[error("unsuccessful status code while fetching token: {status}, {body}")]
    Status { status: u16, body: String },

    #[error("unable to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("unable to parse JWT: {0}")]
    Parse(#[source] jsonwebtoken::errors::Error),

    #[error("unable to get standard JWT token claims: {0}")]
    StandardClaims(#[source] ValidationError),

    #[error("unable to access token expiration")]
    MissingExpiration,

    #[error("renew lead is out of range for the token expiration")]
    RenewLeadOutOfRange,
}

/// Failure while validating a presented token.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("authorization header is required")]
    MissingAuthHeader,

    #[error("invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,

    #[error("{0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("{0} claim was missing from ID token")]
    MissingRequiredClaim(&'static str),

    #[error("internal error: audience claim was missing from expected claims")]
    MissingExpectedAudience,

    #[error("request is missing claim: {0}")]
    MissingClaim(String),

    #[error("claim must be a string: {0}")]
    ClaimNotString(String),

    #[error("claim was not valid: {0}")]
    InvalidClaim(String),

    #[error("audience is not allowed: {0}")]
    AudienceNotAllowed(String),

    #[error("claim may not be a list: {0}")]
    ListNotAllowed(String),

    #[error("claim did not match expected type: {0}")]
    TypeMismatch(String),

    #[error("claim did not match expected value: {0}")]
    ValueMismatch(String),

    #[error("static token did not match")]
    TokenMismatch,

    #[error("no matching key found in JWKS for kid {0:?}")]
    NoMatchingKey(String),

    #[error("failed to fetch JWKS: {0}")]
    JwksFetch(String),
}
