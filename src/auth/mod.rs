// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Token lifecycle (egress) and token validation (ingress) for the proxy.
//!
//! ## Egress Flow
//!
//! 1. A [`Retriever`] is chosen from the configured auth type
//!    (`static`, `manual` or `gcp`)
//! 2. [`TokenManager`] caches its token until `exp` (minus the renew lead)
//! 3. [`Interceptor`] stamps `Authorization: Bearer <token>` on each request
//!
//! ## Ingress Flow
//!
//! 1. An [`AnyKeyManager`] is chosen: JWKS URL, then validating key, then
//!    static token
//! 2. [`Interceptor`] extracts the bearer token and asks the key manager
//! 3. The key manager checks authenticity, then [`ExpectedClaims`] checks
//!    the claims
//!
//! ## Security
//!
//! - Signature algorithms come from the token header but must match the
//!   key family
//! - `exp` is enforced with a 60 second leeway
//! - Claim patterns match whole values only

pub mod claims;
pub mod convert;
pub mod error;
pub mod gcp;
pub mod jwks;
pub mod key_manager;
pub mod keys;
pub mod manager;
pub mod manual;
pub mod middleware;
pub mod retriever;

#[cfg(test)]
pub(crate) mod test_support;

pub use claims::{ClaimSet, ClaimValue, ExpectedClaims, ListClaimPolicy};
pub use error::{ConfigError, TokenError, ValidationError};
pub use key_manager::{AnyKeyManager, KeyManager};
pub use manager::TokenManager;
pub use middleware::Interceptor;
pub use retriever::{Retriever, TokenRetriever};
