// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request interception for Axum.
//!
//! The interceptor runs once per incoming request, before it is forwarded:
//!
//! - **Egress**: obtain a token for the configured audience and set
//!   `Authorization: Bearer <token>`. Failure answers `400`.
//! - **Ingress**: take the bearer token from the request and validate it.
//!   Failure answers `401`.
//!
//! Both paths return `Ok(())` to forward, or `Err(response)` carrying the
//! response to send back instead.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::claims::{ClaimValue, ExpectedClaims, ListClaimPolicy};
use super::error::{ConfigError, ValidationError};
use super::key_manager::{AnyKeyManager, KeyManager};
use super::manager::TokenManager;
use super::retriever::{Retriever, TokenRetriever};
use crate::config::{IngressConfig, Mode, ProxyConfig};
use crate::error::ProxyError;

/// Per-request authorization step.
#[derive(Debug)]
pub enum Interceptor {
    Egress {
        manager: TokenManager<Retriever>,
        audience: String,
    },
    Ingress {
        key_manager: AnyKeyManager,
        expose_errors: bool,
    },
}

impl Interceptor {
    /// Build the interceptor for the configured mode.
    ///
    /// `shutdown` stops background work (JWKS refresh) started here.
    pub async fn from_config(
        config: &ProxyConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, ConfigError> {
        match config.mode()? {
            Mode::Egress => {
                let retriever = Retriever::from_config(&config.egress.auth)?;
                let audience = config.audiences().into_iter().next().unwrap_or_default();
                let lead = config.egress.renew_lead()?;
                let manager = TokenManager::new(retriever).with_renew_lead(lead);
                info!(kind = manager.retriever().kind(), %audience, "egress mode");

                Ok(Interceptor::Egress { manager, audience })
            }
            Mode::Ingress => {
                let expected = ingress_expected_claims(&config.ingress, &config.audiences())?;
                let key_manager =
                    AnyKeyManager::from_config(&config.ingress, expected, shutdown).await?;
                info!(kind = key_manager.kind(), "ingress mode");

                Ok(Interceptor::Ingress {
                    key_manager,
                    expose_errors: !config.ingress.hide_errors,
                })
            }
        }
    }

    /// Authorize (egress: decorate) a request before it is forwarded.
    pub async fn intercept(&self, request: &mut Request) -> Result<(), Response> {
        match self {
            Interceptor::Egress { manager, audience } => {
                modify_request_authz(request.headers_mut(), manager, audience).await
            }
            Interceptor::Ingress {
                key_manager,
                expose_errors,
            } => validate_request_authz(request.headers(), key_manager, *expose_errors).await,
        }
    }
}

/// Build the expected claim set for ingress.
///
/// The audience comes from the audience setting only: a single audience is
/// matched exactly, several form an allow-list.
pub fn ingress_expected_claims(
    config: &IngressConfig,
    audiences: &[String],
) -> Result<ExpectedClaims, ConfigError> {
    let mut expected = ExpectedClaims::from_claim_map(&config.valid_claims)?;
    if expected.has_claim("aud") {
        return Err(ConfigError::Invalid(
            "audience claim must be specified in config, not in valid claims".to_string(),
        ));
    }

    match audiences {
        [] => return Err(ConfigError::Missing("audience")),
        [single] => expected.add_claim("aud", single.as_str()),
        many => expected.add_claim("aud", ClaimValue::StringList(many.to_vec())),
    }

    let policy = if config.exhaustive_claims {
        ListClaimPolicy::Exhaustive
    } else {
        ListClaimPolicy::StopAtFirstList
    };
    Ok(expected.with_list_policy(policy))
}

/// Egress: stamp a bearer token onto the request headers.
pub async fn modify_request_authz<R: TokenRetriever>(
    headers: &mut HeaderMap,
    manager: &TokenManager<R>,
    audience: &str,
) -> Result<(), Response> {
    let token = manager
        .token(audience)
        .await
        .map_err(|e| {
            ProxyError::bad_request(format!("error obtaining token: {e}")).into_response()
        })?;

    let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
        ProxyError::bad_request("error obtaining token: token is not a valid header value")
            .into_response()
    })?;
    headers.insert(AUTHORIZATION, value);
    Ok(())
}

/// Ingress: validate the bearer token carried by the request.
pub async fn validate_request_authz<K: KeyManager>(
    headers: &HeaderMap,
    key_manager: &K,
    expose_errors: bool,
) -> Result<(), Response> {
    let token = match bearer_token(headers) {
        Ok(token) => token,
        Err(e) => {
            debug!(error = %e, "rejecting request");
            return Err(ProxyError::unauthorized("").into_response());
        }
    };

    if let Err(e) = key_manager.validate(token).await {
        debug!(error = %e, "token failed validation");
        let message = if expose_errors { e.to_string() } else { String::new() };
        return Err(ProxyError::unauthorized(message).into_response());
    }

    Ok(())
}

/// The token part of `Authorization: Bearer <token>`.
///
/// The header is split on spaces: the first field must be the `Bearer`
/// scheme (any case) and the second field is the token.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ValidationError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(ValidationError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| ValidationError::InvalidAuthHeader)?;

    if value.is_empty() {
        return Err(ValidationError::MissingAuthHeader);
    }

    let mut fields = value.split(' ');
    if !fields
        .next()
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("bearer"))
    {
        return Err(ValidationError::InvalidAuthHeader);
    }

    match fields.next() {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(ValidationError::InvalidAuthHeader),
    }
}

/// Middleware running the interceptor ahead of the forwarding handler.
pub async fn authorize(
    State(interceptor): State<Arc<Interceptor>>,
    mut request: Request,
    next: Next,
) -> Response {
    match interceptor.intercept(&mut request).await {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}
