// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token caching and renewal for egress mode.
//!
//! The manager keeps the most recent token and hands it out until its expiry
//! (minus an optional lead time) is reached. Refreshes are single-flight: the
//! state lock is held while the retriever runs, so concurrent callers wait for
//! and then share the new token.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::claims::{decode_unverified, ClaimValue};
use super::error::TokenError;
use super::retriever::TokenRetriever;

#[derive(Debug, Default)]
struct TokenState {
    cached: Option<String>,
    renew_after: DateTime<Utc>,
}

/// Caches tokens from a retriever and renews them on expiry.
#[derive(Debug)]
pub struct TokenManager<R> {
    retriever: R,
    renew_lead: Duration,
    state: Mutex<TokenState>,
}

impl<R: TokenRetriever> TokenManager<R> {
    pub fn new(retriever: R) -> Self {
        Self {
            retriever,
            renew_lead: Duration::zero(),
            state: Mutex::new(TokenState::default()),
        }
    }

    /// Renew this long before the token's `exp`.
    pub fn with_renew_lead(mut self, lead: Duration) -> Self {
        self.renew_lead = lead;
        self
    }

    pub fn retriever(&self) -> &R {
        &self.retriever
    }

    /// Current token for `audience`, refreshing it if needed.
    pub async fn token(&self, audience: &str) -> Result<String, TokenError> {
        self.token_at(audience, Utc::now()).await
    }

    /// Same as [`Self::token`] with an explicit clock.
    pub async fn token_at(&self, audience: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let mut state = self.state.lock().await;

        if let Some(token) = &state.cached {
            if now < state.renew_after {
                return Ok(token.clone());
            }
            debug!(renew_after = %state.renew_after, "cached token due for renewal");
        }

        let token = self.retriever.get_token(audience).await?;
        let renew_after = expiry(&token)?
            .checked_sub_signed(self.renew_lead)
            .ok_or(TokenError::RenewLeadOutOfRange)?;
        info!(%renew_after, "obtained new token");

        state.renew_after = renew_after;
        state.cached = Some(token.clone());
        Ok(token)
    }
}

/// Expiry of a freshly retrieved token. Only its shape is checked.
fn expiry(token: &str) -> Result<DateTime<Utc>, TokenError> {
    let claims = decode_unverified(token).map_err(TokenError::Parse)?;
    claims
        .require_oidc_claims()
        .map_err(TokenError::StandardClaims)?;

    match claims.get("exp") {
        Some(ClaimValue::Number(exp)) => {
            DateTime::from_timestamp(*exp as i64, 0).ok_or(TokenError::MissingExpiration)
        }
        _ => Err(TokenError::MissingExpiration),
    }
}
