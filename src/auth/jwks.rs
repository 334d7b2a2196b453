// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Refresh
//!
//! - The key set is fetched once when the manager is built. A failed fetch
//!   is logged and the set starts empty.
//! - A background task refetches every 10 minutes until shutdown.
//! - A token naming an unknown `kid` triggers an inline refetch, limited to
//!   a burst of 5 and one more every 5 minutes.
//!
//! ## Key filtering
//!
//! Only keys that carry a `kid` and whose `use` is absent or `sig` are
//! published. Keys the JWK parser rejects are skipped.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{decode_header, DecodingKey};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::claims::ExpectedClaims;
use super::error::{ConfigError, ValidationError};
use super::key_manager::{verify_signed, KeyManager};

/// Interval between background refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

/// HTTP timeout for JWKS requests.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Unknown-kid refreshes allowed back to back.
const UNKNOWN_KID_BURST: NonZeroU32 = match NonZeroU32::new(5) {
    Some(n) => n,
    None => NonZeroU32::MIN,
};

/// Replenishment period for unknown-kid refreshes.
const UNKNOWN_KID_PERIOD: Duration = Duration::from_secs(300);

/// Published keys.
struct CacheEntry {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

/// JWKS manager with caching.
#[derive(Clone)]
pub struct JwksManager {
    /// JWKS endpoint
    jwks_url: String,
    /// Published key set, replaced wholesale on refresh
    cache: Arc<RwLock<Option<CacheEntry>>>,
    /// Limits refreshes triggered by unknown kids
    limiter: Arc<DefaultDirectRateLimiter>,
    /// HTTP client
    client: reqwest::Client,
}

impl std::fmt::Debug for JwksManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksManager")
            .field("jwks_url", &self.jwks_url)
            .finish_non_exhaustive()
    }
}

impl JwksManager {
    /// Create a new JWKS manager. Nothing is fetched yet.
    pub fn new(jwks_url: impl Into<String>) -> Result<Self, ConfigError> {
        let jwks_url = jwks_url.into();
        url::Url::parse(&jwks_url).map_err(|source| ConfigError::InvalidUrl {
            url: jwks_url.clone(),
            source,
        })?;

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(ConfigError::HttpClient)?;

        let quota = Quota::with_period(UNKNOWN_KID_PERIOD)
            .unwrap_or_else(|| Quota::per_hour(NonZeroU32::MIN))
            .allow_burst(UNKNOWN_KID_BURST);

        Ok(Self {
            jwks_url,
            cache: Arc::new(RwLock::new(None)),
            limiter: Arc::new(RateLimiter::direct(quota)),
            client,
        })
    }

    /// Get the JWKS URL.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Fetch the key set from the endpoint.
    async fn fetch_keys(&self) -> Result<HashMap<String, DecodingKey>, ValidationError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| ValidationError::JwksFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ValidationError::JwksFetch(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| ValidationError::JwksFetch(e.to_string()))?;

        Ok(parse_key_set(&document))
    }

    /// Force refresh the published key set.
    pub async fn refresh(&self) -> Result<usize, ValidationError> {
        let keys = self.fetch_keys().await?;
        let count = keys.len();
        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            keys,
            fetched_at: Instant::now(),
        });
        Ok(count)
    }

    /// Whether a key set has been fetched at least once.
    pub async fn is_cached(&self) -> bool {
        self.cache.read().await.is_some()
    }

    /// Time since the last successful refresh.
    pub async fn age(&self) -> Option<Duration> {
        self.cache
            .read()
            .await
            .as_ref()
            .map(|entry| entry.fetched_at.elapsed())
    }

    async fn lookup(&self, kid: &str) -> Option<DecodingKey> {
        self.cache
            .read()
            .await
            .as_ref()
            .and_then(|entry| entry.keys.get(kid).cloned())
    }

    /// Get the decoding key for a key ID, refetching once on a miss when the
    /// rate limiter allows it.
    pub async fn get_decoding_key(&self, kid: &str) -> Result<DecodingKey, ValidationError> {
        if let Some(key) = self.lookup(kid).await {
            return Ok(key);
        }

        if self.limiter.check().is_err() {
            let age = self.age().await;
            debug!(kid, age = ?age, "unknown kid, refresh rate limited");
            return Err(ValidationError::NoMatchingKey(kid.to_string()));
        }

        debug!(kid, "unknown kid, refreshing JWKS");
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "JWKS refresh failed");
        }

        self.lookup(kid)
            .await
            .ok_or_else(|| ValidationError::NoMatchingKey(kid.to_string()))
    }

    /// All published keys (for tokens without kid).
    pub async fn decoding_keys(&self) -> Vec<DecodingKey> {
        self.cache
            .read()
            .await
            .as_ref()
            .map(|entry| entry.keys.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Refetch on `interval` until `shutdown` is cancelled.
    pub fn spawn_refresh(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move { manager.run_refresh(interval, shutdown).await })
    }

    async fn run_refresh(self, interval: Duration, shutdown: CancellationToken) {
        info!(
            interval_secs = interval.as_secs(),
            url = %self.jwks_url,
            "JWKS refresher starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {},
                _ = shutdown.cancelled() => {
                    info!("JWKS refresher shutting down");
                    return;
                }
            }

            match self.refresh().await {
                Ok(count) => debug!(count, "JWKS refreshed"),
                Err(e) => warn!(error = %e, "JWKS refresh failed"),
            }
        }
    }
}

/// Publishable keys from a JWKS document, by kid.
fn parse_key_set(document: &Value) -> HashMap<String, DecodingKey> {
    let Some(entries) = document.get("keys").and_then(Value::as_array) else {
        warn!("JWKS document has no keys array");
        return HashMap::new();
    };

    let mut keys = HashMap::new();
    for entry in entries {
        if let Some(usage) = entry.get("use").and_then(Value::as_str) {
            if usage != "sig" {
                debug!(usage, "skipping non-signature key");
                continue;
            }
        }

        let jwk: Jwk = match serde_json::from_value(entry.clone()) {
            Ok(jwk) => jwk,
            Err(e) => {
                debug!(error = %e, "skipping unparseable JWK");
                continue;
            }
        };

        let Some(kid) = jwk.common.key_id.clone() else {
            debug!("skipping JWK without kid");
            continue;
        };

        match DecodingKey::from_jwk(&jwk) {
            Ok(key) => {
                keys.insert(kid, key);
            }
            Err(e) => debug!(kid, error = %e, "skipping unusable JWK"),
        }
    }
    keys
}

/// Validates tokens against a remote key set.
#[derive(Debug)]
pub struct JwksKeyManager {
    manager: JwksManager,
    expected: ExpectedClaims,
}

impl JwksKeyManager {
    /// Fetch the key set and start the background refresher.
    pub async fn new(
        jwks_url: &str,
        expected: ExpectedClaims,
        shutdown: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let manager = JwksManager::new(jwks_url)?;
        match manager.refresh().await {
            Ok(count) => info!(count, "fetched JWKS"),
            Err(e) => warn!(error = %e, "initial JWKS fetch failed, starting with no keys"),
        }
        manager.spawn_refresh(DEFAULT_REFRESH_INTERVAL, shutdown);
        Ok(Self::from_manager(manager, expected))
    }

    /// Wrap an existing manager; no fetch, no background task.
    pub fn from_manager(manager: JwksManager, expected: ExpectedClaims) -> Self {
        Self { manager, expected }
    }

    pub fn manager(&self) -> &JwksManager {
        &self.manager
    }
}

impl KeyManager for JwksKeyManager {
    async fn validate(&self, token: &str) -> Result<(), ValidationError> {
        let header = decode_header(token)?;

        let claims = match header.kid {
            Some(kid) => {
                let key = self.manager.get_decoding_key(&kid).await?;
                verify_signed(token, &key)?
            }
            None => {
                let mut last_error = ValidationError::NoMatchingKey(String::new());
                let mut verified = None;
                for key in self.manager.decoding_keys().await {
                    match verify_signed(token, &key) {
                        Ok(claims) => {
                            verified = Some(claims);
                            break;
                        }
                        Err(e) => last_error = e,
                    }
                }
                verified.ok_or(last_error)?
            }
        };

        self.expected.validate(&claims)
    }
}
