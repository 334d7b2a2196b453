// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! GCP instance identity tokens from the metadata service.

use std::time::Duration;

use clap::Args;
use reqwest::StatusCode;
use tracing::debug;

use super::error::{ConfigError, TokenError};
use super::retriever::TokenRetriever;

/// Metadata server reachable from any GCE/GKE/Cloud Run workload.
const DEFAULT_METADATA_BASE_URL: &str = "http://metadata";

const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// GCP metadata token settings.
#[derive(Debug, Clone, Args)]
pub struct GcpTokenConfig {
    /// GCP instance identity name
    #[arg(
        long = "egress-auth-gcp-service-account",
        env = "OIDC_PROXY_EGRESS_AUTH_GCP_SERVICE_ACCOUNT",
        default_value = "default"
    )]
    pub service_account: String,
}

impl Default for GcpTokenConfig {
    fn default() -> Self {
        Self {
            service_account: "default".to_string(),
        }
    }
}

/// Fetches identity tokens for the instance's service account.
#[derive(Debug, Clone)]
pub struct GcpTokenRetriever {
    service_account: String,
    metadata_base_url: String,
    client: reqwest::Client,
}

impl GcpTokenRetriever {
    pub fn configure(config: &GcpTokenConfig) -> Result<Self, ConfigError> {
        if config.service_account.is_empty() {
            return Err(ConfigError::Missing("GCP service account name"));
        }

        let client = reqwest::Client::builder()
            .timeout(METADATA_TIMEOUT)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            service_account: config.service_account.clone(),
            metadata_base_url: DEFAULT_METADATA_BASE_URL.to_string(),
            client,
        })
    }

    /// Point the retriever at a different metadata server.
    pub fn with_metadata_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.metadata_base_url = base_url.into();
        self
    }

    fn identity_url(&self) -> String {
        format!(
            "{}/computeMetadata/v1/instance/service-accounts/{}/identity",
            self.metadata_base_url.trim_end_matches('/'),
            self.service_account
        )
    }
}

impl TokenRetriever for GcpTokenRetriever {
    async fn get_token(&self, audience: &str) -> Result<String, TokenError> {
        let url = self.identity_url();
        debug!(%url, audience, "requesting identity token from metadata server");

        let response = self
            .client
            .get(&url)
            .query(&[("audience", audience)])
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(TokenError::Fetch)?;

        let status = response.status();
        let body = response.text().await.map_err(TokenError::Read)?;

        if status != StatusCode::OK {
            return Err(TokenError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}
