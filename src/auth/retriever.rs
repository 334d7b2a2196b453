// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token retrievers for egress mode.
//!
//! A retriever produces a fresh identity token for an audience. Caching and
//! renewal live in [`super::manager::TokenManager`]; retrievers are stateless
//! once constructed.

use std::future::Future;

use clap::Args;

use super::error::{ConfigError, TokenError};
use super::gcp::GcpTokenRetriever;
use super::manual::ManualTokenRetriever;
use crate::config::EgressAuthConfig;

/// Source of identity tokens.
pub trait TokenRetriever: Send + Sync {
    /// Obtain a token for `audience`.
    fn get_token(&self, audience: &str) -> impl Future<Output = Result<String, TokenError>> + Send;
}

/// Static token settings.
#[derive(Debug, Clone, Default, Args)]
pub struct StaticTokenConfig {
    /// Static authentication identity token
    #[arg(
        id = "egress_auth_static_token",
        long = "egress-auth-static-token",
        env = "OIDC_PROXY_EGRESS_AUTH_STATIC_TOKEN",
        default_value = "",
        hide_env_values = true
    )]
    pub token: String,
}

/// Returns the same operator-provided token forever.
#[derive(Debug, Clone)]
pub struct StaticTokenRetriever {
    token: String,
}

impl StaticTokenRetriever {
    pub fn configure(config: &StaticTokenConfig) -> Result<Self, ConfigError> {
        if config.token.is_empty() {
            return Err(ConfigError::Missing("static JWT token"));
        }
        Ok(Self {
            token: config.token.clone(),
        })
    }
}

impl TokenRetriever for StaticTokenRetriever {
    async fn get_token(&self, _audience: &str) -> Result<String, TokenError> {
        Ok(self.token.clone())
    }
}

/// Retriever selected by the egress auth type.
#[derive(Debug)]
pub enum Retriever {
    Static(StaticTokenRetriever),
    Manual(ManualTokenRetriever),
    Gcp(GcpTokenRetriever),
}

impl Retriever {
    /// Build the retriever named by `config.auth_type`.
    pub fn from_config(config: &EgressAuthConfig) -> Result<Self, ConfigError> {
        match config.auth_type.as_str() {
            "static" => Ok(Retriever::Static(StaticTokenRetriever::configure(
                &config.static_auth,
            )?)),
            "manual" => Ok(Retriever::Manual(ManualTokenRetriever::configure(
                &config.manual,
            )?)),
            "gcp" => Ok(Retriever::Gcp(GcpTokenRetriever::configure(&config.gcp)?)),
            other => Err(ConfigError::UnknownAuthType(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Retriever::Static(_) => "static",
            Retriever::Manual(_) => "manual",
            Retriever::Gcp(_) => "gcp",
        }
    }
}

impl TokenRetriever for Retriever {
    async fn get_token(&self, audience: &str) -> Result<String, TokenError> {
        match self {
            Retriever::Static(r) => r.get_token(audience).await,
            Retriever::Manual(r) => r.get_token(audience).await,
            Retriever::Gcp(r) => r.get_token(audience).await,
        }
    }
}
