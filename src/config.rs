// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Every setting is a command-line flag with a matching environment variable.
//! The configuration is parsed once in `main` and passed down by reference.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `OIDC_PROXY_TARGET_URL` | Target URL for incoming requests | Required |
//! | `OIDC_PROXY_AUDIENCE` | Audience (single value, JSON or YAML list) | Required unless egress static |
//! | `OIDC_PROXY_PORT` | Port to listen for requests | `8080` |
//! | `OIDC_PROXY_ADDRESS` | Address to listen for requests | `127.0.0.1` |
//! | `OIDC_PROXY_TLS_*` | Listener TLS and target verification | off |
//! | `OIDC_PROXY_EGRESS_*` | Egress mode and token source | off |
//! | `OIDC_PROXY_INGRESS_*` | Ingress mode and token validation | off |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;

use chrono::Duration;
use clap::{Args, Parser};
use tracing::warn;
use url::Url;

use crate::auth::convert::parse_audiences;
use crate::auth::error::ConfigError;
use crate::auth::gcp::GcpTokenConfig;
use crate::auth::manual::ManualTokenConfig;
use crate::auth::retriever::StaticTokenConfig;

/// Environment variable selecting the log format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Largest accepted renew lead: one hour, the lifetime of a self-signed token.
pub const MAX_RENEW_LEAD_SECS: u64 = 3600;

/// Top-level proxy configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "oidc-proxy", version, about = "OIDC identity proxy", long_about = None)]
pub struct ProxyConfig {
    /// Target URL for incoming requests
    #[arg(long, env = "OIDC_PROXY_TARGET_URL", default_value = "")]
    pub target_url: String,

    /// Audience claim for token
    #[arg(long, env = "OIDC_PROXY_AUDIENCE", default_value = "")]
    pub audience: String,

    /// Port to listen for requests
    #[arg(long, env = "OIDC_PROXY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Address to listen for requests
    #[arg(long, env = "OIDC_PROXY_ADDRESS", default_value = "127.0.0.1")]
    pub address: String,

    #[command(flatten)]
    pub tls: TlsConfig,

    #[command(flatten)]
    pub egress: EgressConfig,

    #[command(flatten)]
    pub ingress: IngressConfig,
}

/// Listener TLS and outbound target verification.
#[derive(Debug, Clone, Default, Args)]
pub struct TlsConfig {
    /// Listen for requests using TLS
    #[arg(long = "tls-listen-enabled", env = "OIDC_PROXY_TLS_LISTEN_ENABLED")]
    pub listen_enabled: bool,

    /// Path to TLS public certificate (PEM format)
    #[arg(long = "tls-cert", env = "OIDC_PROXY_TLS_CERT", default_value = "")]
    pub cert: String,

    /// Path to TLS private key (PEM format)
    #[arg(id = "tls_key", long = "tls-key", env = "OIDC_PROXY_TLS_KEY", default_value = "")]
    pub key: String,

    /// Do not verify TLS for the target
    #[arg(long = "tls-allow-insecure-target", env = "OIDC_PROXY_TLS_ALLOW_INSECURE_TARGET")]
    pub allow_insecure_target: bool,
}

/// Egress mode: attach a token to forwarded requests.
#[derive(Debug, Clone, Default, Args)]
pub struct EgressConfig {
    /// Enable egress mode
    #[arg(id = "egress_enabled", long = "egress-enabled", env = "OIDC_PROXY_EGRESS_ENABLED")]
    pub enabled: bool,

    /// Renew cached tokens this many seconds before they expire
    #[arg(
        long = "egress-renew-lead-secs",
        env = "OIDC_PROXY_EGRESS_RENEW_LEAD_SECS",
        default_value_t = 0
    )]
    pub renew_lead_secs: u64,

    #[command(flatten)]
    pub auth: EgressAuthConfig,
}

impl EgressConfig {
    /// The renew lead, at most [`MAX_RENEW_LEAD_SECS`].
    pub fn renew_lead(&self) -> Result<Duration, ConfigError> {
        if self.renew_lead_secs > MAX_RENEW_LEAD_SECS {
            return Err(ConfigError::Invalid(format!(
                "renew lead must be at most {MAX_RENEW_LEAD_SECS} seconds, got {}",
                self.renew_lead_secs
            )));
        }
        i64::try_from(self.renew_lead_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| ConfigError::Invalid("renew lead is out of range".to_string()))
    }
}

/// Token source for egress mode.
#[derive(Debug, Clone, Default, Args)]
pub struct EgressAuthConfig {
    /// Authentication type for egress mode (static, manual, gcp)
    #[arg(long = "egress-auth-type", env = "OIDC_PROXY_EGRESS_AUTH_TYPE", default_value = "")]
    pub auth_type: String,

    #[command(flatten)]
    pub static_auth: StaticTokenConfig,

    #[command(flatten)]
    pub manual: ManualTokenConfig,

    #[command(flatten)]
    pub gcp: GcpTokenConfig,
}

/// Ingress mode: validate tokens on incoming requests.
#[derive(Debug, Clone, Default, Args)]
pub struct IngressConfig {
    /// Enable ingress mode
    #[arg(id = "ingress_enabled", long = "ingress-enabled", env = "OIDC_PROXY_INGRESS_ENABLED")]
    pub enabled: bool,

    /// JSON web key set URL for key validation
    #[arg(long = "ingress-jwks-url", env = "OIDC_PROXY_INGRESS_JWKS_URL", default_value = "")]
    pub jwks_url: String,

    /// Signing key for validation
    #[arg(
        long = "ingress-validating-key",
        env = "OIDC_PROXY_INGRESS_VALIDATING_KEY",
        default_value = "",
        hide_env_values = true
    )]
    pub validating_key: String,

    /// Static identity token for validation
    #[arg(
        id = "ingress_static_token",
        long = "ingress-static-token",
        env = "OIDC_PROXY_INGRESS_STATIC_TOKEN",
        default_value = "",
        hide_env_values = true
    )]
    pub static_token: String,

    /// Claims for validation (JSON or YAML map)
    #[arg(
        long = "ingress-valid-claims",
        env = "OIDC_PROXY_INGRESS_VALID_CLAIMS",
        default_value = ""
    )]
    pub valid_claims: String,

    /// Check every expected claim instead of stopping after the first list claim
    #[arg(long = "ingress-exhaustive-claims", env = "OIDC_PROXY_INGRESS_EXHAUSTIVE_CLAIMS")]
    pub exhaustive_claims: bool,

    /// Do not include validation errors in 401 responses
    #[arg(long = "ingress-hide-errors", env = "OIDC_PROXY_INGRESS_HIDE_ERRORS")]
    pub hide_errors: bool,
}

/// Direction the proxy operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Egress,
    Ingress,
}

impl ProxyConfig {
    /// Check that the provided flags make sense together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_url.is_empty() {
            return Err(ConfigError::Missing("target URL"));
        }
        self.target()?;

        if self.audience.trim().is_empty() && self.egress.auth.auth_type != "static" {
            return Err(ConfigError::Missing("audience"));
        }

        match self.mode()? {
            Mode::Egress => {
                if self.egress.auth.auth_type.is_empty() {
                    return Err(ConfigError::Missing("egress auth type"));
                }
                self.egress.renew_lead()?;
                if self.audiences().len() > 1 {
                    return Err(ConfigError::Invalid(
                        "only one audience may be specified in egress mode".to_string(),
                    ));
                }
            }
            Mode::Ingress => {
                let ingress = &self.ingress;
                if ingress.jwks_url.is_empty()
                    && ingress.validating_key.is_empty()
                    && ingress.static_token.is_empty()
                {
                    return Err(ConfigError::Invalid(
                        "ingress mode: JWKS URL, validating key, or static token is required"
                            .to_string(),
                    ));
                }
            }
        }

        if self.tls.listen_enabled && (self.tls.cert.is_empty() || self.tls.key.is_empty()) {
            return Err(ConfigError::Invalid(
                "when TLS is enabled, a certificate and key path must be specified".to_string(),
            ));
        }

        Ok(())
    }

    /// Egress wins when both modes are enabled.
    pub fn mode(&self) -> Result<Mode, ConfigError> {
        match (self.egress.enabled, self.ingress.enabled) {
            (true, true) => {
                warn!("both egress and ingress enabled, running in egress mode");
                Ok(Mode::Egress)
            }
            (true, false) => Ok(Mode::Egress),
            (false, true) => Ok(Mode::Ingress),
            (false, false) => Err(ConfigError::Invalid(
                "no direction specified, choose ingress or egress".to_string(),
            )),
        }
    }

    /// Parsed target URL.
    pub fn target(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.target_url).map_err(|source| ConfigError::InvalidUrl {
            url: self.target_url.clone(),
            source,
        })
    }

    /// Configured audiences, in order.
    pub fn audiences(&self) -> Vec<String> {
        parse_audiences(&self.audience)
    }

    /// Listener address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.address, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("invalid listen address: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ProxyConfig {
        let mut argv = vec!["oidc-proxy"];
        argv.extend_from_slice(args);
        ProxyConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let config = parse(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.egress.auth.gcp.service_account, "default");
        assert_eq!(config.egress.renew_lead_secs, 0);
        assert!(!config.egress.enabled);
        assert!(!config.ingress.enabled);
    }

    #[test]
    fn nested_flags_parse() {
        let config = parse(&[
            "--target-url",
            "http://localhost:9000",
            "--audience",
            "svc",
            "--egress-enabled",
            "--egress-auth-type",
            "manual",
            "--egress-auth-manual-issuer",
            "https://me",
            "--egress-auth-manual-signing-method",
            "HS256",
        ]);
        assert!(config.egress.enabled);
        assert_eq!(config.egress.auth.auth_type, "manual");
        assert_eq!(config.egress.auth.manual.issuer, "https://me");
        assert_eq!(config.egress.auth.manual.signing_method, "HS256");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn target_url_is_required() {
        let config = parse(&[
            "--audience",
            "svc",
            "--ingress-enabled",
            "--ingress-static-token",
            "t",
        ]);
        assert!(matches!(config.validate(), Err(ConfigError::Missing("target URL"))));
    }

    #[test]
    fn audience_optional_only_for_static_egress() {
        let config = parse(&[
            "--target-url",
            "http://localhost:9000",
            "--egress-enabled",
            "--egress-auth-type",
            "static",
        ]);
        assert!(config.validate().is_ok());

        let config = parse(&[
            "--target-url",
            "http://localhost:9000",
            "--egress-enabled",
            "--egress-auth-type",
            "gcp",
        ]);
        assert!(matches!(config.validate(), Err(ConfigError::Missing("audience"))));
    }

    #[test]
    fn a_mode_is_required() {
        let config = parse(&["--target-url", "http://localhost:9000", "--audience", "svc"]);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn egress_wins_when_both_enabled() {
        let config = parse(&["--egress-enabled", "--ingress-enabled"]);
        assert_eq!(config.mode().unwrap(), Mode::Egress);
    }

    #[test]
    fn egress_accepts_one_audience() {
        let config = parse(&[
            "--target-url",
            "http://localhost:9000",
            "--audience",
            r#"["a", "b"]"#,
            "--egress-enabled",
            "--egress-auth-type",
            "gcp",
        ]);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn renew_lead_is_bounded() {
        let egress = |lead: &str| {
            parse(&[
                "--target-url",
                "http://localhost:9000",
                "--audience",
                "svc",
                "--egress-enabled",
                "--egress-auth-type",
                "gcp",
                "--egress-renew-lead-secs",
                lead,
            ])
        };

        let config = egress("300");
        assert!(config.validate().is_ok());
        assert_eq!(config.egress.renew_lead().unwrap(), Duration::seconds(300));
        assert!(egress("3600").validate().is_ok());

        for lead in ["3601", "20000000000000", "10000000000000000"] {
            let config = egress(lead);
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "{lead}");
            assert!(config.egress.renew_lead().is_err());
        }
    }

    #[test]
    fn ingress_needs_a_key_source() {
        let config = parse(&[
            "--target-url",
            "http://localhost:9000",
            "--audience",
            "svc",
            "--ingress-enabled",
        ]);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn tls_listen_needs_cert_and_key() {
        let config = parse(&[
            "--target-url",
            "http://localhost:9000",
            "--audience",
            "svc",
            "--ingress-enabled",
            "--ingress-static-token",
            "t",
            "--tls-listen-enabled",
            "--tls-cert",
            "cert.pem",
        ]);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_target_url_is_rejected() {
        let config = parse(&["--target-url", "not a url", "--audience", "svc"]);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));
    }
}
