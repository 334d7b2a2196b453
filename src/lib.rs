// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OIDC Proxy - identity-stamping and identity-verifying reverse proxy
//!
//! In egress mode the proxy obtains an identity token (static, self-signed or
//! from the GCP metadata server) and attaches it to every forwarded request.
//! In ingress mode it validates the bearer token of every incoming request
//! against a key and a set of expected claims before forwarding.
//!
//! ## Modules
//!
//! - `auth` - Token retrieval, caching, key management and claim validation
//! - `config` - Command-line and environment configuration
//! - `proxy` - Request forwarding to the target
//! - `state` - Shared handler state

pub mod auth;
pub mod config;
pub mod error;
pub mod proxy;
pub mod state;
