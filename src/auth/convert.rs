// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operator-facing string formats: claim maps and audience lists.
//!
//! Both formats are auto-detected as JSON first and YAML second, so that an
//! operator can paste either into an environment variable.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::info;

use super::claims::{ClaimPattern, ClaimSet, ClaimValue};
use super::error::ConfigError;

/// How string values in a claim map are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringClaims {
    /// Strings are compared literally (extra claims for minted tokens).
    Literal,
    /// Strings are compiled into full-match patterns (expected claims).
    Pattern,
}

/// Parse a claim map, trying JSON and then YAML.
///
/// An empty (or whitespace-only) input yields an empty map.
pub fn parse_claim_map(input: &str) -> Result<BTreeMap<String, Value>, ConfigError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(BTreeMap::new());
    }

    if let Ok(map) = serde_json::from_str::<BTreeMap<String, Value>>(input) {
        info!("detected JSON claim map");
        return Ok(map);
    }

    if let Ok(map) = serde_yaml::from_str::<BTreeMap<String, Value>>(input) {
        info!("detected YAML claim map");
        return Ok(map);
    }

    Err(ConfigError::ClaimMap)
}

/// Claims to stamp verbatim into a self-signed token.
pub fn literal_claims(input: &str) -> Result<ClaimSet, ConfigError> {
    convert_claims(parse_claim_map(input)?, StringClaims::Literal)
}

/// Claims to validate against; string values become patterns.
pub fn validatable_claims(input: &str) -> Result<ClaimSet, ConfigError> {
    convert_claims(parse_claim_map(input)?, StringClaims::Pattern)
}

fn convert_claims(
    map: BTreeMap<String, Value>,
    strings: StringClaims,
) -> Result<ClaimSet, ConfigError> {
    map.into_iter()
        .map(|(name, value)| {
            let value = convert_value(&name, value, strings)?;
            Ok((name, value))
        })
        .collect()
}

fn convert_value(
    name: &str,
    value: Value,
    strings: StringClaims,
) -> Result<ClaimValue, ConfigError> {
    match value {
        Value::String(s) => match strings {
            StringClaims::Literal => Ok(ClaimValue::String(s)),
            StringClaims::Pattern => ClaimPattern::new(&s)
                .map(ClaimValue::Pattern)
                .map_err(|source| ConfigError::InvalidPattern {
                    claim: name.to_string(),
                    source,
                }),
        },
        Value::Number(n) => n
            .as_f64()
            .map(ClaimValue::Number)
            .ok_or_else(|| ConfigError::UnsupportedClaimType(name.to_string())),
        Value::Bool(b) => Ok(ClaimValue::Bool(b)),
        Value::Null => Ok(ClaimValue::Null),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(ConfigError::UnsupportedClaimType(name.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ClaimValue::StringList),
        Value::Object(_) => Err(ConfigError::UnsupportedClaimType(name.to_string())),
    }
}

/// Parse the audience setting into a list of audiences.
///
/// Accepts a JSON array, then a YAML array; anything else is taken as a
/// single audience. An empty setting yields no audiences.
pub fn parse_audiences(input: &str) -> Vec<String> {
    let input = input.trim();
    if input.is_empty() {
        return Vec::new();
    }

    if let Ok(audiences) = serde_json::from_str::<Vec<String>>(input) {
        info!("detected JSON audience list");
        return audiences;
    }

    if let Ok(audiences) = serde_yaml::from_str::<Vec<String>>(input) {
        info!("detected YAML audience list");
        return audiences;
    }

    vec![input.to_string()]
}
