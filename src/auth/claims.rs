// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claim values, claim sets and the claim validator.
//!
//! Observed claims come from a decoded token payload. Expected claims come
//! from operator configuration. Validation walks the expected set and checks
//! each entry against the observed set:
//!
//! | Expected | Observed must be |
//! |----------|------------------|
//! | `Pattern` | a string fully matching the pattern |
//! | `StringList` on `aud` | an audience contained in the list |
//! | `StringList` elsewhere | a list with the same members, any order |
//! | scalar | the same kind and the same value |

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::error::{ConfigError, ValidationError};

/// Claims every OIDC ID token must carry.
pub const OIDC_REQUIRED_CLAIMS: [&str; 5] = ["iss", "sub", "aud", "exp", "iat"];

/// Standard OIDC profile claims.
pub const OIDC_STANDARD_CLAIMS: [&str; 20] = [
    "sub",
    "name",
    "given_name",
    "family_name",
    "middle_name",
    "nickname",
    "preferred_username",
    "profile",
    "picture",
    "website",
    "email",
    "email_verified",
    "gender",
    "birthdate",
    "zoneinfo",
    "locale",
    "phone_number",
    "phone_number_verified",
    "address",
    "updated_at",
];

/// Additional ID-token claims defined by OIDC core.
pub const OIDC_ID_TOKEN_EXTRA_CLAIMS: [&str; 6] =
    ["auth_time", "nonce", "acr", "azp", "at_hash", "c_hash"];

/// Claims a self-signed token always sets itself.
pub const RESERVED_CLAIMS: [&str; 5] = ["iat", "exp", "iss", "aud", "sub"];

/// Whether `name` is one of the OIDC ID-token claims.
pub fn is_oidc_id_token_claim(name: &str) -> bool {
    OIDC_REQUIRED_CLAIMS.contains(&name)
        || OIDC_STANDARD_CLAIMS.contains(&name)
        || OIDC_ID_TOKEN_EXTRA_CLAIMS.contains(&name)
}

/// A compiled claim pattern. Matches the whole claim value, never a substring.
#[derive(Clone)]
pub struct ClaimPattern {
    source: String,
    regex: Regex,
}

impl ClaimPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// The pattern as written by the operator.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for ClaimPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for ClaimPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClaimPattern").field(&self.source).finish()
    }
}

/// A single claim value.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    StringList(Vec<String>),
    Pattern(ClaimPattern),
    /// Observed value with no richer shape (objects, mixed arrays).
    Structured(Value),
}

impl ClaimValue {
    /// Name of the value kind, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            ClaimValue::String(_) => "string",
            ClaimValue::Number(_) => "number",
            ClaimValue::Bool(_) => "bool",
            ClaimValue::Null => "null",
            ClaimValue::StringList(_) => "string list",
            ClaimValue::Pattern(_) => "pattern",
            ClaimValue::Structured(_) => "structured",
        }
    }

    /// Convert a decoded JSON payload value.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(s) => ClaimValue::String(s),
            Value::Number(n) => match n.as_f64() {
                Some(f) => ClaimValue::Number(f),
                None => ClaimValue::Structured(Value::Number(n)),
            },
            Value::Bool(b) => ClaimValue::Bool(b),
            Value::Null => ClaimValue::Null,
            Value::Array(items) if items.iter().all(Value::is_string) => ClaimValue::StringList(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            other => ClaimValue::Structured(other),
        }
    }

    /// Convert back to JSON for embedding into a token payload.
    ///
    /// Integral numbers are written as integers so that `iat`-style values
    /// round-trip without a fractional part.
    pub fn to_json(&self) -> Value {
        match self {
            ClaimValue::String(s) => Value::String(s.clone()),
            ClaimValue::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                Value::from(*n as i64)
            }
            ClaimValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ClaimValue::Bool(b) => Value::Bool(*b),
            ClaimValue::Null => Value::Null,
            ClaimValue::StringList(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            ClaimValue::Pattern(p) => Value::String(p.as_str().to_string()),
            ClaimValue::Structured(v) => v.clone(),
        }
    }

    fn same_kind(&self, other: &ClaimValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl From<&str> for ClaimValue {
    fn from(value: &str) -> Self {
        ClaimValue::String(value.to_string())
    }
}

impl From<String> for ClaimValue {
    fn from(value: String) -> Self {
        ClaimValue::String(value)
    }
}

impl From<f64> for ClaimValue {
    fn from(value: f64) -> Self {
        ClaimValue::Number(value)
    }
}

impl From<i64> for ClaimValue {
    fn from(value: i64) -> Self {
        ClaimValue::Number(value as f64)
    }
}

impl From<bool> for ClaimValue {
    fn from(value: bool) -> Self {
        ClaimValue::Bool(value)
    }
}

impl From<Vec<String>> for ClaimValue {
    fn from(value: Vec<String>) -> Self {
        ClaimValue::StringList(value)
    }
}

impl From<ClaimPattern> for ClaimValue {
    fn from(value: ClaimPattern) -> Self {
        ClaimValue::Pattern(value)
    }
}

/// Mapping from claim name to value. Iterates in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimSet(BTreeMap<String, ClaimValue>);

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an observed set from a decoded token payload.
    pub fn from_json_map(map: HashMap<String, Value>) -> Self {
        map.into_iter()
            .map(|(name, value)| (name, ClaimValue::from_json(value)))
            .collect()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ClaimValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClaimValue)> {
        self.0.iter()
    }

    /// Check that all mandatory OIDC ID-token claims are present.
    pub fn require_oidc_claims(&self) -> Result<(), ValidationError> {
        for (name, description) in [
            ("aud", "audience"),
            ("iat", "issued at"),
            ("exp", "expiration"),
            ("sub", "subject"),
            ("iss", "issuer"),
        ] {
            if !self.contains(name) {
                return Err(ValidationError::MissingRequiredClaim(description));
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, ClaimValue)> for ClaimSet {
    fn from_iter<I: IntoIterator<Item = (String, ClaimValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Decode a token's payload without verifying its signature.
pub fn decode_unverified(token: &str) -> Result<ClaimSet, jsonwebtoken::errors::Error> {
    let data = jsonwebtoken::dangerous::insecure_decode::<HashMap<String, Value>>(token)?;
    Ok(ClaimSet::from_json_map(data.claims))
}

/// What happens after a list-typed expectation passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListClaimPolicy {
    /// Report success as soon as the first list-typed claim other than `aud`
    /// passes; later claims (in name order) are not inspected. Compatibility
    /// default.
    #[default]
    StopAtFirstList,
    /// Keep checking every expected claim.
    Exhaustive,
}

/// The operator's expectations for a presented token.
#[derive(Debug, Clone, Default)]
pub struct ExpectedClaims {
    claims: ClaimSet,
    list_policy: ListClaimPolicy,
}

impl ExpectedClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON or YAML claim map. String values are compiled as patterns.
    pub fn from_claim_map(input: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            claims: super::convert::validatable_claims(input)?,
            list_policy: ListClaimPolicy::default(),
        })
    }

    pub fn with_list_policy(mut self, policy: ListClaimPolicy) -> Self {
        self.list_policy = policy;
        self
    }

    /// Add an expectation. Strings added here are literal, never patterns.
    pub fn add_claim(&mut self, name: impl Into<String>, value: impl Into<ClaimValue>) {
        self.claims.insert(name, value);
    }

    pub fn has_claim(&self, name: &str) -> bool {
        self.claims.contains(name)
    }

    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    pub fn list_policy(&self) -> ListClaimPolicy {
        self.list_policy
    }

    /// Check an observed claim set against these expectations.
    pub fn validate(&self, observed: &ClaimSet) -> Result<(), ValidationError> {
        observed.require_oidc_claims()?;

        if !self.claims.contains("aud") {
            return Err(ValidationError::MissingExpectedAudience);
        }

        for (name, expected) in self.claims.iter() {
            let actual = observed
                .get(name)
                .ok_or_else(|| ValidationError::MissingClaim(name.clone()))?;

            match expected {
                ClaimValue::Pattern(pattern) => match actual {
                    ClaimValue::String(value) if pattern.is_match(value) => {}
                    ClaimValue::String(_) => {
                        return Err(ValidationError::InvalidClaim(name.clone()))
                    }
                    _ => return Err(ValidationError::ClaimNotString(name.clone())),
                },
                ClaimValue::StringList(allowed) => {
                    validate_list_claim(name, allowed, actual)?;
                    // An audience allow-list never ends validation early.
                    if name != "aud" && self.list_policy == ListClaimPolicy::StopAtFirstList {
                        return Ok(());
                    }
                }
                _ => {
                    if !expected.same_kind(actual) {
                        debug!(
                            claim = %name,
                            expected = expected.kind(),
                            actual = actual.kind(),
                            "claim kind mismatch"
                        );
                        return Err(ValidationError::TypeMismatch(name.clone()));
                    }
                    if expected != actual {
                        return Err(ValidationError::ValueMismatch(name.clone()));
                    }
                }
            }
        }

        Ok(())
    }
}

fn validate_list_claim(
    name: &str,
    allowed: &[String],
    actual: &ClaimValue,
) -> Result<(), ValidationError> {
    if name == "aud" {
        let permitted = match actual {
            ClaimValue::String(aud) => allowed.contains(aud),
            ClaimValue::StringList(auds) => auds.iter().any(|aud| allowed.contains(aud)),
            _ => false,
        };
        return if permitted {
            Ok(())
        } else {
            Err(ValidationError::AudienceNotAllowed(name.to_string()))
        };
    }

    // Only `aud` and `amr` may be lists among the OIDC claims.
    if name != "amr" && is_oidc_id_token_claim(name) {
        return Err(ValidationError::ListNotAllowed(name.to_string()));
    }

    match actual {
        ClaimValue::StringList(values) if equivalent_set(allowed, values) => Ok(()),
        ClaimValue::StringList(_) => Err(ValidationError::ValueMismatch(name.to_string())),
        _ => Err(ValidationError::TypeMismatch(name.to_string())),
    }
}

/// Same members, order ignored.
fn equivalent_set(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|v| b.contains(v)) && b.iter().all(|v| a.contains(v))
}
