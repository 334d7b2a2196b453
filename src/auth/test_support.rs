// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token builders shared by unit tests.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;

/// A well-formed token whose signature is garbage.
pub fn unsigned_token(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

/// An HS256 token signed with `secret`, optionally carrying a `kid`.
pub fn hs256_token(claims: Value, secret: &[u8], kid: Option<&str>) -> String {
    let mut header = Header::new(jsonwebtoken::Algorithm::HS256);
    header.kid = kid.map(str::to_string);
    encode(&header, &claims, &EncodingKey::from_secret(secret)).unwrap()
}

/// Claims with every mandatory OIDC field, valid for the foreseeable future.
pub fn oidc_claims(aud: &str) -> Value {
    serde_json::json!({
        "iss": "https://test-svc",
        "sub": "1234567890",
        "aud": aud,
        "exp": 4_516_239_022_i64,
        "iat": 1_516_239_022_i64,
    })
}
