// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tokens minted by the manual retriever validate with the manual key manager.

use oidc_proxy::auth::error::ValidationError;
use oidc_proxy::auth::key_manager::ManualKeyManager;
use oidc_proxy::auth::keys::detect_validating_key;
use oidc_proxy::auth::manual::{ManualTokenConfig, ManualTokenRetriever};
use oidc_proxy::auth::{ExpectedClaims, KeyManager, TokenManager, TokenRetriever};

const RSA_PRIVATE: &str = include_str!("fixtures/rsa_private.pem");
const RSA_PUBLIC: &str = include_str!("fixtures/rsa_public.pem");
const EC_PRIVATE: &str = include_str!("fixtures/ec_private.pem");
const EC_PUBLIC: &str = include_str!("fixtures/ec_public.pem");
const ED_PRIVATE: &str = include_str!("fixtures/ed25519_private.pem");
const ED_PUBLIC: &str = include_str!("fixtures/ed25519_public.pem");

fn retriever(key: &str, method: &str, claims: &str) -> ManualTokenRetriever {
    ManualTokenRetriever::configure(&ManualTokenConfig {
        issuer: "https://issuer".to_string(),
        subject: "svc@test".to_string(),
        key: key.to_string(),
        signing_method: method.to_string(),
        claims: claims.to_string(),
    })
    .unwrap()
}

fn expected(aud: &str, role: &str) -> ExpectedClaims {
    let mut expected = ExpectedClaims::new();
    expected.add_claim("aud", aud);
    expected.add_claim("role", role);
    expected
}

#[tokio::test]
async fn hs256_round_trip() {
    let token = retriever("testing", "HS256", r#"{"role": "admin"}"#)
        .get_token("A")
        .await
        .unwrap();

    let manager = ManualKeyManager::new(detect_validating_key(b"testing"), expected("A", "admin"));
    assert!(manager.validate(&token).await.is_ok());

    let manager = ManualKeyManager::new(detect_validating_key(b"testing"), expected("A", "viewer"));
    assert!(matches!(
        manager.validate(&token).await,
        Err(ValidationError::ValueMismatch(claim)) if claim == "role"
    ));
}

#[tokio::test]
async fn asymmetric_round_trips() {
    for (private, public, method) in [
        (RSA_PRIVATE, RSA_PUBLIC, "RS256"),
        (RSA_PRIVATE, RSA_PUBLIC, "PS256"),
        (EC_PRIVATE, EC_PUBLIC, "ES256"),
        (ED_PRIVATE, ED_PUBLIC, "EdDSA"),
    ] {
        let token = retriever(private, method, "role: admin")
            .get_token("A")
            .await
            .unwrap();
        let manager = ManualKeyManager::new(
            detect_validating_key(public.as_bytes()),
            expected("A", "admin"),
        );
        assert!(manager.validate(&token).await.is_ok(), "{method}");
    }
}

#[tokio::test]
async fn key_family_mismatch_is_rejected() {
    let token = retriever("testing", "HS256", "")
        .get_token("A")
        .await
        .unwrap();
    let mut expected = ExpectedClaims::new();
    expected.add_claim("aud", "A");
    let manager = ManualKeyManager::new(detect_validating_key(RSA_PUBLIC.as_bytes()), expected);
    assert!(matches!(
        manager.validate(&token).await,
        Err(ValidationError::Jwt(_))
    ));
}

#[tokio::test]
async fn managed_tokens_are_cached() {
    let manager = TokenManager::new(retriever(RSA_PRIVATE, "RS256", ""));
    let first = manager.token("A").await.unwrap();
    let second = manager.token("A").await.unwrap();
    assert_eq!(first, second);
}
