// ABOUTME: Bearer validation tests: expiry, scope subsets, and audience enforcement modes
// ABOUTME: Disabled enforcement is an explicit opt-out and must skip the audience check only
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use tollgate::auth::{AudienceEnforcement, BearerValidator, Principal};
use tollgate::config::ServerConfig;
use tollgate::errors::ProtocolError;
use tollgate::models::AccessToken;
use tollgate::store::{MemoryTokenStore, TokenStore};

fn token(value: &str, user: Option<Uuid>, scope: &str, resource: &[&str]) -> AccessToken {
    AccessToken {
        token: value.to_owned(),
        client_id: "client-1".to_owned(),
        user_id: user,
        scope: Some(scope.to_owned()),
        resource: resource.iter().map(|s| (*s).to_owned()).collect(),
        refresh_token: None,
        expires_at: Utc::now() + Duration::hours(1),
        created_at: Utc::now(),
    }
}

async fn store_with(tokens: &[AccessToken]) -> Arc<dyn TokenStore> {
    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    for t in tokens {
        store.create_access_token(t).await.unwrap();
    }
    store
}

#[tokio::test]
async fn test_valid_token_with_matching_audience() {
    let user = Uuid::new_v4();
    let store = store_with(&[token(
        "tok",
        Some(user),
        "read write",
        &["https://api.example.com/v1"],
    )])
    .await;
    let validator = BearerValidator::new(store, AudienceEnforcement::default_validator());

    let principal = validator
        .validate("tok", &["read"], "https://api.example.com/v1/users")
        .await
        .unwrap();
    assert_eq!(principal, Principal::User(user));
}

#[tokio::test]
async fn test_audience_mismatch_is_invalid_target() {
    let store = store_with(&[token(
        "tok",
        Some(Uuid::new_v4()),
        "read",
        &["https://api.example.com/v1"],
    )])
    .await;
    let validator = BearerValidator::new(store, AudienceEnforcement::default_validator());

    let err = validator
        .validate("tok", &["read"], "https://other.example.com/v1/users")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProtocolError::invalid_target("https://other.example.com/v1/users")
    );
}

#[tokio::test]
async fn test_unrestricted_token_matches_any_request() {
    let store = store_with(&[token("tok", Some(Uuid::new_v4()), "read", &[])]).await;
    let validator = BearerValidator::new(store, AudienceEnforcement::default_validator());

    assert!(validator
        .validate("tok", &["read"], "https://any.example.com/anything")
        .await
        .is_ok());
}

#[tokio::test]
async fn test_disabled_enforcement_skips_audience_only() {
    let store = store_with(&[token(
        "tok",
        Some(Uuid::new_v4()),
        "read",
        &["https://api.example.com/v1"],
    )])
    .await;
    let validator = BearerValidator::new(store.clone(), AudienceEnforcement::Disabled);

    // mismatched audience passes with the validator disabled
    assert!(validator
        .validate("tok", &["read"], "https://other.example.com/v1")
        .await
        .is_ok());

    // but scope is still checked
    let err = validator
        .validate("tok", &["admin"], "https://other.example.com/v1")
        .await
        .unwrap_err();
    assert_eq!(err, ProtocolError::InsufficientScope);
}

#[tokio::test]
async fn test_from_config_honors_audience_validation_flag() {
    let store = store_with(&[token(
        "tok",
        Some(Uuid::new_v4()),
        "read",
        &["https://api.example.com/v1"],
    )])
    .await;

    let disabled = ServerConfig {
        audience_validation: false,
        ..ServerConfig::default()
    };
    let validator = BearerValidator::from_config(store.clone(), &disabled);
    assert!(validator
        .validate("tok", &["read"], "https://other.example.com/")
        .await
        .is_ok());

    let validator = BearerValidator::from_config(store, &ServerConfig::default());
    assert!(validator
        .validate("tok", &["read"], "https://other.example.com/")
        .await
        .is_err());
}

#[tokio::test]
async fn test_missing_scope_is_insufficient_scope() {
    let store = store_with(&[token("tok", Some(Uuid::new_v4()), "read", &[])]).await;
    let validator = BearerValidator::new(store, AudienceEnforcement::default_validator());

    let err = validator
        .validate("tok", &["read", "write"], "https://api.example.com/")
        .await
        .unwrap_err();
    assert_eq!(err, ProtocolError::InsufficientScope);
}

#[tokio::test]
async fn test_unknown_and_expired_tokens_are_invalid_token() {
    let mut stale = token("stale", Some(Uuid::new_v4()), "read", &[]);
    stale.expires_at = Utc::now() - Duration::minutes(1);
    let store = store_with(&[stale]).await;
    let validator = BearerValidator::new(store, AudienceEnforcement::default_validator());

    let err = validator
        .validate("missing", &[], "https://api.example.com/")
        .await
        .unwrap_err();
    assert_eq!(err, ProtocolError::InvalidToken);

    let err = validator
        .validate("stale", &[], "https://api.example.com/")
        .await
        .unwrap_err();
    assert_eq!(err, ProtocolError::InvalidToken);
}

#[tokio::test]
async fn test_client_credentials_token_yields_client_principal() {
    let store = store_with(&[token("tok", None, "read", &[])]).await;
    let validator = BearerValidator::new(store, AudienceEnforcement::default_validator());

    let principal = validator
        .validate("tok", &["read"], "https://api.example.com/")
        .await
        .unwrap();
    assert_eq!(principal, Principal::Client("client-1".to_owned()));
}
