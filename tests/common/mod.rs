// ABOUTME: Shared fixtures for integration tests: wired engine, registry, and store
// ABOUTME: Clients are registered through the real registry so secrets round-trip properly
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use tollgate::clients::{ClientRegistry, IssuedCredentials, NewApplication};
use tollgate::config::ServerConfig;
use tollgate::models::{AuthorizationGrantType, ClientType, SigningAlgorithm};
use tollgate::oauth2::models::{AuthorizeRequest, TokenRequest};
use tollgate::oauth2::AuthorizationServer;
use tollgate::signing::{JwtSigner, TokenSigner};
use tollgate::store::{MemoryTokenStore, TokenStore};

pub const REDIRECT_URI: &str = "https://client.example.com/callback";

/// Fully wired engine over an in-memory store
pub struct TestContext {
    pub store: Arc<dyn TokenStore>,
    pub registry: Arc<ClientRegistry>,
    pub signer: Arc<dyn TokenSigner>,
    pub engine: Arc<AuthorizationServer>,
    pub config: Arc<ServerConfig>,
}

/// Default test configuration: PKCE off so flow tests stay focused, the
/// explicit PKCE tests opt back in
pub fn test_config() -> ServerConfig {
    ServerConfig {
        pkce_required: false,
        ..ServerConfig::default()
    }
}

pub fn context_with(config: ServerConfig) -> TestContext {
    let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    let registry = Arc::new(ClientRegistry::new(store.clone()));
    let signer: Arc<dyn TokenSigner> =
        Arc::new(JwtSigner::new(config.rs256_private_key_pem.clone()));
    let config = Arc::new(config);
    let engine = Arc::new(AuthorizationServer::new(
        store.clone(),
        registry.clone(),
        signer.clone(),
        config.clone(),
    ));
    TestContext {
        store,
        registry,
        signer,
        engine,
        config,
    }
}

pub fn context() -> TestContext {
    context_with(test_config())
}

/// Register a confidential authorization-code client
pub async fn register_code_client(context: &TestContext) -> IssuedCredentials {
    context
        .registry
        .register(NewApplication {
            client_type: ClientType::Confidential,
            grant_type: AuthorizationGrantType::AuthorizationCode,
            redirect_uris: vec![REDIRECT_URI.to_owned()],
            algorithm: SigningAlgorithm::Hs256,
            backchannel_logout_uri: None,
        })
        .await
        .unwrap()
}

/// Register a confidential client-credentials client
pub async fn register_service_client(context: &TestContext) -> IssuedCredentials {
    context
        .registry
        .register(NewApplication {
            client_type: ClientType::Confidential,
            grant_type: AuthorizationGrantType::ClientCredentials,
            redirect_uris: vec![],
            algorithm: SigningAlgorithm::None,
            backchannel_logout_uri: None,
        })
        .await
        .unwrap()
}

/// Register a public implicit-flow client
pub async fn register_implicit_client(context: &TestContext) -> IssuedCredentials {
    context
        .registry
        .register(NewApplication {
            client_type: ClientType::Public,
            grant_type: AuthorizationGrantType::Implicit,
            redirect_uris: vec![REDIRECT_URI.to_owned()],
            algorithm: SigningAlgorithm::None,
            backchannel_logout_uri: None,
        })
        .await
        .unwrap()
}

pub fn authorize_request(client_id: &str, scope: &str, resources: &[&str]) -> AuthorizeRequest {
    AuthorizeRequest {
        response_type: "code".to_owned(),
        client_id: client_id.to_owned(),
        redirect_uri: REDIRECT_URI.to_owned(),
        scope: Some(scope.to_owned()),
        state: None,
        code_challenge: None,
        code_challenge_method: None,
        resource: resources.iter().map(|s| (*s).to_owned()).collect(),
    }
}

pub fn exchange_request(
    credentials: &IssuedCredentials,
    code: &str,
    resources: &[&str],
) -> TokenRequest {
    TokenRequest {
        grant_type: "authorization_code".to_owned(),
        code: Some(code.to_owned()),
        redirect_uri: Some(REDIRECT_URI.to_owned()),
        client_id: credentials.client_id.clone(),
        client_secret: Some(credentials.client_secret.clone()),
        scope: None,
        refresh_token: None,
        code_verifier: None,
        resource: resources.iter().map(|s| (*s).to_owned()).collect(),
    }
}

pub fn refresh_request(
    credentials: &IssuedCredentials,
    refresh_token: &str,
    resources: &[&str],
) -> TokenRequest {
    TokenRequest {
        grant_type: "refresh_token".to_owned(),
        code: None,
        redirect_uri: None,
        client_id: credentials.client_id.clone(),
        client_secret: Some(credentials.client_secret.clone()),
        scope: None,
        refresh_token: Some(refresh_token.to_owned()),
        code_verifier: None,
        resource: resources.iter().map(|s| (*s).to_owned()).collect(),
    }
}
