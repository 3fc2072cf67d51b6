// ABOUTME: Grant engine: authorization, token exchange, client credentials, refresh, implicit
// ABOUTME: Every flow binds resources through the RFC 8707 enforcer before minting tokens
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::models::{AuthorizeRequest, AuthorizeResponse, TokenRequest, TokenResponse};
use crate::clients::ClientRegistry;
use crate::config::ServerConfig;
use crate::crypto;
use crate::errors::ProtocolError;
use crate::models::{
    scope_set, AccessToken, Application, AuthorizationGrantType, Grant, IdToken, RefreshToken,
};
use crate::resource::bind_resources;
use crate::signing::{IdTokenClaims, TokenSigner};
use crate::store::TokenStore;

/// OAuth 2.0 authorization server: the grant-type state machines.
///
/// All transitions persist through the token store; failures are returned as
/// structured errors with no partial token or grant left behind.
pub struct AuthorizationServer {
    store: Arc<dyn TokenStore>,
    registry: Arc<ClientRegistry>,
    signer: Arc<dyn TokenSigner>,
    config: Arc<ServerConfig>,
}

impl AuthorizationServer {
    /// Assemble the engine from its collaborators
    #[must_use]
    pub fn new(
        store: Arc<dyn TokenStore>,
        registry: Arc<ClientRegistry>,
        signer: Arc<dyn TokenSigner>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            store,
            registry,
            signer,
            config,
        }
    }

    /// Handle an authorization request for the code flow.
    ///
    /// Records the requested resources verbatim on the grant; they become the
    /// ceiling for the later exchange. No enforcement happens here.
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
        user_id: Uuid,
    ) -> Result<AuthorizeResponse, ProtocolError> {
        let application = self.lookup_client(&request.client_id).await?;

        if request.response_type != "code" {
            return Err(ProtocolError::InvalidRequest(
                "response_type must be 'code' for this flow".to_owned(),
            ));
        }
        if application.grant_type != AuthorizationGrantType::AuthorizationCode {
            return Err(ProtocolError::UnauthorizedClient(
                "client is not registered for the authorization_code grant".to_owned(),
            ));
        }
        if !application.redirect_uris.contains(&request.redirect_uri) {
            return Err(ProtocolError::InvalidRequest(
                "redirect_uri is not registered for this client".to_owned(),
            ));
        }
        self.validate_challenge(request)?;

        if self.config.revoke_tokens_on_reauthorize {
            let revoked = self
                .store
                .revoke_access_tokens_for(user_id, &request.client_id)
                .await
                .map_err(storage_error)?;
            if revoked > 0 {
                tracing::info!(
                    "Revoked {} prior access tokens for client {} on re-authorization",
                    revoked,
                    request.client_id
                );
            }
        }

        let now = Utc::now();
        let grant = Grant {
            code: crypto::random_token().map_err(generation_error)?,
            client_id: request.client_id.clone(),
            user_id,
            scope: request.scope.clone(),
            resource: request.resource.clone(),
            redirect_uri: request.redirect_uri.clone(),
            code_challenge: request.code_challenge.clone(),
            code_challenge_method: request.code_challenge_method.clone(),
            expires_at: now + Duration::seconds(self.config.tokens.grant_ttl_secs),
            created_at: now,
        };
        self.store.create_grant(&grant).await.map_err(storage_error)?;

        tracing::debug!(
            "Issued authorization code for client {} with {} resource indicators",
            request.client_id,
            grant.resource.len()
        );
        Ok(AuthorizeResponse {
            code: grant.code,
            state: request.state.clone(),
        })
    }

    /// Handle an authorization request for the implicit flow.
    ///
    /// The token is returned straight from the authorization endpoint, so the
    /// requested resource set applies to it directly; no grant is persisted.
    pub async fn authorize_implicit(
        &self,
        request: &AuthorizeRequest,
        user_id: Uuid,
    ) -> Result<TokenResponse, ProtocolError> {
        let application = self.lookup_client(&request.client_id).await?;

        if request.response_type != "token" {
            return Err(ProtocolError::InvalidRequest(
                "response_type must be 'token' for the implicit flow".to_owned(),
            ));
        }
        if application.grant_type != AuthorizationGrantType::Implicit {
            return Err(ProtocolError::UnauthorizedClient(
                "client is not registered for the implicit grant".to_owned(),
            ));
        }
        if !application.redirect_uris.contains(&request.redirect_uri) {
            return Err(ProtocolError::InvalidRequest(
                "redirect_uri is not registered for this client".to_owned(),
            ));
        }

        let bound = bind_resources(&request.resource, &request.resource)?;
        let access_token = self
            .mint_access_token(&request.client_id, Some(user_id), request.scope.as_deref(), bound, None)
            .await?;

        Ok(TokenResponse {
            access_token: access_token.token,
            token_type: "Bearer".to_owned(),
            expires_in: self.config.tokens.access_token_ttl_secs,
            scope: request.scope.clone(),
            refresh_token: None,
            id_token: None,
        })
    }

    /// Handle a token request: authenticate the client for every grant type
    /// (RFC 6749 §6), then dispatch on `grant_type`.
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, ProtocolError> {
        let application = self
            .registry
            .authenticate(&request.client_id, request.client_secret.as_deref())
            .await?;

        match request.grant_type.as_str() {
            "authorization_code" => {
                self.handle_authorization_code_grant(&application, request)
                    .await
            }
            "client_credentials" => {
                self.handle_client_credentials_grant(&application, &request)
                    .await
            }
            "refresh_token" => self.handle_refresh_token_grant(&application, request).await,
            _ => Err(ProtocolError::UnsupportedGrantType),
        }
    }

    /// Exchange an authorization code for tokens
    async fn handle_authorization_code_grant(
        &self,
        application: &Application,
        request: TokenRequest,
    ) -> Result<TokenResponse, ProtocolError> {
        if application.grant_type != AuthorizationGrantType::AuthorizationCode {
            return Err(ProtocolError::UnauthorizedClient(
                "client is not registered for the authorization_code grant".to_owned(),
            ));
        }
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| ProtocolError::InvalidRequest("missing authorization code".to_owned()))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| ProtocolError::InvalidRequest("missing redirect_uri".to_owned()))?;

        // Atomic read+delete: client id, redirect URI, and expiry are checked
        // inside the consume so a concurrent exchange cannot replay the code.
        let grant = self
            .store
            .consume_grant(code, &request.client_id, redirect_uri, Utc::now())
            .await
            .map_err(storage_error)?
            .ok_or_else(|| {
                tracing::warn!(
                    "Authorization code rejected for client {}: unknown, expired, consumed, or mismatched",
                    request.client_id
                );
                ProtocolError::InvalidGrant("invalid or expired authorization code".to_owned())
            })?;

        // PKCE runs after consumption: a failed verifier burns the code
        // rather than leaving it replayable.
        Self::verify_pkce(&grant, request.code_verifier.as_deref())?;

        let bound = bind_resources(&request.resource, &grant.resource)?;

        let refresh_token_value = if application.allows_refresh() {
            Some(crypto::random_token().map_err(generation_error)?)
        } else {
            None
        };

        let access_token = self
            .mint_access_token(
                &grant.client_id,
                Some(grant.user_id),
                grant.scope.as_deref(),
                bound,
                refresh_token_value.clone(),
            )
            .await?;

        if let Some(refresh_value) = &refresh_token_value {
            let now = Utc::now();
            let refresh_token = RefreshToken {
                token: refresh_value.clone(),
                client_id: grant.client_id.clone(),
                user_id: grant.user_id,
                scope: grant.scope.clone(),
                // The grant's full authorized set, not the narrowed exchange
                // set: this is the ceiling for every future refresh.
                resource: grant.resource.clone(),
                revoked: false,
                access_token: Some(access_token.token.clone()),
                expires_at: now + Duration::days(self.config.tokens.refresh_token_ttl_days),
                created_at: now,
            };
            self.store
                .create_refresh_token(&refresh_token)
                .await
                .map_err(storage_error)?;
        }

        let id_token = self.maybe_issue_id_token(application, &grant).await?;

        Ok(TokenResponse {
            access_token: access_token.token,
            token_type: "Bearer".to_owned(),
            expires_in: self.config.tokens.access_token_ttl_secs,
            scope: grant.scope,
            refresh_token: refresh_token_value,
            id_token,
        })
    }

    /// Issue a token directly to a client acting for itself.
    ///
    /// There is no prior grant, so the requested resource set is authorized
    /// as-is; empty means unrestricted.
    async fn handle_client_credentials_grant(
        &self,
        application: &Application,
        request: &TokenRequest,
    ) -> Result<TokenResponse, ProtocolError> {
        if application.grant_type != AuthorizationGrantType::ClientCredentials {
            return Err(ProtocolError::UnauthorizedClient(
                "client is not registered for the client_credentials grant".to_owned(),
            ));
        }

        let bound = bind_resources(&request.resource, &request.resource)?;
        let access_token = self
            .mint_access_token(&request.client_id, None, request.scope.as_deref(), bound, None)
            .await?;

        Ok(TokenResponse {
            access_token: access_token.token,
            token_type: "Bearer".to_owned(),
            expires_in: self.config.tokens.access_token_ttl_secs,
            scope: request.scope.clone(),
            refresh_token: None,
            id_token: None,
        })
    }

    /// Mint a new access token from a refresh token, narrowing resources
    /// against the refresh token's ceiling; rotate per configuration.
    async fn handle_refresh_token_grant(
        &self,
        application: &Application,
        request: TokenRequest,
    ) -> Result<TokenResponse, ProtocolError> {
        if !application.allows_refresh() {
            return Err(ProtocolError::UnauthorizedClient(
                "client is not registered for the refresh_token grant".to_owned(),
            ));
        }
        let presented = request.refresh_token.as_deref().ok_or_else(|| {
            ProtocolError::InvalidRequest("missing refresh_token".to_owned())
        })?;

        let existing = self
            .store
            .get_refresh_token(presented)
            .await
            .map_err(storage_error)?
            .filter(|t| !t.revoked && t.client_id == request.client_id && !t.is_expired(Utc::now()))
            .ok_or_else(|| {
                tracing::warn!(
                    "Refresh token rejected for client {}: unknown, revoked, expired, or mismatched",
                    request.client_id
                );
                ProtocolError::InvalidGrant("invalid or expired refresh token".to_owned())
            })?;

        // Enforce before any state change so an escalation attempt leaves the
        // presented token untouched.
        let bound = bind_resources(&request.resource, &existing.resource)?;

        if self.config.rotate_refresh_tokens {
            // Validate+revoke in one atomic step; a concurrent refresh of the
            // same token loses here and gets invalid_grant.
            let consumed = self
                .store
                .consume_refresh_token(presented, &request.client_id, Utc::now())
                .await
                .map_err(storage_error)?
                .ok_or_else(|| {
                    ProtocolError::InvalidGrant("invalid or expired refresh token".to_owned())
                })?;

            let successor_value = crypto::random_token().map_err(generation_error)?;
            let access_token = self
                .mint_access_token(
                    &consumed.client_id,
                    Some(consumed.user_id),
                    consumed.scope.as_deref(),
                    bound,
                    Some(successor_value.clone()),
                )
                .await?;

            let now = Utc::now();
            let successor = RefreshToken {
                token: successor_value.clone(),
                client_id: consumed.client_id.clone(),
                user_id: consumed.user_id,
                scope: consumed.scope.clone(),
                // The original ceiling propagates, not the narrowed set.
                resource: consumed.resource.clone(),
                revoked: false,
                access_token: Some(access_token.token.clone()),
                expires_at: now + Duration::days(self.config.tokens.refresh_token_ttl_days),
                created_at: now,
            };
            self.store
                .create_refresh_token(&successor)
                .await
                .map_err(storage_error)?;

            tracing::info!(
                "Refresh token rotated for client {} and user {}",
                consumed.client_id,
                consumed.user_id
            );

            Ok(TokenResponse {
                access_token: access_token.token,
                token_type: "Bearer".to_owned(),
                expires_in: self.config.tokens.access_token_ttl_secs,
                scope: consumed.scope,
                refresh_token: Some(successor_value),
                id_token: None,
            })
        } else {
            let access_token = self
                .mint_access_token(
                    &existing.client_id,
                    Some(existing.user_id),
                    existing.scope.as_deref(),
                    bound,
                    Some(existing.token.clone()),
                )
                .await?;
            self.store
                .link_access_token(&existing.token, &access_token.token)
                .await
                .map_err(storage_error)?;

            Ok(TokenResponse {
                access_token: access_token.token,
                token_type: "Bearer".to_owned(),
                expires_in: self.config.tokens.access_token_ttl_secs,
                scope: existing.scope,
                refresh_token: Some(existing.token),
                id_token: None,
            })
        }
    }

    /// Create and persist an access token with the already-bound resource set
    async fn mint_access_token(
        &self,
        client_id: &str,
        user_id: Option<Uuid>,
        scope: Option<&str>,
        resource: Vec<String>,
        refresh_token: Option<String>,
    ) -> Result<AccessToken, ProtocolError> {
        let now = Utc::now();
        let access_token = AccessToken {
            token: crypto::random_token().map_err(generation_error)?,
            client_id: client_id.to_owned(),
            user_id,
            scope: scope.map(std::string::ToString::to_string),
            resource,
            refresh_token,
            expires_at: now + Duration::seconds(self.config.tokens.access_token_ttl_secs),
            created_at: now,
        };
        self.store
            .create_access_token(&access_token)
            .await
            .map_err(storage_error)?;
        Ok(access_token)
    }

    /// Sign and persist an ID token when the grant carried the `openid`
    /// scope and the application is configured for signing
    async fn maybe_issue_id_token(
        &self,
        application: &Application,
        grant: &Grant,
    ) -> Result<Option<String>, ProtocolError> {
        if !scope_set(grant.scope.as_deref()).contains("openid") {
            return Ok(None);
        }
        if application.algorithm == crate::models::SigningAlgorithm::None {
            tracing::debug!(
                "Skipping ID token for client {}: no signing algorithm configured",
                application.client_id
            );
            return Ok(None);
        }

        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.tokens.id_token_ttl_secs);
        let jti = Uuid::new_v4().to_string();

        let claims = IdTokenClaims {
            iss: self.config.issuer_url.clone(),
            sub: grant.user_id.to_string(),
            aud: application.client_id.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: jti.clone(),
        };
        let payload = serde_json::to_value(&claims).map_err(|e| {
            ProtocolError::ConfigurationError(format!("failed to serialize ID token claims: {e}"))
        })?;
        let signed = self.signer.sign(&payload, application)?;

        self.store
            .create_id_token(&IdToken {
                jti,
                client_id: application.client_id.clone(),
                user_id: grant.user_id,
                scope: grant.scope.clone(),
                expires_at,
                created_at: now,
            })
            .await
            .map_err(storage_error)?;

        Ok(Some(signed))
    }

    /// Validate PKCE challenge shape on the authorization request
    fn validate_challenge(&self, request: &AuthorizeRequest) -> Result<(), ProtocolError> {
        if let Some(challenge) = &request.code_challenge {
            // base64url-encoded SHA-256 output, 43-128 characters (RFC 7636)
            if challenge.len() < 43 || challenge.len() > 128 {
                return Err(ProtocolError::InvalidRequest(
                    "code_challenge must be between 43 and 128 characters".to_owned(),
                ));
            }
            let method = request.code_challenge_method.as_deref().unwrap_or("S256");
            if method != "S256" {
                return Err(ProtocolError::InvalidRequest(
                    "code_challenge_method must be 'S256'".to_owned(),
                ));
            }
        } else if self.config.pkce_required {
            return Err(ProtocolError::InvalidRequest(
                "code_challenge is required for the authorization_code flow".to_owned(),
            ));
        }
        Ok(())
    }

    /// Verify a PKCE code verifier against the challenge stored on the grant
    fn verify_pkce(grant: &Grant, code_verifier: Option<&str>) -> Result<(), ProtocolError> {
        let Some(stored_challenge) = &grant.code_challenge else {
            if code_verifier.is_some() {
                return Err(ProtocolError::InvalidGrant(
                    "code_verifier provided but no code_challenge was issued".to_owned(),
                ));
            }
            return Ok(());
        };

        let verifier = code_verifier.ok_or_else(|| {
            ProtocolError::InvalidGrant("code_verifier is required".to_owned())
        })?;
        if verifier.len() < 43 || verifier.len() > 128 {
            return Err(ProtocolError::InvalidGrant(
                "code_verifier must be between 43 and 128 characters".to_owned(),
            ));
        }
        if !verifier
            .chars()
            .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
        {
            return Err(ProtocolError::InvalidGrant(
                "code_verifier contains characters outside the RFC 7636 unreserved set".to_owned(),
            ));
        }
        let method = grant.code_challenge_method.as_deref().unwrap_or("S256");
        if method != "S256" {
            return Err(ProtocolError::InvalidGrant(
                "only the S256 code_challenge_method is supported".to_owned(),
            ));
        }

        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let computed = general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize());

        // Constant-time comparison
        if computed.as_bytes().ct_eq(stored_challenge.as_bytes()).into() {
            Ok(())
        } else {
            tracing::warn!(
                "PKCE verification failed for client {}",
                grant.client_id
            );
            Err(ProtocolError::InvalidGrant("invalid code_verifier".to_owned()))
        }
    }

    async fn lookup_client(&self, client_id: &str) -> Result<Application, ProtocolError> {
        self.registry
            .get(client_id)
            .await
            .map_err(|e| {
                tracing::error!("Client lookup failed for client_id={}: {:#}", client_id, e);
                ProtocolError::InvalidClient
            })?
            .ok_or(ProtocolError::InvalidClient)
    }

    /// Sweep expired grants and tokens out of the store
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, ProtocolError> {
        self.store.purge_expired(now).await.map_err(storage_error)
    }
}

fn storage_error(error: anyhow::Error) -> ProtocolError {
    tracing::error!("Token store operation failed: {:#}", error);
    ProtocolError::ConfigurationError("token store unavailable".to_owned())
}

fn generation_error(error: anyhow::Error) -> ProtocolError {
    tracing::error!("Secure random generation failed: {:#}", error);
    ProtocolError::ConfigurationError("secure random generation failed".to_owned())
}
