// ABOUTME: Core entities for the authorization server: applications, grants, and token records
// ABOUTME: Resource fields carry RFC 8707 audience bindings; empty means unrestricted
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::resource::matches_audience;

/// OAuth 2.0 client type (RFC 6749 §2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    /// Client able to keep its secret confidential (server-side application)
    Confidential,
    /// Client unable to keep a secret (native app, SPA); relies on PKCE
    Public,
}

/// The single grant type an application is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationGrantType {
    /// Authorization-code flow; also enables the refresh-token grant
    AuthorizationCode,
    /// Machine-to-machine flow with no resource-owner involvement
    ClientCredentials,
    /// Legacy implicit flow issuing tokens from the authorization endpoint
    Implicit,
}

impl AuthorizationGrantType {
    /// Wire value as it appears in `grant_type` request fields
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::Implicit => "implicit",
        }
    }
}

/// Signing algorithm for ID tokens and logout tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// No algorithm configured; signing requests fail with a configuration error
    #[serde(rename = "none")]
    None,
    /// RSA-SHA256 with the server keypair
    #[serde(rename = "RS256")]
    Rs256,
    /// HMAC-SHA256 keyed with the application's stored secret
    #[serde(rename = "HS256")]
    Hs256,
}

/// A registered OAuth 2.0 client application.
///
/// Immutable after creation; administrative updates happen outside this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    /// OAuth 2.0 client identifier
    pub client_id: String,
    /// Stored client-secret representation, opaque to this core
    pub client_secret_hash: String,
    /// Confidential or public
    pub client_type: ClientType,
    /// Grant type this client is registered for
    pub grant_type: AuthorizationGrantType,
    /// Registered redirect URIs for the authorization-code and implicit flows
    pub redirect_uris: Vec<String>,
    /// Signing algorithm for ID tokens and logout tokens
    pub algorithm: SigningAlgorithm,
    /// Where to POST signed logout tokens; `None` disables backchannel logout
    pub backchannel_logout_uri: Option<String>,
    /// When this application was registered
    pub created_at: DateTime<Utc>,
}

impl Application {
    /// Whether token exchanges for this client also mint refresh tokens
    #[must_use]
    pub fn allows_refresh(&self) -> bool {
        matches!(self.grant_type, AuthorizationGrantType::AuthorizationCode)
    }
}

/// Short-lived authorization-code record bridging authorization and token
/// issuance. Consumed exactly once by a token exchange, then deleted.
#[derive(Debug, Clone)]
pub struct Grant {
    /// Opaque authorization code
    pub code: String,
    /// Owning application
    pub client_id: String,
    /// Resource owner who authorized the request
    pub user_id: Uuid,
    /// Space-separated requested scope
    pub scope: Option<String>,
    /// Requested resource set, verbatim from the authorization request.
    /// Empty means unrestricted. This is the ceiling for the exchange.
    pub resource: Vec<String>,
    /// Redirect URI the code was issued against
    pub redirect_uri: String,
    /// PKCE code challenge (opaque until exchange-time verification)
    pub code_challenge: Option<String>,
    /// PKCE challenge method
    pub code_challenge_method: Option<String>,
    /// When this code stops being exchangeable
    pub expires_at: DateTime<Utc>,
    /// When this code was issued
    pub created_at: DateTime<Utc>,
}

impl Grant {
    /// Whether the code has passed its expiry
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// An issued bearer access token. Immutable after creation.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Opaque token value presented by clients
    pub token: String,
    /// Owning application
    pub client_id: String,
    /// Owning user; `None` for client-credentials tokens
    pub user_id: Option<Uuid>,
    /// Space-separated granted scope
    pub scope: Option<String>,
    /// Audience the token may be presented to; empty means unrestricted
    pub resource: Vec<String>,
    /// Refresh token that produced this access token, when any
    pub refresh_token: Option<String>,
    /// When this token stops validating
    pub expires_at: DateTime<Utc>,
    /// When this token was issued
    pub created_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token has passed its expiry
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether this token may be presented to `request_uri` (RFC 8707 prefix
    /// semantics; unrestricted tokens match everything)
    #[must_use]
    pub fn allows_audience(&self, request_uri: &str) -> bool {
        matches_audience(request_uri, &self.resource)
    }

    /// Granted scopes as a set
    #[must_use]
    pub fn scope_set(&self) -> BTreeSet<&str> {
        scope_set(self.scope.as_deref())
    }
}

/// A refresh token. Carries the full originally-authorized resource set,
/// which is the ceiling for every token request derived from it.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    /// Opaque token value
    pub token: String,
    /// Owning application
    pub client_id: String,
    /// Owning user
    pub user_id: Uuid,
    /// Space-separated scope carried forward to derived access tokens
    pub scope: Option<String>,
    /// The originally-authorized resource set; survives rotation unchanged
    pub resource: Vec<String>,
    /// Set on rotation or explicit revocation; revoked tokens never validate
    pub revoked: bool,
    /// Current access token derived from this refresh token
    pub access_token: Option<String>,
    /// When this token stops being usable
    pub expires_at: DateTime<Utc>,
    /// When this token was issued
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Whether the token has passed its expiry
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// An issued OpenID Connect ID token record, the substrate for backchannel
/// logout decisions. Several may exist per (user, application) pair.
#[derive(Debug, Clone)]
pub struct IdToken {
    /// Token identifier (`jti` claim)
    pub jti: String,
    /// Owning application
    pub client_id: String,
    /// Subject the token was issued for
    pub user_id: Uuid,
    /// Space-separated scope of the authorization that produced the token
    pub scope: Option<String>,
    /// When the token expires
    pub expires_at: DateTime<Utc>,
    /// When the token was issued
    pub created_at: DateTime<Utc>,
}

impl IdToken {
    /// Whether the authorization behind this token included the given scope
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        scope_set(self.scope.as_deref()).contains(scope)
    }
}

/// Parse a space-separated scope string into a set
#[must_use]
pub fn scope_set(scope: Option<&str>) -> BTreeSet<&str> {
    scope
        .map(|s| s.split_whitespace().collect())
        .unwrap_or_default()
}
