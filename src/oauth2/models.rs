// ABOUTME: OAuth 2.0 wire types for the authorization and token endpoints
// ABOUTME: The repeatable `resource` field carries RFC 8707 resource indicators
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use serde::{Deserialize, Serialize};

/// Authorization endpoint request (RFC 6749 §4.1.1, resource field per
/// RFC 8707 §2)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    /// Response type (`code` or `token`)
    pub response_type: String,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI for the response
    pub redirect_uri: String,
    /// Requested scopes
    pub scope: Option<String>,
    /// State parameter for CSRF protection, echoed back unchanged
    pub state: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method (only S256 is accepted)
    pub code_challenge_method: Option<String>,
    /// Requested resources, repeatable; empty means unrestricted
    #[serde(default)]
    pub resource: Vec<String>,
}

/// Authorization endpoint success response for the code flow
#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    /// Authorization code to exchange at the token endpoint
    pub code: String,
    /// State parameter (if provided in the request)
    pub state: Option<String>,
}

/// Token endpoint request (RFC 6749 §4.1.3/§4.4.2/§6)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    /// Grant type (`authorization_code`, `client_credentials`, `refresh_token`)
    pub grant_type: String,
    /// Authorization code (for `authorization_code`)
    pub code: Option<String>,
    /// Redirect URI, must match the one the code was issued against
    pub redirect_uri: Option<String>,
    /// Client identifier
    pub client_id: String,
    /// Client secret; optional for public clients
    pub client_secret: Option<String>,
    /// Requested scopes (for `client_credentials`)
    pub scope: Option<String>,
    /// Refresh token (for `refresh_token`)
    pub refresh_token: Option<String>,
    /// PKCE code verifier (RFC 7636, for `authorization_code`)
    pub code_verifier: Option<String>,
    /// Requested resources, repeatable; empty requests the full
    /// originally-authorized set
    #[serde(default)]
    pub resource: Vec<String>,
}

/// Token endpoint success response (RFC 6749 §5.1)
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Opaque bearer access token
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    /// Scopes granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Refresh token, when the client's grant type supports refresh
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Signed OpenID Connect ID token, when `openid` scope was granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Token revocation request (RFC 7009 §2.1)
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    /// The token the client wants revoked
    pub token: String,
    /// Hint whether it is an access or refresh token
    pub token_type_hint: Option<String>,
    /// Client identifier
    pub client_id: String,
    /// Client secret; optional for public clients
    pub client_secret: Option<String>,
}

/// Token introspection request (RFC 7662 §2.1)
#[derive(Debug, Deserialize)]
pub struct IntrospectRequest {
    /// The token being introspected
    pub token: String,
    /// Client identifier
    pub client_id: String,
    /// Client secret; optional for public clients
    pub client_secret: Option<String>,
}

/// Token introspection response (RFC 7662 §2.2)
#[derive(Debug, Serialize)]
pub struct IntrospectResponse {
    /// Whether the token is currently live
    pub active: bool,
    /// Granted scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Owning client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Subject, when the token has a user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiry, seconds since epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Bound audience set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Vec<String>>,
}

impl IntrospectResponse {
    /// The fixed body for unknown, expired, or revoked tokens
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            active: false,
            scope: None,
            client_id: None,
            sub: None,
            exp: None,
            aud: None,
        }
    }
}

/// Logout-event request consumed by the backchannel dispatcher entry point
#[derive(Debug, Deserialize)]
pub struct LogoutEventRequest {
    /// The user whose session ended
    pub user: uuid::Uuid,
}
