// ABOUTME: Axum route handlers exposing the protocol surface over HTTP
// ABOUTME: Thin glue: parsing, status mapping, and redirects; all decisions live in the engine
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::{Form, Query};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::endpoints::AuthorizationServer;
use super::models::{
    AuthorizeRequest, IntrospectRequest, IntrospectResponse, LogoutEventRequest, RevokeRequest,
    TokenRequest,
};
use crate::clients::ClientRegistry;
use crate::config::ServerConfig;
use crate::errors::{ErrorResponse, ProtocolError};
use crate::logout::LogoutDispatcher;
use crate::store::TokenStore;

/// Shared state for the route handlers
#[derive(Clone)]
pub struct AppState {
    /// Grant engine
    pub engine: Arc<AuthorizationServer>,
    /// Backchannel logout dispatcher
    pub dispatcher: Arc<LogoutDispatcher>,
    /// Client registry (revocation and introspection authenticate against it)
    pub registry: Arc<ClientRegistry>,
    /// Token store (revocation and introspection read through it)
    pub store: Arc<dyn TokenStore>,
    /// Server configuration
    pub config: Arc<ServerConfig>,
}

/// Assemble the OAuth 2.0 router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(handle_discovery),
        )
        .route("/oauth2/authorize", get(handle_authorize))
        .route("/oauth2/token", post(handle_token))
        .route("/oauth2/introspect", post(handle_introspect))
        .route("/oauth2/revoke", post(handle_revoke))
        .route("/oauth2/backchannel-logout", post(handle_logout_event))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Authorization-server metadata (RFC 8414)
async fn handle_discovery(State(state): State<AppState>) -> Response {
    let issuer = &state.config.issuer_url;
    Json(serde_json::json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth2/authorize"),
        "token_endpoint": format!("{issuer}/oauth2/token"),
        "revocation_endpoint": format!("{issuer}/oauth2/revoke"),
        "grant_types_supported": ["authorization_code", "client_credentials", "refresh_token", "implicit"],
        "response_types_supported": ["code", "token"],
        "token_endpoint_auth_methods_supported": ["client_secret_post"],
        "code_challenge_methods_supported": ["S256"],
        "resource_parameter_supported": true,
    }))
    .into_response()
}

/// Authorization endpoint (GET /oauth2/authorize).
///
/// The session layer in front of this core authenticates the browser user
/// and forwards the identity in `x-authenticated-user`.
async fn handle_authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(request): Query<AuthorizeRequest>,
) -> Response {
    let Some(user_id) = authenticated_user(&headers) else {
        return ProtocolError::InvalidRequest("user authentication required".to_owned())
            .into_response();
    };

    match request.response_type.as_str() {
        "code" => match state.engine.authorize(&request, user_id).await {
            Ok(authorized) => {
                let mut location = format!(
                    "{}?code={}",
                    request.redirect_uri,
                    urlencoding::encode(&authorized.code)
                );
                if let Some(state_value) = &authorized.state {
                    location.push_str("&state=");
                    location.push_str(&urlencoding::encode(state_value));
                }
                redirect(&location)
            }
            Err(error) => error.into_response(),
        },
        "token" => match state.engine.authorize_implicit(&request, user_id).await {
            Ok(tokens) => {
                let mut fragment = format!(
                    "access_token={}&token_type=Bearer&expires_in={}",
                    urlencoding::encode(&tokens.access_token),
                    tokens.expires_in
                );
                if let Some(scope) = &tokens.scope {
                    fragment.push_str("&scope=");
                    fragment.push_str(&urlencoding::encode(scope));
                }
                if let Some(state_value) = &request.state {
                    fragment.push_str("&state=");
                    fragment.push_str(&urlencoding::encode(state_value));
                }
                redirect(&format!("{}#{fragment}", request.redirect_uri))
            }
            Err(error) => error.into_response(),
        },
        other => ProtocolError::InvalidRequest(format!("unsupported response_type: {other}"))
            .into_response(),
    }
}

/// Token endpoint (POST /oauth2/token)
async fn handle_token(
    State(state): State<AppState>,
    Form(request): Form<TokenRequest>,
) -> Response {
    match state.engine.token(request).await {
        Ok(tokens) => (
            StatusCode::OK,
            [(header::CACHE_CONTROL, "no-store")],
            Json(tokens),
        )
            .into_response(),
        Err(error) => error.into_response(),
    }
}

/// Token introspection endpoint (RFC 7662).
///
/// Unknown, expired, and revoked tokens all yield `{"active": false}` so
/// callers cannot probe which of the three applies.
async fn handle_introspect(
    State(state): State<AppState>,
    Form(request): Form<IntrospectRequest>,
) -> Response {
    if let Err(error) = state
        .registry
        .authenticate(&request.client_id, request.client_secret.as_deref())
        .await
    {
        return error.into_response();
    }

    let body = match state.store.get_access_token(&request.token).await {
        Ok(Some(token)) if !token.is_expired(chrono::Utc::now()) => IntrospectResponse {
            active: true,
            scope: token.scope.clone(),
            client_id: Some(token.client_id.clone()),
            sub: token.user_id.map(|id| id.to_string()),
            exp: Some(token.expires_at.timestamp()),
            aud: (!token.resource.is_empty()).then(|| token.resource.clone()),
        },
        Ok(_) => IntrospectResponse::inactive(),
        Err(e) => {
            tracing::error!("Introspection lookup failed: {:#}", e);
            IntrospectResponse::inactive()
        }
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Token revocation endpoint (RFC 7009).
///
/// Returns 200 even for unknown tokens, per the RFC; only failed client
/// authentication is an error.
async fn handle_revoke(
    State(state): State<AppState>,
    Form(request): Form<RevokeRequest>,
) -> Response {
    if let Err(error) = state
        .registry
        .authenticate(&request.client_id, request.client_secret.as_deref())
        .await
    {
        return error.into_response();
    }

    let revoked = match request.token_type_hint.as_deref() {
        Some("refresh_token") => state.store.revoke_refresh_token(&request.token).await,
        Some("access_token") => state.store.revoke_access_token(&request.token).await,
        _ => match state.store.revoke_refresh_token(&request.token).await {
            Ok(true) => Ok(true),
            _ => state.store.revoke_access_token(&request.token).await,
        },
    };

    match revoked {
        Ok(was_revoked) => {
            if was_revoked {
                tracing::info!("Token revoked by client {}", request.client_id);
            }
            StatusCode::OK.into_response()
        }
        Err(e) => {
            tracing::error!("Revocation failed for client {}: {:#}", request.client_id, e);
            ProtocolError::ConfigurationError("token store unavailable".to_owned()).into_response()
        }
    }
}

/// Logout-event entry point: the session teardown path calls this directly
/// instead of relying on implicit event propagation. Always succeeds; the
/// summary reports per-application outcomes.
async fn handle_logout_event(
    State(state): State<AppState>,
    Json(request): Json<LogoutEventRequest>,
) -> Response {
    let summary = state.dispatcher.dispatch_user_logout(request.user).await;
    (StatusCode::OK, Json(summary)).into_response()
}

fn authenticated_user(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("x-authenticated-user")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
}

fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_owned())]).into_response()
}
