// ABOUTME: Bearer token validation for protected-resource requests
// ABOUTME: Audience enforcement is a pluggable strategy; disabled is an explicit state
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::errors::ProtocolError;
use crate::models::scope_set;
use crate::resource::matches_audience;
use crate::store::TokenStore;

/// The identity a validated bearer token acts as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// A resource owner
    User(Uuid),
    /// An application acting for itself (client-credentials tokens)
    Client(String),
}

/// Strategy deciding whether a token's audience set covers a request URI
pub trait AudienceValidator: Send + Sync {
    /// True when the request URI is covered by the granted audience set
    fn matches(&self, request_uri: &str, granted_audiences: &[String]) -> bool;
}

/// Default validator: RFC 8707 URL-prefix semantics at path-segment
/// boundaries
pub struct UrlPrefixAudienceValidator;

impl AudienceValidator for UrlPrefixAudienceValidator {
    fn matches(&self, request_uri: &str, granted_audiences: &[String]) -> bool {
        matches_audience(request_uri, granted_audiences)
    }
}

/// Audience enforcement mode.
///
/// `Disabled` is a deliberate configuration state; there is no null validator
/// that silently matches everything.
#[derive(Clone)]
pub enum AudienceEnforcement {
    /// Check every validated token's audience with the given strategy
    Validator(Arc<dyn AudienceValidator>),
    /// Audience is not checked at all
    Disabled,
}

impl AudienceEnforcement {
    /// Enforcement with the documented default prefix validator
    #[must_use]
    pub fn default_validator() -> Self {
        Self::Validator(Arc::new(UrlPrefixAudienceValidator))
    }
}

/// Validates inbound bearer tokens against scope and audience requirements
pub struct BearerValidator {
    store: Arc<dyn TokenStore>,
    enforcement: AudienceEnforcement,
}

impl BearerValidator {
    /// Create a validator over the given store and enforcement mode
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, enforcement: AudienceEnforcement) -> Self {
        Self { store, enforcement }
    }

    /// Create a validator with enforcement taken from server configuration:
    /// the default prefix validator, or the explicit disabled state
    #[must_use]
    pub fn from_config(store: Arc<dyn TokenStore>, config: &ServerConfig) -> Self {
        let enforcement = if config.audience_validation {
            AudienceEnforcement::default_validator()
        } else {
            AudienceEnforcement::Disabled
        };
        Self::new(store, enforcement)
    }

    /// Validate a bearer token for a protected-resource request.
    ///
    /// Fails `invalid_token` for unknown or expired tokens,
    /// `insufficient_scope` when `required_scopes` is not a subset of the
    /// token's scope, and `invalid_target` (naming the request URI) when
    /// audience enforcement is active and the token's resource set does not
    /// cover the request. Safe to call from any number of concurrent tasks.
    pub async fn validate(
        &self,
        token_value: &str,
        required_scopes: &[&str],
        request_uri: &str,
    ) -> Result<Principal, ProtocolError> {
        let token = self
            .store
            .get_access_token(token_value)
            .await
            .map_err(|e| {
                tracing::error!("Access token lookup failed: {:#}", e);
                ProtocolError::InvalidToken
            })?
            .ok_or(ProtocolError::InvalidToken)?;

        if token.is_expired(Utc::now()) {
            tracing::debug!("Rejected expired access token for {}", token.client_id);
            return Err(ProtocolError::InvalidToken);
        }

        let granted = scope_set(token.scope.as_deref());
        if !required_scopes.iter().all(|scope| granted.contains(scope)) {
            tracing::debug!(
                client_id = %token.client_id,
                "Token scope does not cover required scopes {:?}",
                required_scopes
            );
            return Err(ProtocolError::InsufficientScope);
        }

        if let AudienceEnforcement::Validator(validator) = &self.enforcement {
            if !validator.matches(request_uri, &token.resource) {
                tracing::debug!(
                    client_id = %token.client_id,
                    "Token audience does not cover request URI {}",
                    request_uri
                );
                return Err(ProtocolError::invalid_target(request_uri));
            }
        }

        Ok(token
            .user_id
            .map_or_else(|| Principal::Client(token.client_id.clone()), Principal::User))
    }
}
