// ABOUTME: Protocol error taxonomy with RFC 6749/8707 wire codes and HTTP status mapping
// ABOUTME: Grant engine and bearer validator failures surface as structured values, never logs
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the grant engine, bearer validator, and logout dispatcher.
///
/// Every variant maps to a wire code from RFC 6749 / RFC 8707 and an HTTP
/// status, so the transport layer renders protocol responses without
/// inspecting message text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Expired, unknown, or already-consumed grant or refresh token
    #[error("invalid or expired grant: {0}")]
    InvalidGrant(String),

    /// Resource escalation attempt or audience mismatch; always names the URI
    #[error("resource {uri} is not covered by the original authorization")]
    InvalidTarget {
        /// The offending resource URI
        uri: String,
    },

    /// Client authentication failed (unknown client or secret mismatch)
    #[error("client authentication failed")]
    InvalidClient,

    /// The client is not registered for the grant or response type it used
    #[error("unauthorized client: {0}")]
    UnauthorizedClient(String),

    /// Malformed or incomplete protocol request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A `grant_type` this server does not issue tokens for
    #[error("grant type not supported")]
    UnsupportedGrantType,

    /// Bearer token unknown or expired
    #[error("invalid or expired access token")]
    InvalidToken,

    /// Bearer token lacks a required scope
    #[error("token scope does not cover this request")]
    InsufficientScope,

    /// Server-side misconfiguration, e.g. a signing algorithm of `none`
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// An outbound backchannel delivery failed (non-2xx or transport error)
    #[error("logout token delivery failed: {0}")]
    DeliveryFailure(String),
}

impl ProtocolError {
    /// Escalation or audience-mismatch error naming the offending URI
    pub fn invalid_target(uri: impl Into<String>) -> Self {
        Self::InvalidTarget { uri: uri.into() }
    }

    /// The RFC 6749/8707/6750 error code for the wire body
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidTarget { .. } => "invalid_target",
            Self::InvalidClient => "invalid_client",
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidToken => "invalid_token",
            Self::InsufficientScope => "insufficient_scope",
            Self::ConfigurationError(_) => "server_error",
            Self::DeliveryFailure(_) => "temporarily_unavailable",
        }
    }

    /// HTTP status for the protocol response: 400 for request-level errors,
    /// 401 for bearer-validation failures, 5xx for server-side faults
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidGrant(_)
            | Self::InvalidTarget { .. }
            | Self::InvalidClient
            | Self::UnauthorizedClient(_)
            | Self::InvalidRequest(_)
            | Self::UnsupportedGrantType => 400,

            Self::InvalidToken | Self::InsufficientScope => 401,

            Self::ConfigurationError(_) => 500,
            Self::DeliveryFailure(_) => 502,
        }
    }
}

/// RFC 6749 §5.2 error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code from the taxonomy
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// URI with further error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl From<&ProtocolError> for ErrorResponse {
    fn from(error: &ProtocolError) -> Self {
        let error_uri = match error {
            ProtocolError::InvalidTarget { .. } => {
                Some("https://datatracker.ietf.org/doc/html/rfc8707#section-3".to_owned())
            }
            ProtocolError::InvalidToken | ProtocolError::InsufficientScope => {
                Some("https://datatracker.ietf.org/doc/html/rfc6750#section-3.1".to_owned())
            }
            ProtocolError::ConfigurationError(_) | ProtocolError::DeliveryFailure(_) => None,
            _ => Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        };
        Self {
            error: error.error_code().to_owned(),
            error_description: Some(error.to_string()),
            error_uri,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ProtocolError::InvalidGrant("gone".into()).http_status(), 400);
        assert_eq!(
            ProtocolError::invalid_target("https://evil.example.com").http_status(),
            400
        );
        assert_eq!(ProtocolError::InvalidClient.http_status(), 400);
        assert_eq!(ProtocolError::InvalidToken.http_status(), 401);
        assert_eq!(ProtocolError::InsufficientScope.http_status(), 401);
        assert_eq!(
            ProtocolError::ConfigurationError("no key".into()).http_status(),
            500
        );
    }

    #[test]
    fn test_invalid_target_names_offending_uri() {
        let error = ProtocolError::invalid_target("https://evil.example.com/admin");
        let body = ErrorResponse::from(&error);

        assert_eq!(body.error, "invalid_target");
        let description = body.error_description.unwrap();
        assert!(description.contains("https://evil.example.com/admin"));
    }

    #[test]
    fn test_error_response_serialization() {
        let body = ErrorResponse::from(&ProtocolError::UnsupportedGrantType);
        let json = serde_json::to_string(&body).unwrap();

        assert!(json.contains("unsupported_grant_type"));
        assert!(json.contains("rfc6749"));
    }
}
