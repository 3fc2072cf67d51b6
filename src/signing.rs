// ABOUTME: Token signing capability for ID tokens and backchannel logout tokens
// ABOUTME: RS256 uses the server keypair, HS256 the application's stored secret, none always fails
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;

use crate::errors::ProtocolError;
use crate::models::{Application, SigningAlgorithm};

/// OpenID Connect ID token claims
#[derive(Debug, Serialize)]
pub struct IdTokenClaims {
    /// Issuer URL of this server
    pub iss: String,
    /// Subject (user identity)
    pub sub: String,
    /// Audience (client identifier)
    pub aud: String,
    /// Expiry, seconds since epoch
    pub exp: i64,
    /// Issued-at, seconds since epoch
    pub iat: i64,
    /// Token identifier
    pub jti: String,
}

/// OIDC backchannel logout token claims
#[derive(Debug, Serialize)]
pub struct LogoutTokenClaims {
    /// Issuer URL of this server
    pub iss: String,
    /// Subject (user identity being logged out)
    pub sub: String,
    /// Audience (client identifier)
    pub aud: String,
    /// Issued-at, seconds since epoch
    pub iat: i64,
    /// Expiry, seconds since epoch
    pub exp: i64,
    /// Random token identifier
    pub jti: String,
    /// The backchannel-logout event claim
    pub events: serde_json::Value,
}

impl LogoutTokenClaims {
    /// The member the `events` claim must carry per OIDC backchannel logout
    pub const EVENT_URI: &'static str = "http://schemas.openid.net/event/backchannel-logout";

    /// The `events` value: a single-member object keyed by the event URI
    #[must_use]
    pub fn event_claim() -> serde_json::Value {
        serde_json::json!({ Self::EVENT_URI: {} })
    }
}

/// Signing capability consumed by the grant engine and logout dispatcher
pub trait TokenSigner: Send + Sync {
    /// Sign `claims` for `application` using its configured algorithm.
    ///
    /// # Errors
    /// Fails with a configuration error when the application's algorithm is
    /// the `none` sentinel or the required key material is missing
    fn sign(
        &self,
        claims: &serde_json::Value,
        application: &Application,
    ) -> Result<String, ProtocolError>;
}

/// Default signer backed by `jsonwebtoken`
pub struct JwtSigner {
    rs256_private_key_pem: Option<String>,
}

impl JwtSigner {
    /// Create a signer; `rs256_private_key_pem` is required only for
    /// applications configured with RS256
    #[must_use]
    pub fn new(rs256_private_key_pem: Option<String>) -> Self {
        Self {
            rs256_private_key_pem,
        }
    }
}

impl TokenSigner for JwtSigner {
    fn sign(
        &self,
        claims: &serde_json::Value,
        application: &Application,
    ) -> Result<String, ProtocolError> {
        let (header, key) = match application.algorithm {
            SigningAlgorithm::None => {
                return Err(ProtocolError::ConfigurationError(format!(
                    "application {} has no signing algorithm configured",
                    application.client_id
                )));
            }
            SigningAlgorithm::Rs256 => {
                let pem = self.rs256_private_key_pem.as_ref().ok_or_else(|| {
                    ProtocolError::ConfigurationError(
                        "RS256 requested but no private key is configured".to_owned(),
                    )
                })?;
                let key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                    ProtocolError::ConfigurationError(format!("invalid RS256 private key: {e}"))
                })?;
                (Header::new(Algorithm::RS256), key)
            }
            SigningAlgorithm::Hs256 => (
                Header::new(Algorithm::HS256),
                EncodingKey::from_secret(application.client_secret_hash.as_bytes()),
            ),
        };

        encode(&header, claims, &key).map_err(|e| {
            ProtocolError::ConfigurationError(format!(
                "failed to sign token for {}: {e}",
                application.client_id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthorizationGrantType, ClientType};
    use chrono::Utc;

    fn application(algorithm: SigningAlgorithm) -> Application {
        Application {
            client_id: "client-1".to_owned(),
            client_secret_hash: "stored-secret-material".to_owned(),
            client_type: ClientType::Confidential,
            grant_type: AuthorizationGrantType::AuthorizationCode,
            redirect_uris: vec![],
            algorithm,
            backchannel_logout_uri: None,
            created_at: Utc::now(),
        }
    }

    fn claims() -> serde_json::Value {
        serde_json::json!({
            "iss": "https://issuer.example.com",
            "sub": "user-1",
            "aud": "client-1",
            "iat": Utc::now().timestamp(),
            "exp": Utc::now().timestamp() + 120,
        })
    }

    #[test]
    fn test_hs256_produces_compact_jwt() {
        let signer = JwtSigner::new(None);
        let token = signer
            .sign(&claims(), &application(SigningAlgorithm::Hs256))
            .unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_none_algorithm_is_configuration_error() {
        let signer = JwtSigner::new(None);
        let err = signer
            .sign(&claims(), &application(SigningAlgorithm::None))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ConfigurationError(_)));
    }

    #[test]
    fn test_rs256_without_key_is_configuration_error() {
        let signer = JwtSigner::new(None);
        let err = signer
            .sign(&claims(), &application(SigningAlgorithm::Rs256))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ConfigurationError(_)));
    }

    #[test]
    fn test_logout_event_claim_shape() {
        let events = LogoutTokenClaims::event_claim();
        assert!(events.get(LogoutTokenClaims::EVENT_URI).is_some());
    }
}
