// ABOUTME: Client registration and authentication: secrets are argon2-hashed at rest
// ABOUTME: Authentication failures surface as invalid_client, unchanged through the engine
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use anyhow::{anyhow, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use std::sync::Arc;

use crate::crypto;
use crate::errors::ProtocolError;
use crate::models::{Application, AuthorizationGrantType, ClientType, SigningAlgorithm};
use crate::store::TokenStore;

/// Parameters for registering a new application
#[derive(Debug, Clone)]
pub struct NewApplication {
    /// Confidential or public
    pub client_type: ClientType,
    /// Grant type the client may use
    pub grant_type: AuthorizationGrantType,
    /// Redirect URIs for browser-based flows
    pub redirect_uris: Vec<String>,
    /// ID-token and logout-token signing algorithm
    pub algorithm: SigningAlgorithm,
    /// Backchannel logout endpoint, if the relying party has one
    pub backchannel_logout_uri: Option<String>,
}

/// Credentials returned once at registration time.
///
/// The plaintext secret is never stored; only its argon2 hash is.
#[derive(Debug)]
pub struct IssuedCredentials {
    /// Generated client identifier
    pub client_id: String,
    /// Generated plaintext secret, shown exactly once
    pub client_secret: String,
}

/// Registry over the store's application records.
///
/// Owns the credential concerns the rest of the core treats as opaque:
/// secret generation, hashing, and constant-time verification.
pub struct ClientRegistry {
    store: Arc<dyn TokenStore>,
}

impl ClientRegistry {
    /// Create a registry backed by the given store
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Register an application, generating its credentials.
    ///
    /// # Errors
    /// Returns an error if credential generation, hashing, or persistence fails
    pub async fn register(&self, request: NewApplication) -> Result<IssuedCredentials> {
        let client_id = crypto::random_urlsafe(16)?;
        let client_secret = crypto::random_urlsafe(32)?;

        let application = Application {
            client_id: client_id.clone(),
            client_secret_hash: hash_secret(&client_secret)?,
            client_type: request.client_type,
            grant_type: request.grant_type,
            redirect_uris: request.redirect_uris,
            algorithm: request.algorithm,
            backchannel_logout_uri: request.backchannel_logout_uri,
            created_at: Utc::now(),
        };
        self.store.create_application(&application).await?;

        tracing::info!("Registered OAuth client {}", client_id);
        Ok(IssuedCredentials {
            client_id,
            client_secret,
        })
    }

    /// Look up an application without authenticating it
    pub async fn get(&self, client_id: &str) -> Result<Option<Application>> {
        self.store.get_application(client_id).await
    }

    /// Authenticate a `client_id`/`client_secret` pair.
    ///
    /// Public clients registered without a usable secret may authenticate by
    /// identifier alone (their proof of possession is PKCE). Every failure
    /// collapses to `invalid_client` so callers cannot distinguish unknown
    /// clients from bad secrets.
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<Application, ProtocolError> {
        let application = self
            .store
            .get_application(client_id)
            .await
            .map_err(|e| {
                tracing::error!("Client lookup failed for client_id={}: {:#}", client_id, e);
                ProtocolError::InvalidClient
            })?
            .ok_or_else(|| {
                tracing::warn!("Unknown OAuth client: {}", client_id);
                ProtocolError::InvalidClient
            })?;

        match (application.client_type, client_secret) {
            (ClientType::Public, None | Some("")) => Ok(application),
            (_, Some(secret)) if verify_secret(secret, &application.client_secret_hash) => {
                Ok(application)
            }
            _ => {
                tracing::warn!("Client secret verification failed for {}", client_id);
                Err(ProtocolError::InvalidClient)
            }
        }
    }
}

/// Hash a plaintext secret for storage
fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("failed to hash client secret: {e}"))
}

/// Verify a plaintext secret against its stored hash in constant time
fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTokenStore;

    fn confidential_request() -> NewApplication {
        NewApplication {
            client_type: ClientType::Confidential,
            grant_type: AuthorizationGrantType::AuthorizationCode,
            redirect_uris: vec!["https://client.example.com/callback".to_owned()],
            algorithm: SigningAlgorithm::Rs256,
            backchannel_logout_uri: None,
        }
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let registry = ClientRegistry::new(Arc::new(MemoryTokenStore::new()));
        let credentials = registry.register(confidential_request()).await.unwrap();

        let application = registry
            .authenticate(&credentials.client_id, Some(&credentials.client_secret))
            .await
            .unwrap();
        assert_eq!(application.client_id, credentials.client_id);
        // the stored representation is a hash, not the secret
        assert_ne!(application.client_secret_hash, credentials.client_secret);
    }

    #[tokio::test]
    async fn test_wrong_secret_is_invalid_client() {
        let registry = ClientRegistry::new(Arc::new(MemoryTokenStore::new()));
        let credentials = registry.register(confidential_request()).await.unwrap();

        let err = registry
            .authenticate(&credentials.client_id, Some("wrong-secret"))
            .await
            .unwrap_err();
        assert_eq!(err, ProtocolError::InvalidClient);
    }

    #[tokio::test]
    async fn test_unknown_client_is_invalid_client() {
        let registry = ClientRegistry::new(Arc::new(MemoryTokenStore::new()));
        let err = registry
            .authenticate("nobody", Some("secret"))
            .await
            .unwrap_err();
        assert_eq!(err, ProtocolError::InvalidClient);
    }

    #[tokio::test]
    async fn test_public_client_may_omit_secret() {
        let registry = ClientRegistry::new(Arc::new(MemoryTokenStore::new()));
        let mut request = confidential_request();
        request.client_type = ClientType::Public;
        let credentials = registry.register(request).await.unwrap();

        assert!(registry
            .authenticate(&credentials.client_id, None)
            .await
            .is_ok());
    }
}
