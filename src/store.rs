// ABOUTME: Token store contract and the in-process reference implementation
// ABOUTME: Grant consumption and refresh rotation rely on per-record atomic primitives
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{AccessToken, Application, Grant, IdToken, RefreshToken};

/// CRUD and lifecycle operations over the server's entities.
///
/// All shared state between requests lives behind this trait; implementations
/// must provide per-record atomicity for `consume_grant` (read+delete in one
/// operation, invariant: a grant is exchanged at most once) and
/// `consume_refresh_token` (validate+revoke in one operation, so rotation
/// never leaves a window where predecessor and successor both validate).
#[async_trait]
pub trait TokenStore: Send + Sync {
    // ================================
    // Applications
    // ================================

    /// Persist a newly registered application; fails on duplicate client id
    async fn create_application(&self, application: &Application) -> Result<()>;

    /// Look up an application by client id
    async fn get_application(&self, client_id: &str) -> Result<Option<Application>>;

    // ================================
    // Grants
    // ================================

    /// Persist an authorization-code grant
    async fn create_grant(&self, grant: &Grant) -> Result<()>;

    /// Atomically consume a grant: the record is returned and deleted only if
    /// client id and redirect URI match and the code has not expired.
    /// Returns `None` for unknown, already-consumed, expired, or mismatched
    /// codes.
    async fn consume_grant(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Grant>>;

    // ================================
    // Access tokens
    // ================================

    /// Persist an access token; fails on duplicate token value
    async fn create_access_token(&self, token: &AccessToken) -> Result<()>;

    /// Look up an access token by value
    async fn get_access_token(&self, token: &str) -> Result<Option<AccessToken>>;

    /// Delete an access token; returns whether a record existed
    async fn revoke_access_token(&self, token: &str) -> Result<bool>;

    /// Delete every access token owned by the (user, application) pair;
    /// returns the number removed
    async fn revoke_access_tokens_for(&self, user_id: Uuid, client_id: &str) -> Result<u64>;

    // ================================
    // Refresh tokens
    // ================================

    /// Persist a refresh token; fails on duplicate token value
    async fn create_refresh_token(&self, token: &RefreshToken) -> Result<()>;

    /// Look up a refresh token by value (revoked records included)
    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>>;

    /// Atomically validate and revoke a refresh token for rotation. The
    /// pre-revocation record is returned only if the client id matches and
    /// the token was neither revoked nor expired; concurrent consumers see
    /// `None`.
    async fn consume_refresh_token(
        &self,
        token: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>>;

    /// Mark a refresh token revoked; returns whether a live record existed
    async fn revoke_refresh_token(&self, token: &str) -> Result<bool>;

    /// Point a reused refresh token at the access token it most recently
    /// produced
    async fn link_access_token(&self, refresh_token: &str, access_token: &str) -> Result<bool>;

    // ================================
    // ID tokens
    // ================================

    /// Persist an ID token record
    async fn create_id_token(&self, token: &IdToken) -> Result<()>;

    /// All ID token records for a user, across applications
    async fn list_id_tokens_for_user(&self, user_id: Uuid) -> Result<Vec<IdToken>>;

    // ================================
    // Maintenance
    // ================================

    /// Delete expired grants, access tokens, refresh tokens, and ID tokens;
    /// returns the number of records removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// In-process reference store.
///
/// `DashMap` provides lock-free reads and sharded write locks; `remove_if`
/// is the compare-and-delete primitive that makes grant consumption a single
/// atomic operation, and `get_mut` holds the record's shard lock across the
/// validate+revoke step of refresh rotation.
#[derive(Default)]
pub struct MemoryTokenStore {
    applications: DashMap<String, Application>,
    grants: DashMap<String, Grant>,
    access_tokens: DashMap<String, AccessToken>,
    refresh_tokens: DashMap<String, RefreshToken>,
    id_tokens: DashMap<String, IdToken>,
}

impl MemoryTokenStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create_application(&self, application: &Application) -> Result<()> {
        if self.applications.contains_key(&application.client_id) {
            bail!("client_id already registered: {}", application.client_id);
        }
        self.applications
            .insert(application.client_id.clone(), application.clone());
        Ok(())
    }

    async fn get_application(&self, client_id: &str) -> Result<Option<Application>> {
        Ok(self.applications.get(client_id).map(|a| a.clone()))
    }

    async fn create_grant(&self, grant: &Grant) -> Result<()> {
        if self.grants.contains_key(&grant.code) {
            bail!("authorization code collision");
        }
        self.grants.insert(grant.code.clone(), grant.clone());
        Ok(())
    }

    async fn consume_grant(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Grant>> {
        Ok(self
            .grants
            .remove_if(code, |_, grant| {
                grant.client_id == client_id
                    && grant.redirect_uri == redirect_uri
                    && !grant.is_expired(now)
            })
            .map(|(_, grant)| grant))
    }

    async fn create_access_token(&self, token: &AccessToken) -> Result<()> {
        if self.access_tokens.contains_key(&token.token) {
            bail!("access token collision");
        }
        self.access_tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_access_token(&self, token: &str) -> Result<Option<AccessToken>> {
        Ok(self.access_tokens.get(token).map(|t| t.clone()))
    }

    async fn revoke_access_token(&self, token: &str) -> Result<bool> {
        Ok(self.access_tokens.remove(token).is_some())
    }

    async fn revoke_access_tokens_for(&self, user_id: Uuid, client_id: &str) -> Result<u64> {
        let before = self.access_tokens.len();
        self.access_tokens
            .retain(|_, t| !(t.user_id == Some(user_id) && t.client_id == client_id));
        Ok((before - self.access_tokens.len()) as u64)
    }

    async fn create_refresh_token(&self, token: &RefreshToken) -> Result<()> {
        if self.refresh_tokens.contains_key(&token.token) {
            bail!("refresh token collision");
        }
        self.refresh_tokens
            .insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>> {
        Ok(self.refresh_tokens.get(token).map(|t| t.clone()))
    }

    async fn consume_refresh_token(
        &self,
        token: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>> {
        let Some(mut entry) = self.refresh_tokens.get_mut(token) else {
            return Ok(None);
        };
        if entry.revoked || entry.client_id != client_id || entry.is_expired(now) {
            return Ok(None);
        }
        let consumed = entry.clone();
        entry.revoked = true;
        Ok(Some(consumed))
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<bool> {
        let Some(mut entry) = self.refresh_tokens.get_mut(token) else {
            return Ok(false);
        };
        let was_live = !entry.revoked;
        entry.revoked = true;
        Ok(was_live)
    }

    async fn link_access_token(&self, refresh_token: &str, access_token: &str) -> Result<bool> {
        let Some(mut entry) = self.refresh_tokens.get_mut(refresh_token) else {
            return Ok(false);
        };
        entry.access_token = Some(access_token.to_owned());
        Ok(true)
    }

    async fn create_id_token(&self, token: &IdToken) -> Result<()> {
        if self.id_tokens.contains_key(&token.jti) {
            bail!("id token jti collision");
        }
        self.id_tokens.insert(token.jti.clone(), token.clone());
        Ok(())
    }

    async fn list_id_tokens_for_user(&self, user_id: Uuid) -> Result<Vec<IdToken>> {
        let mut tokens: Vec<IdToken> = self
            .id_tokens
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.clone())
            .collect();
        // Deterministic order for callers that pick a representative token
        tokens.sort_by(|a, b| a.jti.cmp(&b.jti));
        Ok(tokens)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let before = self.grants.len()
            + self.access_tokens.len()
            + self.refresh_tokens.len()
            + self.id_tokens.len();

        self.grants.retain(|_, g| !g.is_expired(now));
        self.access_tokens.retain(|_, t| !t.is_expired(now));
        self.refresh_tokens.retain(|_, t| !t.is_expired(now));
        self.id_tokens.retain(|_, t| t.expires_at > now);

        let after = self.grants.len()
            + self.access_tokens.len()
            + self.refresh_tokens.len()
            + self.id_tokens.len();
        Ok((before - after) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthorizationGrantType, ClientType, SigningAlgorithm};
    use chrono::Duration;

    fn sample_grant(code: &str) -> Grant {
        Grant {
            code: code.to_owned(),
            client_id: "client-1".to_owned(),
            user_id: Uuid::new_v4(),
            scope: Some("read".to_owned()),
            resource: vec![],
            redirect_uri: "https://client.example.com/callback".to_owned(),
            code_challenge: None,
            code_challenge_method: None,
            expires_at: Utc::now() + Duration::minutes(10),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_grant_consumed_exactly_once() {
        let store = MemoryTokenStore::new();
        store.create_grant(&sample_grant("code-1")).await.unwrap();

        let first = store
            .consume_grant(
                "code-1",
                "client-1",
                "https://client.example.com/callback",
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .consume_grant(
                "code-1",
                "client-1",
                "https://client.example.com/callback",
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_grant_consume_checks_client_and_redirect() {
        let store = MemoryTokenStore::new();
        store.create_grant(&sample_grant("code-2")).await.unwrap();

        let wrong_client = store
            .consume_grant(
                "code-2",
                "client-other",
                "https://client.example.com/callback",
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(wrong_client.is_none());

        let wrong_redirect = store
            .consume_grant("code-2", "client-1", "https://elsewhere.example.com", Utc::now())
            .await
            .unwrap();
        assert!(wrong_redirect.is_none());

        // the failed attempts must not have burned the record
        let valid = store
            .consume_grant(
                "code-2",
                "client-1",
                "https://client.example.com/callback",
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(valid.is_some());
    }

    #[tokio::test]
    async fn test_refresh_token_consumed_exactly_once() {
        let store = MemoryTokenStore::new();
        let token = RefreshToken {
            token: "rt-1".to_owned(),
            client_id: "client-1".to_owned(),
            user_id: Uuid::new_v4(),
            scope: None,
            resource: vec![],
            revoked: false,
            access_token: None,
            expires_at: Utc::now() + Duration::days(30),
            created_at: Utc::now(),
        };
        store.create_refresh_token(&token).await.unwrap();

        let first = store
            .consume_refresh_token("rt-1", "client-1", Utc::now())
            .await
            .unwrap();
        assert!(first.is_some());
        assert!(!first.unwrap().revoked);

        let second = store
            .consume_refresh_token("rt-1", "client-1", Utc::now())
            .await
            .unwrap();
        assert!(second.is_none());

        // the record survives, marked revoked
        let stored = store.get_refresh_token("rt-1").await.unwrap().unwrap();
        assert!(stored.revoked);
    }

    #[tokio::test]
    async fn test_duplicate_application_rejected() {
        let store = MemoryTokenStore::new();
        let app = Application {
            client_id: "dup".to_owned(),
            client_secret_hash: String::new(),
            client_type: ClientType::Confidential,
            grant_type: AuthorizationGrantType::AuthorizationCode,
            redirect_uris: vec![],
            algorithm: SigningAlgorithm::None,
            backchannel_logout_uri: None,
            created_at: Utc::now(),
        };
        store.create_application(&app).await.unwrap();
        assert!(store.create_application(&app).await.is_err());
    }

    #[tokio::test]
    async fn test_purge_expired_sweeps_all_entity_kinds() {
        let store = MemoryTokenStore::new();
        let past = Utc::now() - Duration::hours(1);

        let mut grant = sample_grant("stale");
        grant.expires_at = past;
        store.create_grant(&grant).await.unwrap();

        store
            .create_access_token(&AccessToken {
                token: "at-stale".to_owned(),
                client_id: "client-1".to_owned(),
                user_id: None,
                scope: None,
                resource: vec![],
                refresh_token: None,
                expires_at: past,
                created_at: past,
            })
            .await
            .unwrap();

        let purged = store.purge_expired(Utc::now()).await.unwrap();
        assert_eq!(purged, 2);
        assert!(store.get_access_token("at-stale").await.unwrap().is_none());
    }
}
