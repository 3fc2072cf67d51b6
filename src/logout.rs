// ABOUTME: Backchannel logout fan-out: one signed logout token per relying application
// ABOUTME: Per-application failures are logged and isolated, never propagated to the caller
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ProtocolError;
use crate::models::{Application, IdToken};
use crate::signing::{LogoutTokenClaims, TokenSigner};
use crate::store::TokenStore;

/// Delivery capability: POST a signed logout token to a relying party
#[async_trait]
pub trait LogoutDelivery: Send + Sync {
    /// Deliver the token; non-2xx responses and transport errors are failures
    async fn post_logout_token(&self, uri: &str, logout_token: &str)
        -> Result<(), ProtocolError>;
}

/// Default delivery over HTTP with a per-notification timeout, so one slow
/// relying party cannot stall the batch
pub struct HttpLogoutDelivery {
    client: reqwest::Client,
}

impl HttpLogoutDelivery {
    /// Build the delivery client with the given per-request timeout
    pub fn new(timeout: std::time::Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LogoutDelivery for HttpLogoutDelivery {
    async fn post_logout_token(
        &self,
        uri: &str,
        logout_token: &str,
    ) -> Result<(), ProtocolError> {
        let response = self
            .client
            .post(uri)
            .form(&[("logout_token", logout_token)])
            .send()
            .await
            .map_err(|e| ProtocolError::DeliveryFailure(format!("POST {uri} failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProtocolError::DeliveryFailure(format!(
                "POST {uri} returned {}",
                response.status()
            )))
        }
    }
}

/// Outcome of one logout fan-out, for observability only
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Applications that received a logout token
    pub notified: usize,
    /// Applications skipped (no backchannel URI, or offline access held)
    pub skipped: usize,
    /// Applications whose dispatch failed (signing or delivery)
    pub failed: usize,
}

/// Fans a user-logout event out to every relying application that should be
/// told, at most once per application
pub struct LogoutDispatcher {
    store: Arc<dyn TokenStore>,
    signer: Arc<dyn TokenSigner>,
    delivery: Arc<dyn LogoutDelivery>,
    issuer_url: String,
}

impl LogoutDispatcher {
    /// Assemble the dispatcher from its collaborators
    #[must_use]
    pub fn new(
        store: Arc<dyn TokenStore>,
        signer: Arc<dyn TokenSigner>,
        delivery: Arc<dyn LogoutDelivery>,
        issuer_url: String,
    ) -> Self {
        Self {
            store,
            signer,
            delivery,
            issuer_url,
        }
    }

    /// Handle a user-logout event.
    ///
    /// Groups the user's ID tokens by application and dispatches exactly one
    /// notification per group. Groups are skipped when the application has no
    /// backchannel URI, or when any ID token in the group carries
    /// `offline_access` (a live refresh capability means the session should
    /// not be force-terminated). Each application's dispatch is isolated: a
    /// signing or delivery failure is logged and the loop continues. The
    /// local logout always succeeds regardless of the summary.
    pub async fn dispatch_user_logout(&self, user_id: Uuid) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        let id_tokens = match self.store.list_id_tokens_for_user(user_id).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!("Failed to list ID tokens for user {}: {:#}", user_id, e);
                return summary;
            }
        };

        let mut by_application: BTreeMap<String, Vec<IdToken>> = BTreeMap::new();
        for token in id_tokens {
            by_application
                .entry(token.client_id.clone())
                .or_default()
                .push(token);
        }

        for (client_id, tokens) in by_application {
            let application = match self.store.get_application(&client_id).await {
                Ok(Some(application)) => application,
                Ok(None) => {
                    tracing::warn!(
                        "ID tokens reference unknown application {}; skipping logout dispatch",
                        client_id
                    );
                    summary.failed += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!("Application lookup failed for {}: {:#}", client_id, e);
                    summary.failed += 1;
                    continue;
                }
            };

            if application.backchannel_logout_uri.is_none() {
                tracing::debug!("Application {} has no backchannel logout URI", client_id);
                summary.skipped += 1;
                continue;
            }
            if tokens.iter().any(|t| t.has_scope("offline_access")) {
                tracing::debug!(
                    "Application {} holds offline access for user {}; not terminating",
                    client_id,
                    user_id
                );
                summary.skipped += 1;
                continue;
            }

            // One representative token per application (dedup invariant)
            let Some(representative) = tokens.first() else {
                continue;
            };
            match self.notify_application(&application, representative).await {
                Ok(()) => {
                    tracing::info!(
                        "Backchannel logout delivered to {} for user {}",
                        client_id,
                        user_id
                    );
                    summary.notified += 1;
                }
                Err(e) => {
                    // Isolation boundary: this application's failure must not
                    // block the rest of the fan-out.
                    tracing::warn!(
                        "Backchannel logout to {} failed for user {}: {}",
                        client_id,
                        user_id,
                        e
                    );
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Sign and deliver one logout token for one application.
    ///
    /// Fails synchronously with a configuration error when the application's
    /// signing algorithm is the `none` sentinel.
    pub async fn notify_application(
        &self,
        application: &Application,
        id_token: &IdToken,
    ) -> Result<(), ProtocolError> {
        let uri = application.backchannel_logout_uri.as_deref().ok_or_else(|| {
            ProtocolError::ConfigurationError(format!(
                "application {} has no backchannel logout URI",
                application.client_id
            ))
        })?;

        let now = Utc::now();
        let claims = LogoutTokenClaims {
            iss: self.issuer_url.clone(),
            sub: id_token.user_id.to_string(),
            aud: application.client_id.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(2)).timestamp(),
            jti: Uuid::new_v4().to_string(),
            events: LogoutTokenClaims::event_claim(),
        };
        let payload = serde_json::to_value(&claims).map_err(|e| {
            ProtocolError::ConfigurationError(format!(
                "failed to serialize logout token claims: {e}"
            ))
        })?;
        let signed = self.signer.sign(&payload, application)?;

        self.delivery.post_logout_token(uri, &signed).await
    }
}
