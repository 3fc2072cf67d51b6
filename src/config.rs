// ABOUTME: Environment-based immutable server configuration
// ABOUTME: Threaded into components at construction; nothing reads ambient global state
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

/// Token and grant lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTtlConfig {
    /// Access-token lifetime in seconds
    pub access_token_ttl_secs: i64,
    /// Refresh-token lifetime in days
    pub refresh_token_ttl_days: i64,
    /// Authorization-code lifetime in seconds
    pub grant_ttl_secs: i64,
    /// ID-token lifetime in seconds
    pub id_token_ttl_secs: i64,
}

impl Default for TokenTtlConfig {
    fn default() -> Self {
        Self {
            access_token_ttl_secs: 3600,
            refresh_token_ttl_days: 30,
            grant_ttl_secs: 600,
            id_token_ttl_secs: 3600,
        }
    }
}

/// Backchannel logout delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackchannelConfig {
    /// Per-notification delivery timeout in seconds; one slow relying party
    /// must not stall the batch
    pub request_timeout_secs: u64,
}

impl Default for BackchannelConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 5,
        }
    }
}

/// Immutable server configuration, loaded from the environment once at
/// startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Issuer URL advertised in discovery and stamped into signed tokens
    pub issuer_url: String,
    /// Token and grant lifetimes
    pub tokens: TokenTtlConfig,
    /// Whether the authorization-code flow requires a PKCE challenge
    pub pkce_required: bool,
    /// Whether using a refresh token revokes it and mints a successor
    pub rotate_refresh_tokens: bool,
    /// Whether a re-authorization revokes the pair's prior access tokens.
    /// Off by default: multiple live tokens per (user, client) are standard
    /// multi-device behavior.
    pub revoke_tokens_on_reauthorize: bool,
    /// Whether bearer validation enforces token audience against the request
    /// URI. Disabling is an explicit opt-out, not a fallback.
    pub audience_validation: bool,
    /// PEM-encoded RSA private key for RS256 signing
    pub rs256_private_key_pem: Option<String>,
    /// Backchannel logout delivery settings
    pub backchannel: BackchannelConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            issuer_url: "http://localhost:8080".to_owned(),
            tokens: TokenTtlConfig::default(),
            pkce_required: true,
            rotate_refresh_tokens: true,
            revoke_tokens_on_reauthorize: false,
            audience_validation: true,
            rs256_private_key_pem: None,
            backchannel: BackchannelConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `TOLLGATE_*` environment variables, falling
    /// back to defaults for anything unset or unparseable.
    ///
    /// # Errors
    /// Currently infallible; the `Result` keeps the startup path uniform for
    /// future validations
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            http_port: env_parse("TOLLGATE_HTTP_PORT", defaults.http_port),
            issuer_url: env::var("TOLLGATE_ISSUER_URL").unwrap_or(defaults.issuer_url),
            tokens: TokenTtlConfig {
                access_token_ttl_secs: env_parse(
                    "TOLLGATE_ACCESS_TOKEN_TTL_SECS",
                    defaults.tokens.access_token_ttl_secs,
                ),
                refresh_token_ttl_days: env_parse(
                    "TOLLGATE_REFRESH_TOKEN_TTL_DAYS",
                    defaults.tokens.refresh_token_ttl_days,
                ),
                grant_ttl_secs: env_parse("TOLLGATE_GRANT_TTL_SECS", defaults.tokens.grant_ttl_secs),
                id_token_ttl_secs: env_parse(
                    "TOLLGATE_ID_TOKEN_TTL_SECS",
                    defaults.tokens.id_token_ttl_secs,
                ),
            },
            pkce_required: env_parse("TOLLGATE_PKCE_REQUIRED", defaults.pkce_required),
            rotate_refresh_tokens: env_parse(
                "TOLLGATE_ROTATE_REFRESH_TOKENS",
                defaults.rotate_refresh_tokens,
            ),
            revoke_tokens_on_reauthorize: env_parse(
                "TOLLGATE_REVOKE_TOKENS_ON_REAUTHORIZE",
                defaults.revoke_tokens_on_reauthorize,
            ),
            audience_validation: env_parse(
                "TOLLGATE_AUDIENCE_VALIDATION",
                defaults.audience_validation,
            ),
            rs256_private_key_pem: env::var("TOLLGATE_RS256_PRIVATE_KEY_PEM").ok(),
            backchannel: BackchannelConfig {
                request_timeout_secs: env_parse(
                    "TOLLGATE_BACKCHANNEL_TIMEOUT_SECS",
                    defaults.backchannel.request_timeout_secs,
                ),
            },
        })
    }
}

/// Parse an environment variable, warning and falling back on bad values
fn env_parse<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid value for {}: {:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.tokens.access_token_ttl_secs, 3600);
        assert_eq!(config.tokens.grant_ttl_secs, 600);
        assert!(config.pkce_required);
        assert!(config.rotate_refresh_tokens);
        assert!(!config.revoke_tokens_on_reauthorize);
        assert!(config.audience_validation);
    }

    #[test]
    fn test_env_parse_fallback_on_garbage() {
        env::set_var("TOLLGATE_TEST_PORT", "not-a-number");
        assert_eq!(env_parse("TOLLGATE_TEST_PORT", 8080u16), 8080);
        env::remove_var("TOLLGATE_TEST_PORT");
    }
}
