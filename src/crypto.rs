// ABOUTME: Secure random generation for codes, token values, and client credentials
// ABOUTME: All values are URL-safe base64 over system-RNG bytes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};

/// Generate a URL-safe random string from `length` bytes of system randomness.
///
/// # Errors
/// Returns an error if the system RNG fails - this is a critical security
/// failure and the server cannot operate without working randomness
pub fn random_urlsafe(length: usize) -> Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; length];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!(
            "CRITICAL: SystemRandom failed - cannot generate secure random bytes: {}",
            e
        );
        anyhow!("system RNG failure")
    })?;

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&bytes))
}

/// Generate an opaque token or authorization-code value (256 bits)
pub fn random_token() -> Result<String> {
    random_urlsafe(32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_token_shape() {
        let token = random_token().unwrap();
        // 32 bytes -> 43 chars of unpadded base64url
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_random_tokens_are_unique() {
        assert_ne!(random_token().unwrap(), random_token().unwrap());
    }
}
