// ABOUTME: Library entry point for the tollgate authorization server core
// ABOUTME: Grant lifecycle, RFC 8707 resource binding, and backchannel logout fan-out
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![deny(unsafe_code)]

//! # Tollgate
//!
//! An OAuth 2.0 / OpenID Connect authorization-server core. It issues,
//! validates, narrows, and revokes tokens across the standard grant types,
//! enforces RFC 8707 resource-indicator (audience) binding, and notifies
//! relying applications of user logout via signed backchannel logout tokens.
//!
//! ## Architecture
//!
//! - **Grant engine** ([`oauth2::AuthorizationServer`]): the four grant-type
//!   state machines, persisting through the token store
//! - **Resource enforcer** ([`resource`]): audience prefix matching and
//!   escalation-rejecting resource binding
//! - **Bearer validator** ([`auth::BearerValidator`]): scope and audience
//!   checks for protected-resource requests
//! - **Logout dispatcher** ([`logout::LogoutDispatcher`]): per-application
//!   signed logout-token fan-out with failure isolation
//!
//! External collaborators are consumed as capabilities: the datastore behind
//! [`store::TokenStore`], signing behind [`signing::TokenSigner`], and
//! delivery behind [`logout::LogoutDelivery`], each with a documented default
//! implementation.

/// Bearer token validation for protected-resource requests
pub mod auth;

/// Client registration and authentication
pub mod clients;

/// Environment-based immutable configuration
pub mod config;

/// Secure random generation for codes and token values
pub mod crypto;

/// Protocol error taxonomy with HTTP mapping
pub mod errors;

/// Structured logging setup
pub mod logging;

/// Backchannel logout dispatcher and delivery capability
pub mod logout;

/// Core entities: applications, grants, and token records
pub mod models;

/// OAuth 2.0 protocol surface: grant engine, wire types, routes
pub mod oauth2;

/// RFC 8707 audience matching and resource binding
pub mod resource;

/// Token signing capability for ID tokens and logout tokens
pub mod signing;

/// Token store contract and the in-process reference implementation
pub mod store;
