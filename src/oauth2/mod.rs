// ABOUTME: OAuth 2.0 protocol surface: grant engine, wire types, and HTTP routes
// ABOUTME: Implements RFC 6749 grants with RFC 8707 resource-indicator binding
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Grant-type state machines and token issuance
pub mod endpoints;
/// RFC 6749/8707 request and response types
pub mod models;
/// HTTP route handlers for the axum transport layer
pub mod routes;

pub use endpoints::AuthorizationServer;
pub use models::{AuthorizeRequest, AuthorizeResponse, TokenRequest, TokenResponse};
