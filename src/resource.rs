// ABOUTME: RFC 8707 resource-indicator handling: audience prefix matching and binding enforcement
// ABOUTME: Matching is pure and total; binding rejects escalation beyond the authorized set
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use url::Url;

use crate::errors::ProtocolError;

/// Whether `request_uri` is covered by the granted audience set.
///
/// An empty set means the token is unrestricted and matches any request
/// (backward-compatible default). Otherwise some audience must share the
/// request's scheme, host, and port exactly, and its path (a single trailing
/// slash stripped) must equal the request path or be a proper prefix of it at
/// a path-segment boundary. Query strings are not part of the comparison.
/// Unparseable URIs never match.
#[must_use]
pub fn matches_audience(request_uri: &str, granted_audiences: &[String]) -> bool {
    if granted_audiences.is_empty() {
        return true;
    }
    let Ok(request) = Url::parse(request_uri) else {
        return false;
    };
    granted_audiences
        .iter()
        .any(|audience| audience_covers(audience, &request))
}

fn audience_covers(audience: &str, request: &Url) -> bool {
    let Ok(audience) = Url::parse(audience) else {
        return false;
    };
    if audience.scheme() != request.scheme()
        || audience.host_str() != request.host_str()
        || audience.port_or_known_default() != request.port_or_known_default()
    {
        return false;
    }

    // "/foo" covers "/foo" and "/foo/bar" but not "/foobar": the prefix must
    // end at a segment boundary.
    let base = audience.path().strip_suffix('/').unwrap_or(audience.path());
    let path = request.path();
    path == base
        || path
            .strip_prefix(base)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Compute the resource set to bind to a newly issued token.
///
/// With an empty request the caller gets everything it was authorized for.
/// A non-empty request must be an exact-membership subset of
/// `authorized_resources`; the first element outside the set fails with
/// `invalid_target` naming that URI. On success the bound set is the request
/// with duplicates collapsed, first occurrence order preserved.
///
/// Invoked both when exchanging a grant (authorized = the grant's set) and
/// when exercising a refresh token (authorized = the refresh token's ceiling).
pub fn bind_resources(
    requested_resources: &[String],
    authorized_resources: &[String],
) -> Result<Vec<String>, ProtocolError> {
    if requested_resources.is_empty() {
        return Ok(authorized_resources.to_vec());
    }

    let mut bound = Vec::with_capacity(requested_resources.len());
    for uri in requested_resources {
        // Escalation checks are identity-based, not prefix-based: prefix
        // semantics apply only when a resource server validates a bearer token.
        if !authorized_resources.contains(uri) {
            return Err(ProtocolError::invalid_target(uri.clone()));
        }
        if !bound.contains(uri) {
            bound.push(uri.clone());
        }
    }
    Ok(bound)
}
