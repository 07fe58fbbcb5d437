//! JWT utilities shared across the portal crates.
//!
//! The portal decodes access-token payloads **without verifying the
//! signature**. Decoded claims are only used for routing decisions (is the
//! session expired, may this user see the admin pages); the BMS backend
//! verifies the signature on every API call and remains the only trust
//! boundary. Do not add signature verification here.
//!
//! This module provides:
//! - Size limit applied before any parsing
//! - Base64url payload decoding into [`PortalClaims`]
//! - Expiry checks against an explicit `now`
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::decode_unverified_claims;
//!
//! let claims = decode_unverified_claims(token)?;
//! if claims.is_expired_at(chrono::Utc::now().timestamp()) {
//!     // send the browser back to /login
//! }
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted JWT size in bytes (8KB).
///
/// Tokens larger than this are rejected before base64 decoding. Keycloak
/// access tokens with a handful of realm roles are typically 1-2KB.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while decoding a JWT payload.
///
/// Messages are generic; details are logged at debug level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtDecodeError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not a three-part JWT with a base64url JSON payload.
    #[error("The access token is invalid or expired")]
    MalformedToken,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Claims read from an access token payload.
///
/// Only the claims the portal routes on are kept. `sub` and `email` are
/// redacted in Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct PortalClaims {
    /// Subject (Keycloak user id).
    pub sub: Option<String>,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: Option<i64>,

    /// Email claim, if the `email` scope was granted.
    pub email: Option<String>,

    /// Backend-specific `role` claim.
    ///
    /// `None` when the claim is absent. A string becomes a single entry, an
    /// array keeps its string entries, and any other JSON type becomes an
    /// empty list (present, but grants nothing).
    pub roles: Option<Vec<String>>,
}

impl fmt::Debug for PortalClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalClaims")
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("roles", &self.roles)
            .finish()
    }
}

impl PortalClaims {
    /// Whether the token is expired at `now` (Unix seconds).
    ///
    /// A token without `exp` is treated as expired: no locally decoded claim
    /// is trusted for routing unless its lifetime can be checked.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.exp {
            Some(exp) => exp < now,
            None => true,
        }
    }

    /// Whether any of the token's roles is in `allowed`.
    #[must_use]
    pub fn has_any_role(&self, allowed: &[&str]) -> bool {
        self.roles
            .as_ref()
            .is_some_and(|roles| roles.iter().any(|r| allowed.contains(&r.as_str())))
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Decode the payload of a JWT without verifying its signature.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong number of segments, bad base64url, or the
///   payload is not a JSON object
pub fn decode_unverified_claims(token: &str) -> Result<PortalClaims, JwtDecodeError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtDecodeError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    let (Some(_header), Some(payload_part), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtDecodeError::MalformedToken);
    };

    // Some issuers pad their segments; strip it so URL_SAFE_NO_PAD accepts them.
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_part.trim_end_matches('='))
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT payload base64");
            JwtDecodeError::MalformedToken
        })?;

    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT payload JSON");
        JwtDecodeError::MalformedToken
    })?;

    let object = payload.as_object().ok_or_else(|| {
        tracing::debug!(target: "common.jwt", "JWT payload is not a JSON object");
        JwtDecodeError::MalformedToken
    })?;

    let string_claim = |name: &str| {
        object
            .get(name)
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string)
    };
    let timestamp_claim = |name: &str| object.get(name).and_then(numeric_date);

    let roles = object.get("role").map(|value| match value {
        serde_json::Value::String(role) => vec![role.clone()],
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(serde_json::Value::as_str)
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    });

    Ok(PortalClaims {
        sub: string_claim("sub"),
        exp: timestamp_claim("exp"),
        iat: timestamp_claim("iat"),
        email: string_claim("email"),
        roles,
    })
}

/// Read a JWT NumericDate, which may be an integer or a float.
///
/// Fractions are sub-second and truncated.
#[allow(clippy::cast_possible_truncation)]
fn numeric_date(value: &serde_json::Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
}

// =============================================================================
// Tests
// =============================================================================
