//! Service layer for the portal gateway.
//!
//! Clients for the external systems the gateway talks to over HTTP.
//!
//! # Components
//!
//! - `keycloak` - OIDC authorization-code flow against Keycloak
//! - `bms_client` - BMS backend userinfo lookup and request forwarding

pub mod bms_client;
pub mod keycloak;

pub use bms_client::{BmsClient, BmsCompany, BmsUser, BmsUserInfo, ForwardRequest, ForwardResponse};
pub use keycloak::{KeycloakClient, OidcEndpoints, TokenSet, OIDC_SCOPES};

use std::time::Duration;
use thiserror::Error;

/// Default timeout for upstream requests.
pub(crate) const UPSTREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connect timeout for upstream requests.
pub(crate) const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from calls to the identity provider or the BMS backend.
///
/// Transient and permanent failures are not told apart by callers; nothing
/// is retried.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Transport failure, timeout, or 5xx.
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// The upstream answered with a 4xx status.
    #[error("{service} rejected the request with status {status}")]
    Rejected {
        /// Which upstream answered.
        service: &'static str,
        /// HTTP status code.
        status: u16,
    },

    /// 2xx response whose body could not be used.
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    /// The HTTP client or a URL could not be built.
    #[error("Upstream client configuration error: {0}")]
    Configuration(String),
}

/// Build the shared HTTP client with upstream timeouts.
pub(crate) fn build_http_client() -> Result<reqwest::Client, UpstreamError> {
    reqwest::Client::builder()
        .timeout(UPSTREAM_REQUEST_TIMEOUT)
        .connect_timeout(UPSTREAM_CONNECT_TIMEOUT)
        .build()
        .map_err(|e| UpstreamError::Configuration(format!("Failed to build HTTP client: {e}")))
}

/// Map a non-success status to an `UpstreamError`.
pub(crate) fn status_error(service: &'static str, status: reqwest::StatusCode) -> UpstreamError {
    if status.is_server_error() {
        UpstreamError::Unavailable(format!("{service} returned {status}"))
    } else {
        UpstreamError::Rejected {
            service,
            status: status.as_u16(),
        }
    }
}
