//! Portal gateway error types.
//!
//! All errors map to HTTP responses via the `IntoResponse` impl. Messages
//! returned to clients are generic; the underlying detail is logged
//! server-side. Callback failures render the sign-in error page instead of
//! JSON, because the browser lands on that URL directly.

use crate::services::UpstreamError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Portal gateway error type.
///
/// Maps to HTTP status codes:
/// - Unauthenticated, CallbackFailed: 401 Unauthorized
/// - BadRequest: 400 Bad Request
/// - NotFound: 404 Not Found
/// - Upstream: 502 Bad Gateway
/// - ServiceUnavailable: 503 Service Unavailable
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Sign-in callback failed: {0}")]
    CallbackFailed(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PortalError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            PortalError::Unauthenticated(_) | PortalError::CallbackFailed(_) => 401,
            PortalError::BadRequest(_) => 400,
            PortalError::NotFound(_) => 404,
            PortalError::Upstream(_) => 502,
            PortalError::ServiceUnavailable(_) => 503,
            PortalError::Internal(_) => 500,
        }
    }
}

impl From<UpstreamError> for PortalError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Unavailable(reason) => PortalError::ServiceUnavailable(reason),
            UpstreamError::Rejected { status: 401 | 403, .. } => {
                PortalError::Unauthenticated("Session is no longer valid".to_string())
            }
            UpstreamError::Rejected { service, status } => {
                PortalError::Upstream(format!("{} rejected the request ({})", service, status))
            }
            UpstreamError::InvalidResponse(reason) => PortalError::Upstream(reason),
            UpstreamError::Configuration(reason) => PortalError::Internal(reason),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Generic sign-in failure page with a way back to `/login`.
pub const CALLBACK_FAILURE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Sign-in failed</title></head>
<body>
<main>
<h1>Sign-in failed</h1>
<p>We could not complete your sign-in. Please try again.</p>
<p><a href="/login">Back to Login</a></p>
</main>
</body>
</html>
"#;

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            PortalError::CallbackFailed(reason) => {
                tracing::warn!(target: "portal.callback", reason = %reason, "Sign-in callback failed");
                let mut response =
                    (StatusCode::UNAUTHORIZED, Html(CALLBACK_FAILURE_PAGE)).into_response();
                response
                    .headers_mut()
                    .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
                return response;
            }
            PortalError::Unauthenticated(reason) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", reason.clone())
            }
            PortalError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            PortalError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
            PortalError::Upstream(reason) => {
                tracing::warn!(target: "portal.upstream", reason = %reason, "Upstream error");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "An upstream service returned an error".to_string(),
                )
            }
            PortalError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "portal.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            PortalError::Internal(reason) => {
                tracing::error!(target: "portal.internal", reason = %reason, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}
