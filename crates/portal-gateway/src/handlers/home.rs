//! Landing route and fallback.

use crate::errors::PortalError;
use crate::middleware::ClaimsExt;
use axum::{extract::Request, Json};
use serde::Serialize;

/// What the guard learned from the access token, for the landing page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Handler for GET /
///
/// Only reached with a live token; the guard redirects everything else.
pub async fn home(request: Request) -> Json<HomeResponse> {
    let response = match request.claims() {
        Some(claims) => HomeResponse {
            authenticated: true,
            user_id: claims.sub.clone(),
            email: claims.email.clone(),
            roles: claims.roles.clone(),
            expires_at: claims.exp,
        },
        None => HomeResponse {
            authenticated: false,
            user_id: None,
            email: None,
            roles: None,
            expires_at: None,
        },
    };
    Json(response)
}

/// Fallback for paths no route matches.
pub async fn not_found() -> PortalError {
    PortalError::NotFound("Resource not found".to_string())
}
