//! BMS backend proxy.
//!
//! `/api/bms/*path` forwards to `{API_BASE}/api/*path` with the session's
//! access token and current company attached, so the browser never holds
//! the token for API calls.

use crate::cookies::session_id_from_headers;
use crate::errors::PortalError;
use crate::routes::AppState;
use crate::services::ForwardRequest;
use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Handler for GET/POST/PUT/PATCH/DELETE /api/bms/*path
///
/// Upstream statuses are passed through unchanged. An unreachable backend
/// is a 503. A session whose access token has expired gets a 401 without
/// reaching BMS; the page refreshes it through `/api/session/refresh`.
#[instrument(skip_all, name = "portal.bms.proxy", fields(method = %method))]
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, PortalError> {
    let id = session_id_from_headers(&headers)
        .ok_or_else(|| PortalError::Unauthenticated("No active session".to_string()))?;
    let auth_state = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| PortalError::Unauthenticated("No active session".to_string()))?;

    if auth_state.is_expired_at(chrono::Utc::now().timestamp()) {
        debug!(target: "portal.bms", "Access token expired, not forwarding");
        return Err(PortalError::Unauthenticated("Access token expired".to_string()));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let upstream = state
        .bms
        .forward(ForwardRequest {
            method,
            path,
            query,
            content_type,
            body,
            access_token: auth_state.token,
            company_id: auth_state.current_company_id,
        })
        .await?;

    let status = StatusCode::from_u16(upstream.status).map_err(|_| {
        PortalError::Upstream(format!("BMS returned invalid status {}", upstream.status))
    })?;

    let mut response = (status, upstream.body).into_response();
    if let Some(content_type) = upstream
        .content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    Ok(response)
}
