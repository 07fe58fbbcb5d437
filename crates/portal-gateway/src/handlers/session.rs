//! Session API handlers under `/api/session`.
//!
//! These are the explicit accessors the portal pages use instead of reading
//! browser storage. All of them require the `portal-session` cookie.

use crate::cookies::{
    auth_token_cookie, clear_auth_token_cookie, clear_session_cookie, session_cookie,
    session_id_from_headers,
};
use crate::errors::PortalError;
use crate::routes::AppState;
use crate::services::UpstreamError;
use crate::session::{AuthState, SessionError, SessionSummary, SessionUpdate};
use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use common::types::SessionId;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Resolve the session named by the request's `portal-session` cookie.
async fn current_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(SessionId, AuthState), PortalError> {
    let id = session_id_from_headers(headers)
        .ok_or_else(|| PortalError::Unauthenticated("No active session".to_string()))?;
    let auth_state = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(|| PortalError::Unauthenticated("No active session".to_string()))?;
    Ok((id, auth_state))
}

/// Apply `update` to the stored session under the store's lock.
async fn modify_session(
    state: &AppState,
    id: &SessionId,
    update: SessionUpdate,
) -> Result<AuthState, PortalError> {
    match state.sessions.modify(id, update).await {
        Some(Ok(auth_state)) => Ok(auth_state),
        Some(Err(SessionError::UnknownCompany)) => Err(PortalError::BadRequest(
            "Not a member of the requested company".to_string(),
        )),
        Some(Err(other)) => Err(PortalError::Internal(other.to_string())),
        // Signed out in another tab while this request was in flight
        None => Err(PortalError::Unauthenticated("No active session".to_string())),
    }
}

/// 401 for a session the IdP no longer honours, clearing both cookies.
fn ended_session_response() -> Response {
    (
        AppendHeaders([
            (header::SET_COOKIE, clear_session_cookie()),
            (header::SET_COOKIE, clear_auth_token_cookie()),
        ]),
        PortalError::Unauthenticated("Session is no longer valid".to_string()),
    )
        .into_response()
}

/// Handler for GET /api/session
#[instrument(skip_all, name = "portal.session.get")]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionSummary>, PortalError> {
    let (_, auth_state) = current_session(&state, &headers).await?;
    Ok(Json(auth_state.summary()))
}

/// Request body for PUT /api/session/company
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchCompanyRequest {
    pub company_id: String,
}

/// Handler for PUT /api/session/company
///
/// Switches the company sent as `X-Company-Id` on proxied BMS calls.
#[instrument(skip_all, name = "portal.session.switch_company")]
pub async fn switch_company(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SwitchCompanyRequest>,
) -> Result<Json<SessionSummary>, PortalError> {
    let id = session_id_from_headers(&headers)
        .ok_or_else(|| PortalError::Unauthenticated("No active session".to_string()))?;

    let company_id = request.company_id;
    let auth_state = modify_session(
        &state,
        &id,
        Box::new(move |s| s.switch_company(&company_id)),
    )
    .await?;

    Ok(Json(auth_state.summary()))
}

/// Handler for POST /api/session/refresh
///
/// Refreshes the access token on request. There is no background renewal.
/// The new tokens are merged into the stored session, so a company switch
/// made while the IdP call was in flight is kept.
///
/// If the IdP rejects the refresh token the session is dropped and both
/// cookies are cleared. Any other failure leaves the session as it was.
#[instrument(skip_all, name = "portal.session.refresh")]
pub async fn refresh_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, PortalError> {
    let (id, auth_state) = current_session(&state, &headers).await?;

    let refresh_token = auth_state.refresh_token.clone().ok_or_else(|| {
        PortalError::Unauthenticated("Session cannot be refreshed".to_string())
    })?;

    let tokens = match state.keycloak.refresh(&refresh_token).await {
        Ok(tokens) => tokens,
        // invalid_grant: the refresh token expired or was revoked
        Err(UpstreamError::Rejected { status: 400, .. }) => {
            state.sessions.remove(&id).await;
            warn!(target: "portal.session", "Refresh token rejected, session ended");
            return Ok(ended_session_response());
        }
        Err(e) => {
            warn!(target: "portal.session", error = %e, "Token refresh failed");
            return Err(PortalError::from(e));
        }
    };

    let now = chrono::Utc::now().timestamp();
    let auth_state = modify_session(
        &state,
        &id,
        Box::new(move |s| {
            s.apply_refresh(tokens, now);
            Ok(())
        }),
    )
    .await?;

    let secure = state.config.cookie_secure;
    let session = session_cookie(&id, auth_state.session_cookie_max_age(now), secure)
        .map_err(|e| PortalError::Internal(format!("Invalid session cookie: {e}")))?;
    let token = auth_token_cookie(&auth_state.token, auth_state.remaining_seconds(now), secure)
        .map_err(|e| PortalError::Internal(format!("Invalid auth-token cookie: {e}")))?;

    info!(target: "portal.session", "Access token refreshed");

    Ok((
        AppendHeaders([(header::SET_COOKIE, session), (header::SET_COOKIE, token)]),
        Json(auth_state.summary()),
    )
        .into_response())
}

/// Handler for GET /api/session/userinfo
///
/// Keycloak's view of the user, for the profile page.
#[instrument(skip_all, name = "portal.session.userinfo")]
pub async fn get_userinfo(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, PortalError> {
    let (_, auth_state) = current_session(&state, &headers).await?;
    let info = state.keycloak.user_info(&auth_state.token).await?;
    Ok(Json(info))
}
