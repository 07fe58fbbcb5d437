//! Sign-in and sign-out handlers.
//!
//! - `GET /login` - start the authorization-code flow
//! - `GET /auth/callback` - finish it and create the session
//! - `GET /logout` - drop the session and end the IdP session

use crate::cookies::{
    auth_token_cookie, clear_auth_token_cookie, clear_session_cookie, session_cookie,
    session_id_from_headers,
};
use crate::errors::PortalError;
use crate::observability::metrics::{record_callback, record_login_redirect};
use crate::routes::AppState;
use crate::session::{generate_state, sanitize_return_to, AuthState};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use common::types::SessionId;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Query parameters accepted by `/login`.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Set by the route guard when it bounced the browser here.
    pub from: Option<String>,
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

/// Handler for GET /login
///
/// Mints a fresh `state`, remembers the sanitised return target under it,
/// and sends the browser to the Keycloak authorization endpoint.
#[instrument(skip_all, name = "portal.auth.login")]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Result<Redirect, PortalError> {
    let return_to = sanitize_return_to(query.return_to.as_deref().or(query.from.as_deref()));

    let oidc_state = generate_state(&state.rng)
        .map_err(|_| PortalError::Internal("System RNG failed".to_string()))?;
    let authorization_url = state.keycloak.authorization_url(&oidc_state)?;

    state.pending_logins.insert(oidc_state, return_to).await;
    record_login_redirect();

    Ok(Redirect::to(&authorization_url))
}

/// Query parameters Keycloak sends back to `/auth/callback`.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// A failed sign-in, labelled for metrics.
struct CallbackFailure {
    outcome: &'static str,
    reason: String,
}

impl CallbackFailure {
    fn new(outcome: &'static str, reason: impl Into<String>) -> Self {
        Self {
            outcome,
            reason: reason.into(),
        }
    }
}

/// Handler for GET /auth/callback
///
/// Runs at most once per authorization code:
///
/// 1. IdP error or missing code: failure page
/// 2. `state` not issued by `/login` (or already used): failure page
/// 3. Code seen before: failure page, the IdP is not contacted
/// 4. Exchange the code, resolve the user at BMS, assemble the session
/// 5. 303 to the return target stored by `/login`, with the
///    `portal-session` and `auth-token` cookies
///
/// Every failure renders the same generic page. Nothing is retried.
#[instrument(skip_all, name = "portal.auth.callback")]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let start = Instant::now();
    let now = chrono::Utc::now().timestamp();

    match complete_sign_in(&state, query, now).await {
        Ok((session_id, auth_state, return_to)) => {
            match sign_in_response(&state, &session_id, &auth_state, &return_to, now) {
                Ok(response) => {
                    state.sessions.insert(session_id, auth_state).await;
                    record_callback("success", start.elapsed());
                    info!(target: "portal.callback", "Sign-in completed");
                    response
                }
                Err(e) => {
                    record_callback("internal", start.elapsed());
                    e.into_response()
                }
            }
        }
        Err(failure) => {
            record_callback(failure.outcome, start.elapsed());
            PortalError::CallbackFailed(failure.reason).into_response()
        }
    }
}

async fn complete_sign_in(
    state: &AppState,
    query: CallbackQuery,
    now: i64,
) -> Result<(SessionId, AuthState, String), CallbackFailure> {
    // The pending entry is single-use whatever the outcome.
    let return_to = match query.state.as_deref() {
        Some(oidc_state) => state.pending_logins.take(oidc_state).await,
        None => None,
    };

    if let Some(error) = query.error {
        return Err(CallbackFailure::new(
            "idp_error",
            format!(
                "identity provider returned {error}: {}",
                query.error_description.unwrap_or_default()
            ),
        ));
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| CallbackFailure::new("missing_code", "callback without code"))?;

    // Checked before the code is claimed or sent anywhere.
    let return_to = return_to.ok_or_else(|| {
        CallbackFailure::new("unknown_state", "login state was not issued here or has expired")
    })?;

    if !state.callback_guard.try_claim(&code).await {
        return Err(CallbackFailure::new(
            "replayed",
            "authorization code was already used",
        ));
    }

    let tokens = state
        .keycloak
        .exchange_code(&code)
        .await
        .map_err(|e| CallbackFailure::new("token_exchange", e.to_string()))?;

    let userinfo = state
        .bms
        .fetch_user_info(&tokens.access_token)
        .await
        .map_err(|e| CallbackFailure::new("userinfo", e.to_string()))?;

    let auth_state = AuthState::assemble(tokens, userinfo, now)
        .map_err(|e| CallbackFailure::new("incomplete", e.to_string()))?;

    Ok((SessionId::new(), auth_state, return_to))
}

fn sign_in_response(
    state: &AppState,
    session_id: &SessionId,
    auth_state: &AuthState,
    return_to: &str,
    now: i64,
) -> Result<Response, PortalError> {
    let secure = state.config.cookie_secure;

    let session = session_cookie(session_id, auth_state.session_cookie_max_age(now), secure)
        .map_err(|e| PortalError::Internal(format!("Invalid session cookie: {e}")))?;
    let token = auth_token_cookie(&auth_state.token, auth_state.remaining_seconds(now), secure)
        .map_err(|e| PortalError::Internal(format!("Invalid auth-token cookie: {e}")))?;

    Ok((
        AppendHeaders([(header::SET_COOKIE, session), (header::SET_COOKIE, token)]),
        Redirect::to(return_to),
    )
        .into_response())
}

/// Handler for GET /logout
///
/// Drops the server-side session (if any), clears both cookies and sends
/// the browser to the Keycloak end-session endpoint, which returns it to
/// `/login`.
#[instrument(skip_all, name = "portal.auth.logout")]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, PortalError> {
    let removed = match session_id_from_headers(&headers) {
        Some(id) => state.sessions.remove(&id).await,
        None => None,
    };
    let logout_url = state
        .keycloak
        .logout_url(removed.as_ref().and_then(|s| s.id_token.as_ref()))?;

    info!(target: "portal.auth", had_session = removed.is_some(), "Signed out");

    Ok((
        AppendHeaders([
            (header::SET_COOKIE, clear_session_cookie()),
            (header::SET_COOKIE, clear_auth_token_cookie()),
        ]),
        Redirect::to(&logout_url),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_query_accepts_both_names() {
        let query: LoginQuery = serde_json::from_value(serde_json::json!({
            "from": "/projects",
            "returnTo": "/users"
        }))
        .unwrap_or_default();

        assert_eq!(query.from.as_deref(), Some("/projects"));
        assert_eq!(query.return_to.as_deref(), Some("/users"));
    }

    #[test]
    fn test_callback_failure_labels() {
        let failure = CallbackFailure::new("replayed", "code reused");
        assert_eq!(failure.outcome, "replayed");
        assert_eq!(failure.reason, "code reused");
    }
}
