//! Cookie helpers for the two cookies the portal sets.
//!
//! - `portal-session`: opaque session id, HttpOnly
//! - `auth-token`: the access token, read by the route guard on every
//!   page request

use axum::http::{header, HeaderMap, HeaderValue};
use common::secret::{ExposeSecret, SecretString};
use common::types::SessionId;

pub const SESSION_COOKIE: &str = "portal-session";
pub const AUTH_TOKEN_COOKIE: &str = "auth-token";

const CLEAR_AUTH_TOKEN: &str = "auth-token=; Max-Age=0; Path=/";
const CLEAR_SESSION: &str = "portal-session=; Max-Age=0; Path=/";

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// The session id from the `portal-session` cookie, if present and well formed.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    parse_cookie(headers, SESSION_COOKIE)?.parse().ok()
}

/// `Set-Cookie` value for the session id.
pub fn session_cookie(
    id: &SessionId,
    max_age: i64,
    secure: bool,
) -> Result<HeaderValue, header::InvalidHeaderValue> {
    HeaderValue::try_from(build_cookie(SESSION_COOKIE, &id.to_string(), max_age, secure))
}

/// `Set-Cookie` value for the access token.
pub fn auth_token_cookie(
    token: &SecretString,
    max_age: i64,
    secure: bool,
) -> Result<HeaderValue, header::InvalidHeaderValue> {
    let mut value = HeaderValue::try_from(build_cookie(
        AUTH_TOKEN_COOKIE,
        token.expose_secret(),
        max_age,
        secure,
    ))?;
    value.set_sensitive(true);
    Ok(value)
}

pub fn clear_auth_token_cookie() -> HeaderValue {
    HeaderValue::from_static(CLEAR_AUTH_TOKEN)
}

pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static(CLEAR_SESSION)
}

fn build_cookie(name: &str, value: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{name}={value}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        max_age.max(0)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
