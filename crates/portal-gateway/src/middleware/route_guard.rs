//! Route guard applied in front of every portal page.
//!
//! Decides per request whether the browser may see the page, using only the
//! access token it carries (`auth-token` cookie, else a Bearer header).
//!
//! The token payload is decoded **without verifying its signature**. The
//! guard only makes routing decisions (send the browser to `/login`, keep
//! non-admins away from `/users`); the BMS backend verifies the signature
//! on every API call and is the trust boundary. Do not add signature
//! verification here.
//!
//! # Decisions
//!
//! | Request                                   | Result                                   |
//! |-------------------------------------------|------------------------------------------|
//! | public page (`/login`, `/signup`, ...)    | pass                                     |
//! | asset, API, or file-like path off `/users`| pass                                     |
//! | no token                                  | 307 `/login?from=<path>`                 |
//! | undecodable, no `exp`, or expired token   | 307 `/login`, `auth-token` cookie cleared |
//! | `/users` and a role claim without admin   | 307 `/`                                  |
//! | otherwise                                 | pass, claims in request extensions       |

use crate::cookies::{clear_auth_token_cookie, parse_cookie, AUTH_TOKEN_COOKIE};
use crate::observability::metrics::record_guard_decision;
use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use common::jwt::{decode_unverified_claims, PortalClaims};
use tracing::{debug, instrument};

/// Pages reachable without a session.
pub const PUBLIC_PATHS: [&str; 6] = [
    "/login",
    "/signup",
    "/forgot-password",
    "/reset-password",
    "/auth/callback",
    "/logout",
];

const ASSET_PREFIXES: [&str; 3] = ["/_next/", "/static/", "/api/"];

const ASSET_PATHS: [&str; 3] = ["/health", "/metrics", "/favicon.ico"];

/// Pages restricted to administrators when the token carries a role.
const ADMIN_PATH: &str = "/users";

/// Roles allowed on [`ADMIN_PATH`].
pub const ADMIN_ROLES: [&str; 2] = ["admin", "super_admin"];

/// Outcome of the guard for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Public,
    Asset,
    Allow(PortalClaims),
    MissingToken { from: String },
    InvalidToken,
    Forbidden,
}

impl GuardDecision {
    fn label(&self) -> &'static str {
        match self {
            GuardDecision::Public => "public",
            GuardDecision::Asset => "asset",
            GuardDecision::Allow(_) => "allowed",
            GuardDecision::MissingToken { .. } => "missing_token",
            GuardDecision::InvalidToken => "expired",
            GuardDecision::Forbidden => "forbidden_role",
        }
    }
}

/// `path` is one of the public pages, exactly or as a parent segment.
pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|public| matches_segment(path, public))
}

/// `path` is served without a page session: static assets, API routes
/// (which authenticate themselves), health and metrics, and any file-like
/// last segment outside [`ADMIN_PATH`].
pub fn is_asset_path(path: &str) -> bool {
    if ASSET_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return true;
    }
    if ASSET_PATHS.iter().any(|asset| matches_segment(path, asset)) {
        return true;
    }
    // Admin pages are addressed by user names, which may contain dots.
    if matches_segment(path, ADMIN_PATH) {
        return false;
    }
    path.rsplit('/').next().is_some_and(|last| last.contains('.'))
}

fn matches_segment(path: &str, base: &str) -> bool {
    path.strip_prefix(base)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// The access token from the `auth-token` cookie, else from a Bearer header.
pub fn extract_token(headers: &header::HeaderMap) -> Option<String> {
    parse_cookie(headers, AUTH_TOKEN_COOKIE)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        })
}

/// Decide what to do with a request for `path` at `now` (Unix seconds).
pub fn decide(path: &str, token: Option<&str>, now: i64) -> GuardDecision {
    if is_public_path(path) {
        return GuardDecision::Public;
    }
    if is_asset_path(path) {
        return GuardDecision::Asset;
    }

    let Some(token) = token else {
        return GuardDecision::MissingToken {
            from: path.to_string(),
        };
    };

    let claims = match decode_unverified_claims(token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(target: "portal.guard", error = %e, "Token payload could not be decoded");
            return GuardDecision::InvalidToken;
        }
    };

    if claims.is_expired_at(now) {
        return GuardDecision::InvalidToken;
    }

    if matches_segment(path, ADMIN_PATH)
        && claims.roles.is_some()
        && !claims.has_any_role(&ADMIN_ROLES)
    {
        return GuardDecision::Forbidden;
    }

    GuardDecision::Allow(claims)
}

/// Route guard middleware.
#[instrument(skip_all, name = "portal.middleware.route_guard")]
pub async fn route_guard(mut req: Request, next: Next) -> Response {
    let token = extract_token(req.headers());
    let decision = decide(
        req.uri().path(),
        token.as_deref(),
        chrono::Utc::now().timestamp(),
    );
    record_guard_decision(decision.label());

    match decision {
        GuardDecision::Public | GuardDecision::Asset => next.run(req).await,
        GuardDecision::Allow(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        GuardDecision::MissingToken { from } => {
            debug!(target: "portal.guard", "No access token, redirecting to login");
            Redirect::temporary(&format!("/login?from={}", urlencoding::encode(&from)))
                .into_response()
        }
        GuardDecision::InvalidToken => {
            debug!(target: "portal.guard", "Access token expired or invalid, redirecting to login");
            (
                [(header::SET_COOKIE, clear_auth_token_cookie())],
                Redirect::temporary("/login"),
            )
                .into_response()
        }
        GuardDecision::Forbidden => {
            debug!(target: "portal.guard", "Role not allowed on admin pages, redirecting home");
            Redirect::temporary("/").into_response()
        }
    }
}

/// Access to the claims the guard placed in request extensions.
pub trait ClaimsExt {
    /// `None` on public and asset paths, where the guard does not decode
    /// any token.
    fn claims(&self) -> Option<&PortalClaims>;
}

impl<B> ClaimsExt for axum::http::Request<B> {
    fn claims(&self) -> Option<&PortalClaims> {
        self.extensions().get::<PortalClaims>()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Extension, Router};
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use tower::ServiceExt;

    const NOW: i64 = 1_700_000_000;

    /// Unsigned token with the given payload; the guard never checks the
    /// signature segment.
    fn token(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{payload}.c2lnbmF0dXJl")
    }

    fn live_token() -> String {
        let exp = chrono::Utc::now().timestamp() + 300;
        token(serde_json::json!({ "sub": "u1", "exp": exp }))
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/login"));
        assert!(is_public_path("/auth/callback"));
        assert!(is_public_path("/reset-password/abc"));
        assert!(is_public_path("/logout"));
        assert!(!is_public_path("/loginx"));
        assert!(!is_public_path("/dashboard"));
        assert!(!is_public_path("/"));
    }

    #[test]
    fn test_asset_paths() {
        assert!(is_asset_path("/_next/static/chunk.js"));
        assert!(is_asset_path("/static/logo"));
        assert!(is_asset_path("/api/session"));
        assert!(is_asset_path("/health"));
        assert!(is_asset_path("/metrics"));
        assert!(is_asset_path("/favicon.ico"));
        assert!(is_asset_path("/images/hero.png"));
        assert!(!is_asset_path("/dashboard"));
        assert!(!is_asset_path("/healthz"));
        assert!(!is_asset_path("/v1.0/projects"));
        assert!(!is_asset_path("/users/jane.doe"));
        assert!(!is_asset_path("/users/report.csv"));
        assert!(is_asset_path("/usersettings/export.csv"));
    }

    #[test]
    fn test_decide_public_never_needs_token() {
        for path in PUBLIC_PATHS {
            assert_eq!(decide(path, None, NOW), GuardDecision::Public);
            assert_eq!(decide(path, Some("garbage"), NOW), GuardDecision::Public);
        }
    }

    #[test]
    fn test_decide_missing_token() {
        assert_eq!(
            decide("/projects/17", None, NOW),
            GuardDecision::MissingToken {
                from: "/projects/17".to_string()
            }
        );
    }

    #[test]
    fn test_decide_expired_token() {
        let expired = token(serde_json::json!({ "exp": NOW - 1 }));
        assert_eq!(decide("/dashboard", Some(&expired), NOW), GuardDecision::InvalidToken);
    }

    #[test]
    fn test_decide_token_expiring_now_is_allowed() {
        let edge = token(serde_json::json!({ "exp": NOW }));
        assert!(matches!(
            decide("/dashboard", Some(&edge), NOW),
            GuardDecision::Allow(_)
        ));
    }

    #[test]
    fn test_decide_missing_exp_is_invalid() {
        let no_exp = token(serde_json::json!({ "sub": "u1" }));
        assert_eq!(decide("/dashboard", Some(&no_exp), NOW), GuardDecision::InvalidToken);
    }

    #[test]
    fn test_decide_malformed_token_is_invalid() {
        assert_eq!(decide("/dashboard", Some("not-a-jwt"), NOW), GuardDecision::InvalidToken);
        let oversized = "a".repeat(9000);
        assert_eq!(decide("/dashboard", Some(&oversized), NOW), GuardDecision::InvalidToken);
    }

    #[test]
    fn test_decide_admin_pages() {
        let exp = NOW + 300;
        let viewer = token(serde_json::json!({ "exp": exp, "role": "viewer" }));
        let admin = token(serde_json::json!({ "exp": exp, "role": "admin" }));
        let super_admin = token(serde_json::json!({ "exp": exp, "role": ["user", "super_admin"] }));
        let no_role = token(serde_json::json!({ "exp": exp }));
        let odd_role = token(serde_json::json!({ "exp": exp, "role": 5 }));

        assert_eq!(decide("/users", Some(&viewer), NOW), GuardDecision::Forbidden);
        assert_eq!(decide("/users/42/edit", Some(&viewer), NOW), GuardDecision::Forbidden);
        assert_eq!(decide("/users", Some(&odd_role), NOW), GuardDecision::Forbidden);
        assert!(matches!(decide("/users", Some(&admin), NOW), GuardDecision::Allow(_)));
        assert!(matches!(decide("/users", Some(&super_admin), NOW), GuardDecision::Allow(_)));
        assert!(matches!(decide("/users", Some(&no_role), NOW), GuardDecision::Allow(_)));
        assert!(matches!(decide("/usersettings", Some(&viewer), NOW), GuardDecision::Allow(_)));
    }

    #[test]
    fn test_decide_admin_page_with_dotted_user_name() {
        let viewer = token(serde_json::json!({ "exp": NOW + 300, "role": "viewer" }));
        let admin = token(serde_json::json!({ "exp": NOW + 300, "role": "admin" }));

        assert_eq!(
            decide("/users/jane.doe", None, NOW),
            GuardDecision::MissingToken {
                from: "/users/jane.doe".to_string()
            }
        );
        assert_eq!(decide("/users/jane.doe", Some(&viewer), NOW), GuardDecision::Forbidden);
        assert!(matches!(
            decide("/users/jane.doe", Some(&admin), NOW),
            GuardDecision::Allow(_)
        ));
    }

    #[test]
    fn test_extract_token_prefers_cookie() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("from-header"));

        headers.insert(header::COOKIE, "auth-token=from-cookie".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_extract_token_ignores_empty_and_non_bearer() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::COOKIE, "auth-token=".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert_eq!(extract_token(&headers), None);
    }

    // Router-level tests: a dummy page behind the guard.

    async fn page(Extension(claims): Extension<PortalClaims>) -> String {
        claims.sub.unwrap_or_default()
    }

    fn test_app() -> Router {
        Router::new()
            .route("/dashboard", get(page))
            .route("/users", get(page))
            .route("/login", get(|| async { "login page" }))
            .layer(middleware::from_fn(route_guard))
    }

    fn request(uri: &str, cookie: Option<String>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_guard_redirects_without_token() {
        let response = test_app()
            .oneshot(request("/dashboard", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/login?from=%2Fdashboard"
        );
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_guard_clears_cookie_on_expired_token() {
        let expired = token(serde_json::json!({ "exp": 1 }));
        let response = test_app()
            .oneshot(request("/dashboard", Some(format!("auth-token={expired}"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/login");
        assert_eq!(
            response.headers().get(header::SET_COOKIE).unwrap(),
            "auth-token=; Max-Age=0; Path=/"
        );
    }

    #[tokio::test]
    async fn test_guard_passes_claims_to_page() {
        let response = test_app()
            .oneshot(request("/dashboard", Some(format!("auth-token={}", live_token()))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], b"u1");
    }

    #[tokio::test]
    async fn test_guard_sends_non_admin_home() {
        let exp = chrono::Utc::now().timestamp() + 300;
        let viewer = token(serde_json::json!({ "sub": "u1", "exp": exp, "role": "viewer" }));
        let response = test_app()
            .oneshot(request("/users", Some(format!("auth-token={viewer}"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
    }

    #[tokio::test]
    async fn test_guard_lets_public_page_through() {
        let response = test_app().oneshot(request("/login", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
