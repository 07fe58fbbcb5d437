//! Session API and sign-out integration tests.
//!
//! Sessions are seeded straight into the server's store, so these tests do
//! not depend on the callback flow.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use common::secret::ExposeSecret;
use common::types::SessionId;
use portal_gateway::services::{BmsUserInfo, TokenSet};
use portal_gateway::session::AuthState;
use portal_test_utils::{
    bms_userinfo, cookie_value, set_cookies, token_response, MockBms, MockKeycloak,
    TestPortalServer, TestTokenBuilder,
};
use reqwest::header::{COOKIE, LOCATION};
use reqwest::Url;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

struct Harness {
    keycloak: MockKeycloak,
    _bms: MockBms,
    server: TestPortalServer,
}

async fn harness() -> Result<Harness> {
    let keycloak = MockKeycloak::start().await;
    let bms = MockBms::start().await;
    let server = TestPortalServer::spawn(&keycloak.url(), &bms.url()).await?;
    Ok(Harness {
        keycloak,
        _bms: bms,
        server,
    })
}

/// Put a signed-in session for user 42 into the store and return the
/// `Cookie` header that selects it.
async fn seed_session(server: &TestPortalServer, access_token: &str) -> Result<String> {
    let tokens: TokenSet = serde_json::from_value(token_response(access_token, 300))?;
    let userinfo: BmsUserInfo = serde_json::from_value(bms_userinfo("42", "ada@example.com"))?;
    let auth_state = AuthState::assemble(tokens, userinfo, chrono::Utc::now().timestamp())?;

    let id = SessionId::new();
    server.state().sessions.insert(id, auth_state).await;
    Ok(format!("portal-session={id}"))
}

#[tokio::test]
async fn test_session_requires_cookie() -> Result<()> {
    let h = harness().await?;

    let response = h
        .server
        .client()
        .get(format!("{}/api/session", h.server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), 401);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

    Ok(())
}

#[tokio::test]
async fn test_unknown_session_is_unauthenticated() -> Result<()> {
    let h = harness().await?;

    let response = h
        .server
        .client()
        .get(format!("{}/api/session", h.server.url()))
        .header(COOKIE, format!("portal-session={}", SessionId::new()))
        .send()
        .await?;

    assert_eq!(response.status(), 401);

    Ok(())
}

#[tokio::test]
async fn test_session_summary_hides_tokens() -> Result<()> {
    let h = harness().await?;
    let access_token = TestTokenBuilder::new().build();
    let cookie = seed_session(&h.server, &access_token).await?;

    let response = h
        .server
        .client()
        .get(format!("{}/api/session", h.server.url()))
        .header(COOKIE, cookie)
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let text = response.text().await?;
    assert!(!text.contains(&access_token));
    assert!(!text.contains("test-refresh-token"));

    let body: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(body["userId"], "42");
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["name"], "Test User");
    assert_eq!(body["currentCompanyId"], "7");
    assert_eq!(body["companies"].as_array().map(Vec::len), Some(2));
    assert!(body["expiresAt"].as_i64().unwrap() > chrono::Utc::now().timestamp());

    Ok(())
}

#[tokio::test]
async fn test_switch_company() -> Result<()> {
    let h = harness().await?;
    let cookie = seed_session(&h.server, &TestTokenBuilder::new().build()).await?;

    let response = h
        .server
        .client()
        .put(format!("{}/api/session/company", h.server.url()))
        .header(COOKIE, &cookie)
        .json(&json!({ "companyId": "9" }))
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["currentCompanyId"], "9");

    // Persisted for later requests
    let response = h
        .server
        .client()
        .get(format!("{}/api/session", h.server.url()))
        .header(COOKIE, &cookie)
        .send()
        .await?;
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["currentCompanyId"], "9");

    Ok(())
}

#[tokio::test]
async fn test_switch_to_foreign_company_is_rejected() -> Result<()> {
    let h = harness().await?;
    let cookie = seed_session(&h.server, &TestTokenBuilder::new().build()).await?;

    let response = h
        .server
        .client()
        .put(format!("{}/api/session/company", h.server.url()))
        .header(COOKIE, cookie)
        .json(&json!({ "companyId": "1234" }))
        .send()
        .await?;

    assert_eq!(response.status(), 400);

    Ok(())
}

/// `Max-Age` of the `name` cookie among the response's `Set-Cookie` headers.
fn cookie_max_age(response: &reqwest::Response, name: &str) -> Option<i64> {
    set_cookies(response)
        .into_iter()
        .find(|c| c.starts_with(&format!("{name}=")))?
        .split(';')
        .find_map(|attr| attr.trim().strip_prefix("Max-Age="))?
        .parse()
        .ok()
}

#[tokio::test]
async fn test_refresh_replaces_access_token() -> Result<()> {
    let h = harness().await?;
    let cookie = seed_session(&h.server, &TestTokenBuilder::new().build()).await?;
    let fresh = TestTokenBuilder::new().for_user("fresh").build();
    h.keycloak
        .mount_refresh(json!({
            "access_token": fresh,
            "expires_in": 600,
            "refresh_expires_in": 3600
        }))
        .await;

    let response = h
        .server
        .client()
        .post(format!("{}/api/session/refresh", h.server.url()))
        .header(COOKIE, &cookie)
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    assert_eq!(set_cookies(&response).len(), 2);
    assert_eq!(
        cookie_value(&response, "auth-token").as_deref(),
        Some(fresh.as_str())
    );
    assert_eq!(cookie_max_age(&response, "auth-token"), Some(600));

    // The session cookie is re-issued for the new refresh lifetime
    let id: SessionId = cookie.trim_start_matches("portal-session=").parse()?;
    assert_eq!(
        cookie_value(&response, "portal-session").as_deref(),
        Some(id.to_string().as_str())
    );
    assert_eq!(cookie_max_age(&response, "portal-session"), Some(3600));

    let session = h.server.state().sessions.get(&id).await.unwrap();
    assert_eq!(session.token.expose_secret(), fresh);
    // Not rotated, so the previous refresh token stays
    assert_eq!(
        session.refresh_token.as_ref().map(|t| t.expose_secret().to_string()),
        Some("test-refresh-token".to_string())
    );

    Ok(())
}

#[tokio::test]
async fn test_company_switch_during_refresh_is_kept() -> Result<()> {
    let h = harness().await?;
    let cookie = seed_session(&h.server, &TestTokenBuilder::new().build()).await?;
    let fresh = TestTokenBuilder::new().for_user("fresh").build();
    h.keycloak
        .mount_slow_refresh(
            json!({ "access_token": fresh, "expires_in": 600 }),
            Duration::from_millis(500),
        )
        .await;

    let client = h.server.client();
    let refresh = client
        .post(format!("{}/api/session/refresh", h.server.url()))
        .header(COOKIE, &cookie)
        .send();
    let switch = async {
        // Lands while the refresh is waiting on Keycloak
        tokio::time::sleep(Duration::from_millis(100)).await;
        client
            .put(format!("{}/api/session/company", h.server.url()))
            .header(COOKIE, &cookie)
            .json(&json!({ "companyId": "9" }))
            .send()
            .await
    };
    let (refreshed, switched) = tokio::join!(refresh, switch);

    assert_eq!(switched?.status(), 200);
    let refreshed = refreshed?;
    assert_eq!(refreshed.status(), 200);
    let body: serde_json::Value = refreshed.json().await?;
    assert_eq!(body["currentCompanyId"], "9");

    let id: SessionId = cookie.trim_start_matches("portal-session=").parse()?;
    let session = h.server.state().sessions.get(&id).await.unwrap();
    assert_eq!(session.current_company_id.as_deref(), Some("9"));
    assert_eq!(session.token.expose_secret(), fresh);

    Ok(())
}

#[tokio::test]
async fn test_unavailable_idp_keeps_session() -> Result<()> {
    let h = harness().await?;
    let original = TestTokenBuilder::new().build();
    let cookie = seed_session(&h.server, &original).await?;
    h.keycloak.mount_token_error(503).await;

    let response = h
        .server
        .client()
        .post(format!("{}/api/session/refresh", h.server.url()))
        .header(COOKIE, &cookie)
        .send()
        .await?;

    assert_eq!(response.status(), 503);
    assert!(set_cookies(&response).is_empty());

    let id: SessionId = cookie.trim_start_matches("portal-session=").parse()?;
    let session = h.server.state().sessions.get(&id).await.unwrap();
    assert_eq!(session.token.expose_secret(), original);

    Ok(())
}

#[tokio::test]
async fn test_rejected_refresh_token_ends_session() -> Result<()> {
    let h = harness().await?;
    let cookie = seed_session(&h.server, &TestTokenBuilder::new().build()).await?;
    h.keycloak.mount_token_error(400).await;

    let response = h
        .server
        .client()
        .post(format!("{}/api/session/refresh", h.server.url()))
        .header(COOKIE, &cookie)
        .send()
        .await?;

    assert_eq!(response.status(), 401);
    let cookies = set_cookies(&response);
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("portal-session=;") && c.contains("Max-Age=0")));
    assert!(cookies.contains(&"auth-token=; Max-Age=0; Path=/".to_string()));
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

    assert_eq!(h.server.state().sessions.count().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_logout_ends_idp_session() -> Result<()> {
    let h = harness().await?;
    let cookie = seed_session(&h.server, &TestTokenBuilder::new().build()).await?;

    let response = h
        .server
        .client()
        .get(format!("{}/logout", h.server.url()))
        .header(COOKIE, &cookie)
        .send()
        .await?;

    assert_eq!(response.status(), 303);
    let location = Url::parse(response.headers()[LOCATION].to_str()?)?;
    assert_eq!(
        location.path(),
        "/realms/bms/protocol/openid-connect/logout"
    );
    let params: HashMap<_, _> = location.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], "bms-portal");
    assert_eq!(params["post_logout_redirect_uri"], "http://portal.test/login");
    assert_eq!(params["id_token_hint"], "test-id-token");

    let cookies = set_cookies(&response);
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("portal-session=;") && c.contains("Max-Age=0")));
    assert!(cookies.contains(&"auth-token=; Max-Age=0; Path=/".to_string()));

    assert_eq!(h.server.state().sessions.count().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_logout_without_session_still_clears_cookies() -> Result<()> {
    let h = harness().await?;

    let response = h
        .server
        .client()
        .get(format!("{}/logout", h.server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), 303);
    let location = Url::parse(response.headers()[LOCATION].to_str()?)?;
    assert!(!location.query_pairs().any(|(k, _)| k == "id_token_hint"));
    assert_eq!(set_cookies(&response).len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_userinfo_is_fetched_from_keycloak() -> Result<()> {
    let h = harness().await?;
    let cookie = seed_session(&h.server, &TestTokenBuilder::new().build()).await?;
    h.keycloak
        .mount_userinfo(json!({
            "sub": "kc-42",
            "email": "ada@example.com",
            "preferred_username": "ada"
        }))
        .await;

    let response = h
        .server
        .client()
        .get(format!("{}/api/session/userinfo", h.server.url()))
        .header(COOKIE, cookie)
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["preferred_username"], "ada");

    Ok(())
}
