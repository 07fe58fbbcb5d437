//! Wiremock-backed stand-ins for Keycloak and the BMS backend.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Realm used by every test server.
pub const TEST_REALM: &str = "bms";

/// Client id used by every test server.
pub const TEST_CLIENT_ID: &str = "bms-portal";

/// Mock Keycloak realm.
pub struct MockKeycloak {
    server: MockServer,
}

impl MockKeycloak {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL, usable as `NEXT_PUBLIC_KEYCLOAK_URL`.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    fn endpoint(name: &str) -> String {
        format!("/realms/{TEST_REALM}/protocol/openid-connect/{name}")
    }

    /// Token endpoint answering an authorization-code grant with `body`.
    pub async fn mount_code_exchange(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path(Self::endpoint("token")))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Token endpoint answering a refresh grant with `body`.
    pub async fn mount_refresh(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path(Self::endpoint("token")))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Like [`MockKeycloak::mount_refresh`], answering only after `delay`.
    pub async fn mount_slow_refresh(&self, body: Value, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(Self::endpoint("token")))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Token endpoint failing every grant with `status` and an OAuth error body.
    pub async fn mount_token_error(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(Self::endpoint("token")))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Code not valid"
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_userinfo(&self, body: Value) {
        Mock::given(method("GET"))
            .and(path(Self::endpoint("userinfo")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Number of token endpoint calls received so far.
    pub async fn token_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == Self::endpoint("token"))
            .count()
    }
}

/// Token response as Keycloak returns it.
pub fn token_response(access_token: &str, expires_in: i64) -> Value {
    json!({
        "access_token": access_token,
        "refresh_token": "test-refresh-token",
        "id_token": "test-id-token",
        "token_type": "Bearer",
        "expires_in": expires_in,
        "refresh_expires_in": 1800
    })
}

/// Mock BMS backend.
pub struct MockBms {
    server: MockServer,
}

impl MockBms {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL, usable as `NEXT_PUBLIC_API_URL`.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    pub async fn mount_userinfo(&self, body: Value) {
        Mock::given(method("GET"))
            .and(path("/api/auth/oidc/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_userinfo_error(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/api/auth/oidc/userinfo"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }
}

/// BMS userinfo body for a user with two companies.
pub fn bms_userinfo(user_id: &str, email: &str) -> Value {
    json!({
        "user": { "id": user_id, "email": email, "name": "Test User" },
        "companies": [
            { "companyId": 7, "companyName": "Acme", "role": "admin" },
            { "companyId": 9, "companyName": "Globex", "role": "viewer" }
        ]
    })
}
