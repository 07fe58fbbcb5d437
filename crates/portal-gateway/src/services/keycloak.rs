//! Keycloak OpenID Connect client.
//!
//! Implements the confidential/public client side of the authorization-code
//! flow against one realm: building the authorization and end-session URLs,
//! exchanging codes, refreshing tokens and reading userinfo.
//!
//! # Security
//!
//! - No PKCE parameters are sent; the realm client is configured without it
//! - Token responses are only returned complete (non-empty access token,
//!   positive lifetime); anything else is an error, never a partial set
//! - Tokens and the client secret are `SecretString` and never logged
//! - Nothing is retried

use crate::config::Config;
use crate::observability::metrics::record_upstream_request;
use crate::services::{build_http_client, status_error, UpstreamError};
use common::secret::{ExposeSecret, SecretString};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Scopes requested in the authorization request.
pub const OIDC_SCOPES: &str = "openid profile email";

const SERVICE: &str = "keycloak";

/// OIDC endpoint URLs for one Keycloak realm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcEndpoints {
    pub auth: String,
    pub token: String,
    pub userinfo: String,
    pub logout: String,
}

impl OidcEndpoints {
    /// Derive the endpoints from `{base}/realms/{realm}/protocol/openid-connect/`.
    pub fn for_realm(base_url: &str, realm: &str) -> Self {
        let prefix = format!(
            "{}/realms/{}/protocol/openid-connect",
            base_url.trim_end_matches('/'),
            realm
        );
        Self {
            auth: format!("{prefix}/auth"),
            token: format!("{prefix}/token"),
            userinfo: format!("{prefix}/userinfo"),
            logout: format!("{prefix}/logout"),
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: SecretString,

    #[serde(default)]
    pub refresh_token: Option<SecretString>,

    #[serde(default)]
    pub id_token: Option<SecretString>,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: i64,

    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenSet {
    fn validate(self) -> Result<Self, UpstreamError> {
        if self.access_token.expose_secret().is_empty() {
            return Err(UpstreamError::InvalidResponse(
                "token response has an empty access_token".to_string(),
            ));
        }
        if self.expires_in <= 0 {
            return Err(UpstreamError::InvalidResponse(format!(
                "token response has a non-positive expires_in ({})",
                self.expires_in
            )));
        }
        Ok(self)
    }
}

/// HTTP client for the Keycloak OIDC endpoints of one realm.
#[derive(Clone)]
pub struct KeycloakClient {
    client: Client,
    endpoints: OidcEndpoints,
    client_id: String,
    client_secret: Option<SecretString>,
    redirect_uri: String,
    post_logout_redirect_uri: String,
}

impl KeycloakClient {
    /// Create a client for the realm named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: build_http_client()?,
            endpoints: OidcEndpoints::for_realm(&config.keycloak_url, &config.keycloak_realm),
            client_id: config.keycloak_client_id.clone(),
            client_secret: config.keycloak_client_secret.clone(),
            redirect_uri: config.redirect_uri(),
            post_logout_redirect_uri: config.post_logout_redirect_uri(),
        })
    }

    pub fn endpoints(&self) -> &OidcEndpoints {
        &self.endpoints
    }

    /// Authorization endpoint URL for a login attempt identified by `state`.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Configuration` if the configured endpoint is
    /// not a valid URL.
    pub fn authorization_url(&self, state: &str) -> Result<String, UpstreamError> {
        let url = Url::parse_with_params(
            &self.endpoints.auth,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", OIDC_SCOPES),
                ("state", state),
            ],
        )
        .map_err(|e| UpstreamError::Configuration(format!("Invalid auth endpoint: {e}")))?;

        Ok(url.to_string())
    }

    /// End-session URL. The browser comes back to `/login` afterwards.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Configuration` if the configured endpoint is
    /// not a valid URL.
    pub fn logout_url(&self, id_token_hint: Option<&SecretString>) -> Result<String, UpstreamError> {
        let mut url = Url::parse(&self.endpoints.logout)
            .map_err(|e| UpstreamError::Configuration(format!("Invalid logout endpoint: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            query.append_pair("post_logout_redirect_uri", &self.post_logout_redirect_uri);
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint.expose_secret());
            }
        }

        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// - `UpstreamError::Unavailable` on transport failure or 5xx
    /// - `UpstreamError::Rejected` on 4xx (e.g. `invalid_grant`)
    /// - `UpstreamError::InvalidResponse` if the body is not a complete token set
    #[instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, UpstreamError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.expose_secret()));
        }

        self.token_request("token_exchange", &form).await
    }

    /// Obtain a new token set with a refresh token.
    ///
    /// # Errors
    ///
    /// Same as [`KeycloakClient::exchange_code`].
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenSet, UpstreamError> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token.expose_secret()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.expose_secret()));
        }

        self.token_request("token_refresh", &form).await
    }

    /// Read the userinfo claims for an access token.
    ///
    /// # Errors
    ///
    /// - `UpstreamError::Unavailable` on transport failure or 5xx
    /// - `UpstreamError::Rejected` on 4xx
    /// - `UpstreamError::InvalidResponse` if the body is not JSON
    #[instrument(skip_all)]
    pub async fn user_info(
        &self,
        access_token: &SecretString,
    ) -> Result<serde_json::Value, UpstreamError> {
        let start = Instant::now();
        let result: Result<serde_json::Value, UpstreamError> = async {
            let response = self
                .client
                .get(&self.endpoints.userinfo)
                .bearer_auth(access_token.expose_secret())
                .send()
                .await
                .map_err(|e| {
                    warn!(target: "portal.keycloak", error = %e, "Userinfo request failed");
                    UpstreamError::Unavailable("Identity provider is unavailable".to_string())
                })?;

            let status = response.status();
            if !status.is_success() {
                warn!(target: "portal.keycloak", status = %status, "Userinfo request rejected");
                return Err(status_error(SERVICE, status));
            }

            response.json::<serde_json::Value>().await.map_err(|e| {
                warn!(target: "portal.keycloak", error = %e, "Failed to parse userinfo response");
                UpstreamError::InvalidResponse("userinfo response is not JSON".to_string())
            })
        }
        .await;

        record_upstream_request(SERVICE, "userinfo", outcome(&result), start.elapsed());
        result
    }

    async fn token_request(
        &self,
        operation: &'static str,
        form: &[(&str, &str)],
    ) -> Result<TokenSet, UpstreamError> {
        let start = Instant::now();
        let result: Result<TokenSet, UpstreamError> = async {
            let response = self
                .client
                .post(&self.endpoints.token)
                .form(form)
                .send()
                .await
                .map_err(|e| {
                    warn!(target: "portal.keycloak", operation, error = %e, "Token request failed");
                    UpstreamError::Unavailable("Identity provider is unavailable".to_string())
                })?;

            let status = response.status();
            if !status.is_success() {
                // The body carries the OAuth error code (invalid_grant, ...)
                let body = response.text().await.unwrap_or_default();
                warn!(
                    target: "portal.keycloak",
                    operation,
                    status = %status,
                    body = %body,
                    "Token endpoint returned error"
                );
                return Err(status_error(SERVICE, status));
            }

            let tokens: TokenSet = response.json().await.map_err(|e| {
                warn!(target: "portal.keycloak", operation, error = %e, "Failed to parse token response");
                UpstreamError::InvalidResponse("token response could not be decoded".to_string())
            })?;

            let tokens = tokens.validate()?;
            debug!(
                target: "portal.keycloak",
                operation,
                expires_in = tokens.expires_in,
                "Token request succeeded"
            );
            Ok(tokens)
        }
        .await;

        record_upstream_request(SERVICE, operation, outcome(&result), start.elapsed());
        result
    }
}

fn outcome<T>(result: &Result<T, UpstreamError>) -> &'static str {
    if result.is_ok() {
        "success"
    } else {
        "error"
    }
}
