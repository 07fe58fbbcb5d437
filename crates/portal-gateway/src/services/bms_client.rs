//! BMS backend HTTP client.
//!
//! Two calls are made on behalf of a signed-in user: the userinfo lookup
//! that completes sign-in, and request forwarding for `/api/bms/*`. Both
//! carry the user's access token as a bearer token. The backend verifies
//! token signatures; the gateway does not.

use crate::observability::metrics::record_upstream_request;
use crate::services::{build_http_client, status_error, UpstreamError};
use axum::body::Bytes;
use axum::http::Method;
use common::secret::{ExposeSecret, SecretString};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::time::Instant;
use tracing::{instrument, warn};

const SERVICE: &str = "bms";

/// Header carrying the user's current company on forwarded requests.
pub const COMPANY_HEADER: &str = "X-Company-Id";

/// User record from `GET /api/auth/oidc/userinfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct BmsUser {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// One company the user belongs to.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BmsCompany {
    #[serde(deserialize_with = "string_or_number")]
    pub company_id: String,
    pub company_name: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Body of the BMS userinfo response.
#[derive(Debug, Clone, Deserialize)]
pub struct BmsUserInfo {
    pub user: BmsUser,
    #[serde(default)]
    pub companies: Vec<BmsCompany>,
}

/// Request forwarded to `{API_BASE}/api/{path}`.
#[derive(Debug)]
pub struct ForwardRequest {
    pub method: Method,
    /// Path below `/api/`, without a leading slash.
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub access_token: SecretString,
    pub company_id: Option<String>,
}

/// Upstream answer, passed back to the browser unchanged.
#[derive(Debug)]
pub struct ForwardResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// HTTP client for the BMS backend.
#[derive(Clone)]
pub struct BmsClient {
    client: Client,
    base_url: String,
}

impl BmsClient {
    /// Create a client for the backend at `base_url` (no trailing slash).
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Configuration` if the HTTP client cannot be built.
    pub fn new(base_url: String) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: build_http_client()?,
            base_url,
        })
    }

    /// Resolve the signed-in user and their company memberships.
    ///
    /// # Errors
    ///
    /// - `UpstreamError::Unavailable` if BMS is unreachable or returns 5xx
    /// - `UpstreamError::Rejected` on 4xx
    /// - `UpstreamError::InvalidResponse` if the body does not decode
    #[instrument(skip_all)]
    pub async fn fetch_user_info(
        &self,
        access_token: &SecretString,
    ) -> Result<BmsUserInfo, UpstreamError> {
        let url = format!("{}/api/auth/oidc/userinfo", self.base_url);
        let start = Instant::now();

        let result: Result<BmsUserInfo, UpstreamError> = async {
            let response = self
                .client
                .get(&url)
                .bearer_auth(access_token.expose_secret())
                .send()
                .await
                .map_err(|e| {
                    warn!(target: "portal.bms", error = %e, "BMS userinfo request failed");
                    UpstreamError::Unavailable("BMS backend is unavailable".to_string())
                })?;

            let status = response.status();
            if !status.is_success() {
                warn!(target: "portal.bms", status = %status, "BMS userinfo request rejected");
                return Err(status_error(SERVICE, status));
            }

            response.json().await.map_err(|e| {
                warn!(target: "portal.bms", error = %e, "Failed to parse BMS userinfo response");
                UpstreamError::InvalidResponse("BMS userinfo could not be decoded".to_string())
            })
        }
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        record_upstream_request(SERVICE, "userinfo", status, start.elapsed());
        result
    }

    /// Forward a request to the backend and return whatever it answered.
    ///
    /// Non-2xx statuses are not errors here; they are passed through.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::Unavailable` if the backend cannot be reached
    /// or the response body cannot be read.
    #[instrument(skip_all, fields(method = %request.method))]
    pub async fn forward(&self, request: ForwardRequest) -> Result<ForwardResponse, UpstreamError> {
        let mut url = format!(
            "{}/api/{}",
            self.base_url,
            request.path.trim_start_matches('/')
        );
        if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }

        let start = Instant::now();
        let mut builder = self
            .client
            .request(request.method, &url)
            .bearer_auth(request.access_token.expose_secret());
        if let Some(content_type) = &request.content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(company_id) = &request.company_id {
            builder = builder.header(COMPANY_HEADER, company_id);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(target: "portal.bms", error = %e, "BMS forward request failed");
            record_upstream_request(SERVICE, "forward", "error", start.elapsed());
            UpstreamError::Unavailable("BMS backend is unavailable".to_string())
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| {
            warn!(target: "portal.bms", error = %e, "Failed to read BMS response body");
            record_upstream_request(SERVICE, "forward", "error", start.elapsed());
            UpstreamError::Unavailable("BMS backend is unavailable".to_string())
        })?;

        record_upstream_request(SERVICE, "forward", "success", start.elapsed());
        Ok(ForwardResponse {
            status,
            content_type,
            body,
        })
    }
}

/// BMS ids are numeric in some deployments and strings in others.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
