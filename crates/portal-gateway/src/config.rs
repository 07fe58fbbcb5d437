//! Portal gateway configuration.
//!
//! Configuration is loaded from environment variables. The variable names
//! for the identity provider and the BMS backend are shared with the portal
//! frontend build (`NEXT_PUBLIC_*`). The client secret is redacted in Debug
//! output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default public URL of the portal.
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Portal gateway configuration.
#[derive(Clone)]
pub struct Config {
    /// Keycloak base URL (e.g., "https://sso.example.com").
    pub keycloak_url: String,

    /// Keycloak realm name.
    pub keycloak_realm: String,

    /// OIDC client id registered for the portal.
    pub keycloak_client_id: String,

    /// OIDC client secret, only for confidential clients.
    pub keycloak_client_secret: Option<SecretString>,

    /// BMS backend base URL (e.g., "https://bms.example.com").
    pub api_base_url: String,

    /// Public URL the browser uses to reach the portal. The OIDC redirect
    /// URI and the post-logout redirect are derived from it.
    pub public_url: String,

    /// Server bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Whether cookies are issued with the `Secure` attribute.
    pub cookie_secure: bool,

    /// Seconds to keep serving in-flight requests after a shutdown signal.
    pub drain_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("keycloak_url", &self.keycloak_url)
            .field("keycloak_realm", &self.keycloak_realm)
            .field("keycloak_client_id", &self.keycloak_client_id)
            .field(
                "keycloak_client_secret",
                &self.keycloak_client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_base_url", &self.api_base_url)
            .field("public_url", &self.public_url)
            .field("bind_address", &self.bind_address)
            .field("cookie_secure", &self.cookie_secure)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid URL in {var}: {reason}")]
    InvalidUrl { var: String, reason: String },

    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let keycloak_url = required_url(vars, "NEXT_PUBLIC_KEYCLOAK_URL")?;
        let keycloak_realm = required(vars, "NEXT_PUBLIC_KEYCLOAK_REALM")?;
        let keycloak_client_id = required(vars, "NEXT_PUBLIC_KEYCLOAK_CLIENT_ID")?;
        let api_base_url = required_url(vars, "NEXT_PUBLIC_API_URL")?;

        let keycloak_client_secret = vars
            .get("KEYCLOAK_CLIENT_SECRET")
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::from(s.clone()));

        let public_url = match vars.get("PORTAL_PUBLIC_URL") {
            Some(_) => required_url(vars, "PORTAL_PUBLIC_URL")?,
            None => DEFAULT_PUBLIC_URL.to_string(),
        };

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let cookie_secure = match vars.get("COOKIE_SECURE").map(String::as_str) {
            None => false,
            Some("true" | "1") => true,
            Some("false" | "0") => false,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "COOKIE_SECURE".to_string(),
                    reason: format!("expected true/false, got '{}'", other),
                })
            }
        };

        let drain_seconds = match vars.get("PORTAL_DRAIN_SECONDS") {
            Some(value_str) => value_str.parse().map_err(|e| ConfigError::InvalidValue {
                var: "PORTAL_DRAIN_SECONDS".to_string(),
                reason: format!("must be a non-negative integer, got '{}': {}", value_str, e),
            })?,
            None => 0,
        };

        Ok(Config {
            keycloak_url,
            keycloak_realm,
            keycloak_client_id,
            keycloak_client_secret,
            api_base_url,
            public_url,
            bind_address,
            cookie_secure,
            drain_seconds,
        })
    }

    /// OIDC redirect URI registered with Keycloak.
    pub fn redirect_uri(&self) -> String {
        format!("{}/auth/callback", self.public_url)
    }

    /// Where Keycloak sends the browser after end-session.
    pub fn post_logout_redirect_uri(&self) -> String {
        format!("{}/login", self.public_url)
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.trim().to_string())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Required http(s) URL, normalized without a trailing slash.
fn required_url(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    let value = required(vars, name)?;
    let parsed = reqwest::Url::parse(&value).map_err(|e| ConfigError::InvalidUrl {
        var: name.to_string(),
        reason: e.to_string(),
    })?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::InvalidUrl {
            var: name.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    Ok(value.trim_end_matches('/').to_string())
}
