//! Builder for test access tokens.
//!
//! Tokens are HS256-signed with a throwaway key. The gateway never checks
//! signatures, so any key works; signing keeps the tokens realistic.

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Map, Value};

const TEST_SIGNING_KEY: &[u8] = b"portal-test-signing-key";

/// Builder for test access tokens.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_role("admin")
///     .expires_in(300)
///     .build();
/// ```
pub struct TestTokenBuilder {
    sub: String,
    email: Option<String>,
    role: Option<Value>,
    exp: Option<i64>,
    iat: i64,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults (valid for one hour, no role).
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            email: None,
            role: None,
            exp: Some((now + Duration::seconds(3600)).timestamp()),
            iat: now.timestamp(),
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    /// Set a single `role` claim
    pub fn with_role(mut self, role: &str) -> Self {
        self.role = Some(json!(role));
        self
    }

    /// Set the `role` claim as an array
    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.role = Some(json!(roles));
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Omit the `exp` claim
    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Build the claims as a JSON value
    pub fn claims(&self) -> Value {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("iat".to_string(), json!(self.iat));
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), json!(exp));
        }
        if let Some(email) = &self.email {
            claims.insert("email".to_string(), json!(email));
        }
        if let Some(role) = &self.role {
            claims.insert("role".to_string(), role.clone());
        }
        Value::Object(claims)
    }

    /// Build a signed compact JWT
    pub fn build(self) -> String {
        encode(
            &Header::default(),
            &self.claims(),
            &EncodingKey::from_secret(TEST_SIGNING_KEY),
        )
        .expect("HS256 encoding of a JSON object cannot fail")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
