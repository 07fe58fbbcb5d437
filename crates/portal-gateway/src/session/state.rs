//! Authenticated session state.
//!
//! An [`AuthState`] is either absent or complete: the only way to build one
//! is [`AuthState::assemble`], which refuses a token set or a user record
//! missing any of the fields the portal relies on. Token replacement and
//! expiry move together in [`AuthState::apply_refresh`].

use crate::services::{BmsCompany, BmsUserInfo, TokenSet};
use common::secret::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A required field was missing from the sign-in result.
    #[error("Sign-in result is incomplete: missing {0}")]
    Incomplete(&'static str),

    /// The user is not a member of the requested company.
    #[error("User is not a member of the requested company")]
    UnknownCompany,
}

/// A company the signed-in user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyMembership {
    pub company_id: String,
    pub company_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl From<BmsCompany> for CompanyMembership {
    fn from(company: BmsCompany) -> Self {
        Self {
            company_id: company.company_id,
            company_name: company.company_name,
            role: company.role,
        }
    }
}

/// Everything the portal knows about a signed-in user.
#[derive(Clone)]
pub struct AuthState {
    pub token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub id_token: Option<SecretString>,
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub companies: Vec<CompanyMembership>,
    pub current_company_id: Option<String>,
    /// Access token expiry, Unix seconds.
    pub expires_at: i64,
    /// Refresh token expiry, Unix seconds, when the IdP reports one.
    pub refresh_expires_at: Option<i64>,
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("user_id", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("companies", &self.companies.len())
            .field("current_company_id", &self.current_company_id)
            .field("expires_at", &self.expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

impl AuthState {
    /// Build the session record from a fresh token set and the BMS user record.
    ///
    /// `now` is Unix seconds. The first company becomes the current one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Incomplete` if the access token, user id or
    /// email is empty.
    pub fn assemble(tokens: TokenSet, userinfo: BmsUserInfo, now: i64) -> Result<Self, SessionError> {
        if tokens.access_token.expose_secret().is_empty() {
            return Err(SessionError::Incomplete("access token"));
        }
        if userinfo.user.id.trim().is_empty() {
            return Err(SessionError::Incomplete("user id"));
        }
        if userinfo.user.email.trim().is_empty() {
            return Err(SessionError::Incomplete("email"));
        }

        let companies: Vec<CompanyMembership> = userinfo
            .companies
            .into_iter()
            .map(CompanyMembership::from)
            .collect();
        let current_company_id = companies.first().map(|c| c.company_id.clone());
        let name = userinfo
            .user
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| userinfo.user.email.clone());

        Ok(Self {
            token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            id_token: tokens.id_token,
            user_id: userinfo.user.id,
            email: userinfo.user.email,
            name,
            companies,
            current_company_id,
            expires_at: now.saturating_add(tokens.expires_in),
            refresh_expires_at: refresh_deadline(tokens.refresh_expires_in, now),
        })
    }

    /// Replace the tokens after a refresh.
    ///
    /// The refresh and id tokens are kept when the IdP does not rotate them.
    pub fn apply_refresh(&mut self, tokens: TokenSet, now: i64) {
        self.token = tokens.access_token;
        if let Some(refresh_token) = tokens.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(id_token) = tokens.id_token {
            self.id_token = Some(id_token);
        }
        self.expires_at = now.saturating_add(tokens.expires_in);
        if let Some(deadline) = refresh_deadline(tokens.refresh_expires_in, now) {
            self.refresh_expires_at = Some(deadline);
        }
    }

    /// Make `company_id` the current company.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownCompany` if the user is not a member.
    pub fn switch_company(&mut self, company_id: &str) -> Result<(), SessionError> {
        if !self.companies.iter().any(|c| c.company_id == company_id) {
            return Err(SessionError::UnknownCompany);
        }
        self.current_company_id = Some(company_id.to_string());
        Ok(())
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at < now
    }

    /// Last second the session can be used or refreshed, Unix seconds.
    ///
    /// Without a refresh token or a reported refresh lifetime the access
    /// token expiry is the end of the session.
    pub fn horizon(&self) -> i64 {
        match (&self.refresh_token, self.refresh_expires_at) {
            (Some(_), Some(deadline)) => deadline.max(self.expires_at),
            _ => self.expires_at,
        }
    }

    /// Whether the session can no longer be used or refreshed.
    pub fn is_stale_at(&self, now: i64) -> bool {
        self.horizon() < now
    }

    /// `Max-Age` for the `portal-session` cookie at `now`.
    pub fn session_cookie_max_age(&self, now: i64) -> i64 {
        self.horizon().saturating_sub(now).max(0)
    }

    /// Seconds until the access token expires, never negative.
    pub fn remaining_seconds(&self, now: i64) -> i64 {
        self.expires_at.saturating_sub(now).max(0)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            companies: self.companies.clone(),
            current_company_id: self.current_company_id.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// Keycloak reports `refresh_expires_in: 0` for offline tokens.
fn refresh_deadline(refresh_expires_in: Option<i64>, now: i64) -> Option<i64> {
    refresh_expires_in
        .filter(|secs| *secs > 0)
        .map(|secs| now.saturating_add(secs))
}

/// Session view returned by `GET /api/session`. Never includes tokens.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub companies: Vec<CompanyMembership>,
    pub current_company_id: Option<String>,
    pub expires_at: i64,
}
