//! Sign-in bookkeeping between `/login` and `/auth/callback`.
//!
//! `/login` mints a random OIDC `state`, remembers where the browser wanted
//! to go, and redirects to Keycloak. `/auth/callback` consumes that entry
//! and, through [`CallbackGuard`], makes sure each authorization code is
//! processed at most once.
//!
//! Both stores are bounded in time: entries older than their TTL are
//! ignored on read and dropped by the session sweeper.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// How long a `state` minted by `/login` stays valid.
pub const LOGIN_STATE_TTL: Duration = Duration::from_secs(600);

/// How long a processed authorization code is remembered.
pub const CALLBACK_CODE_TTL: Duration = Duration::from_secs(600);

/// Random bytes in an OIDC `state` value (128 bits).
const STATE_BYTES: usize = 16;

/// Generate an OIDC `state` value from the OS CSPRNG, base64url encoded.
///
/// # Errors
///
/// Returns an error if the system RNG fails.
pub fn generate_state(rng: &SystemRandom) -> Result<String, ring::error::Unspecified> {
    let mut bytes = [0u8; STATE_BYTES];
    rng.fill(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Reduce a requested post-login target to a same-origin path.
///
/// Only values starting with a single `/` are kept. Absolute URLs,
/// protocol-relative `//host` forms, backslash tricks and empty values all
/// become `/`.
pub fn sanitize_return_to(requested: Option<&str>) -> String {
    match requested {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

#[derive(Debug, Clone)]
struct PendingLogin {
    return_to: String,
    created_at: Instant,
}

/// `state` → `return_to` for sign-ins in progress.
#[derive(Clone, Default)]
pub struct PendingLoginStore {
    entries: Arc<Mutex<HashMap<String, PendingLogin>>>,
}

impl PendingLoginStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, state: String, return_to: String) {
        self.insert_at(state, return_to, Instant::now()).await;
    }

    /// Consume the entry for `state`. A second call for the same `state`
    /// returns `None`.
    pub async fn take(&self, state: &str) -> Option<String> {
        self.take_at(state, Instant::now()).await
    }

    /// Drop entries older than [`LOGIN_STATE_TTL`]. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now()).await
    }

    async fn insert_at(&self, state: String, return_to: String, now: Instant) {
        self.entries.lock().await.insert(
            state,
            PendingLogin {
                return_to,
                created_at: now,
            },
        );
    }

    async fn take_at(&self, state: &str, now: Instant) -> Option<String> {
        let entry = self.entries.lock().await.remove(state)?;
        if now.saturating_duration_since(entry.created_at) > LOGIN_STATE_TTL {
            return None;
        }
        Some(entry.return_to)
    }

    async fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.created_at) <= LOGIN_STATE_TTL);
        before - entries.len()
    }
}

/// Remembers which authorization codes have been processed.
///
/// Codes are kept as SHA-256 digests, not in plaintext.
#[derive(Clone, Default)]
pub struct CallbackGuard {
    seen: Arc<Mutex<HashMap<Vec<u8>, Instant>>>,
}

impl CallbackGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `code` for processing. Returns `false` if it was claimed
    /// before, in which case the caller must not use it.
    pub async fn try_claim(&self, code: &str) -> bool {
        self.try_claim_at(code, Instant::now()).await
    }

    /// Forget codes older than [`CALLBACK_CODE_TTL`]. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now()).await
    }

    async fn try_claim_at(&self, code: &str, now: Instant) -> bool {
        let key = digest::digest(&digest::SHA256, code.as_bytes()).as_ref().to_vec();
        let mut seen = self.seen.lock().await;
        match seen.get(&key) {
            Some(claimed_at) if now.saturating_duration_since(*claimed_at) <= CALLBACK_CODE_TTL => {
                false
            }
            _ => {
                seen.insert(key, now);
                true
            }
        }
    }

    async fn purge_expired_at(&self, now: Instant) -> usize {
        let mut seen = self.seen.lock().await;
        let before = seen.len();
        seen.retain(|_, claimed_at| now.saturating_duration_since(*claimed_at) <= CALLBACK_CODE_TTL);
        before - seen.len()
    }
}
