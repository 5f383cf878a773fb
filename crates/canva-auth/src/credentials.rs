//! Credential storage for OAuth tokens
//!
//! A credential is keyed by account; the gateway only ever uses the
//! `"default"` slot. Credentials are created or overwritten by a code
//! exchange or refresh and never deleted.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::BoxFuture;
use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// Live OAuth credentials.
///
/// `expires_at` is a unix timestamp in milliseconds (absolute, not a delta),
/// computed at storage time from `TokenResponse.expires_in`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: u64,
}

impl Credential {
    /// Build a credential from a token endpoint response received at `now_millis`.
    ///
    /// Falls back to `previous_refresh` when the response carries no refresh
    /// token; refresh responses may omit it when the token is not rotated.
    pub fn from_response(
        response: &TokenResponse,
        previous_refresh: Option<&str>,
        now_millis: u64,
    ) -> Result<Self> {
        let refresh_token = response
            .refresh_token
            .as_deref()
            .or(previous_refresh)
            .ok_or_else(|| Error::Exchange {
                message: "token response did not include a refresh_token".into(),
                details: None,
            })?
            .to_string();

        Ok(Self {
            access_token: response.access_token.clone(),
            refresh_token,
            token_type: response.token_type.clone(),
            expires_at: now_millis.saturating_add(response.expires_in.saturating_mul(1000)),
        })
    }

    /// Usable only while more than `margin` remains before expiry.
    pub fn is_usable(&self, now_millis: u64, margin: Duration) -> bool {
        let margin = u64::try_from(margin.as_millis()).unwrap_or(u64::MAX);
        now_millis.saturating_add(margin) < self.expires_at
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Backing storage for credentials.
pub trait CredentialStore: Send + Sync {
    fn get<'a>(&'a self, account: &'a str) -> BoxFuture<'a, Result<Option<Credential>>>;

    /// Add or replace the credential for `account`.
    fn put(&self, account: String, credential: Credential) -> BoxFuture<'_, Result<()>>;
}

/// Process-memory credential store. Reads take the lock briefly to clone.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: RwLock<HashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get<'a>(&'a self, account: &'a str) -> BoxFuture<'a, Result<Option<Credential>>> {
        Box::pin(async move { Ok(self.state.read().await.get(account).cloned()) })
    }

    fn put(&self, account: String, credential: Credential) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            debug!(account, expires_at = credential.expires_at, "stored credential");
            self.state.write().await.insert(account, credential);
            Ok(())
        })
    }
}
