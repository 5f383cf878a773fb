//! Pending authorization sessions
//!
//! Maps the state token of an in-progress authorization to its PKCE verifier.
//! A state resolves at most once: `take` removes the entry in the same step
//! that reads it, so a replayed callback can never reuse a verifier.
//!
//! Entries older than the session TTL are rejected on resolve and swept
//! lazily each time a new flow begins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::BoxFuture;
use crate::constants::SESSION_TTL;
use crate::error::{Error, Result};
use crate::pkce;

/// Verifier waiting for its callback.
#[derive(Clone)]
pub struct PendingAuthorization {
    pub verifier: String,
    pub created_at: Instant,
}

impl std::fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("verifier", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Backing storage for pending authorizations.
///
/// Implementations must make `take` atomic: two concurrent calls with the
/// same state may not both observe the entry.
pub trait SessionStore: Send + Sync {
    fn insert(&self, state: String, pending: PendingAuthorization) -> BoxFuture<'_, Result<()>>;

    /// Read and remove in one step.
    fn take<'a>(&'a self, state: &'a str) -> BoxFuture<'a, Result<Option<PendingAuthorization>>>;

    fn contains<'a>(&'a self, state: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Drop entries older than `ttl`, returning how many were removed.
    fn purge_older_than(&self, ttl: Duration) -> BoxFuture<'_, Result<usize>>;
}

/// Process-memory session store. Contents are lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, PendingAuthorization>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl SessionStore for MemorySessionStore {
    fn insert(&self, state: String, pending: PendingAuthorization) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.entries.lock().await.insert(state, pending);
            Ok(())
        })
    }

    fn take<'a>(&'a self, state: &'a str) -> BoxFuture<'a, Result<Option<PendingAuthorization>>> {
        Box::pin(async move { Ok(self.entries.lock().await.remove(state)) })
    }

    fn contains<'a>(&'a self, state: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.entries.lock().await.contains_key(state)) })
    }

    fn purge_older_than(&self, ttl: Duration) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let before = entries.len();
            entries.retain(|_, p| p.created_at.elapsed() < ttl);
            Ok(before - entries.len())
        })
    }
}

/// Values produced when a flow begins. The caller builds the redirect URL
/// from `state` and `challenge`; `verifier` never leaves the server.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub state: String,
    pub verifier: String,
    pub challenge: String,
}

/// Starts and resolves authorization flows over a [`SessionStore`].
pub struct AuthorizationSessions {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl AuthorizationSessions {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            ttl: SESSION_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Generate state, verifier, and challenge and remember `state -> verifier`.
    pub async fn begin(&self) -> Result<AuthorizationRequest> {
        let swept = self.store.purge_older_than(self.ttl).await?;
        if swept > 0 {
            debug!(swept, "expired pending authorizations removed");
        }

        let state = pkce::generate_state();
        let verifier = pkce::generate_verifier();
        let challenge = pkce::compute_challenge(&verifier);

        self.store
            .insert(
                state.clone(),
                PendingAuthorization {
                    verifier: verifier.clone(),
                    created_at: Instant::now(),
                },
            )
            .await?;

        info!("authorization flow started");

        Ok(AuthorizationRequest {
            state,
            verifier,
            challenge,
        })
    }

    /// Consume the pending authorization for `state` and return its verifier.
    pub async fn resolve(&self, state: &str) -> Result<String> {
        let pending = self
            .store
            .take(state)
            .await?
            .ok_or(Error::InvalidOrExpiredState)?;

        if pending.created_at.elapsed() >= self.ttl {
            debug!("pending authorization outlived its TTL");
            return Err(Error::InvalidOrExpiredState);
        }

        Ok(pending.verifier)
    }

    /// Whether `state` is pending, without consuming it.
    pub async fn exists(&self, state: &str) -> Result<bool> {
        self.store.contains(state).await
    }
}
