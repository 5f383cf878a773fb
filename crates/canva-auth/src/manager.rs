//! Access-token lifecycle
//!
//! `TokenManager` owns the single credential slot. Callers ask for a valid
//! access token; if the stored one is within the refresh margin it is
//! refreshed inline before returning.
//!
//! Refreshes are single-flight. Canva may invalidate a refresh token after
//! its first use, so two concurrent refreshes with the same token would
//! leave one caller holding a dead credential. The refresh lock serialises
//! refreshers, and each re-reads the slot after acquiring it: whoever waited
//! behind an in-flight refresh picks up its result instead of refreshing again.
//! A rejected refresh is remembered against the credential it was tried with,
//! so waiters fail with it rather than replaying the same refresh token.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_ACCOUNT, REFRESH_MARGIN};
use crate::credentials::{Credential, CredentialStore, now_millis};
use crate::error::{Error, Result};
use crate::token::{TokenExchange, TokenResponse};

/// Snapshot of the credential slot for health reporting. Never carries tokens.
#[derive(Debug, Clone, Serialize)]
pub struct TokenStatus {
    pub authenticated: bool,
    pub expires_at: Option<u64>,
    pub usable: bool,
}

pub struct TokenManager {
    store: Arc<dyn CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    account: String,
    refresh_margin: Duration,
    refresh_lock: Mutex<Option<FailedRefresh>>,
}

/// The credential whose refresh was rejected, and why.
struct FailedRefresh {
    credential: Credential,
    reason: String,
}

impl TokenManager {
    pub fn new(store: Arc<dyn CredentialStore>, exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            store,
            exchange,
            account: DEFAULT_ACCOUNT.to_string(),
            refresh_margin: REFRESH_MARGIN,
            refresh_lock: Mutex::new(None),
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Complete an authorization: exchange the code and store the result.
    ///
    /// Never retried; the code is single use.
    pub async fn authorize(&self, code: &str, verifier: &str) -> Result<TokenResponse> {
        let response = self.exchange.exchange_code(code, verifier).await?;
        self.save(&response).await?;
        info!(expires_in = response.expires_in, "authorization completed");
        Ok(response)
    }

    /// Overwrite the credential slot from a token endpoint response.
    pub async fn save(&self, response: &TokenResponse) -> Result<Credential> {
        let previous = self.store.get(&self.account).await?;
        let credential = Credential::from_response(
            response,
            previous.as_ref().map(|c| c.refresh_token.as_str()),
            now_millis(),
        )?;
        self.store
            .put(self.account.clone(), credential.clone())
            .await?;
        Ok(credential)
    }

    /// Return a usable access token, refreshing first if needed.
    pub async fn get_valid(&self) -> Result<String> {
        let credential = self
            .store
            .get(&self.account)
            .await?
            .ok_or(Error::Unauthenticated)?;
        if credential.is_usable(now_millis(), self.refresh_margin) {
            return Ok(credential.access_token);
        }

        let mut last_failure = self.refresh_lock.lock().await;

        // Someone else may have refreshed while we waited for the lock
        let credential = self
            .store
            .get(&self.account)
            .await?
            .ok_or(Error::Unauthenticated)?;
        if credential.is_usable(now_millis(), self.refresh_margin) {
            debug!("credential refreshed by a concurrent caller");
            return Ok(credential.access_token);
        }
        if let Some(failed) = last_failure.as_ref().filter(|f| f.credential == credential) {
            debug!("refresh already rejected for this credential");
            return Err(Error::AuthenticationRequired(failed.reason.clone()));
        }

        debug!(
            expires_at = credential.expires_at,
            "access token near expiry, refreshing"
        );
        let response = match self.exchange.refresh(&credential.refresh_token).await {
            Ok(r) => r,
            Err(e) => {
                metrics::counter!("oauth_token_refresh_total", "result" => "failure").increment(1);
                warn!(error = %e, "refresh failed, re-authorization required");
                let reason = e.to_string();
                *last_failure = Some(FailedRefresh {
                    credential,
                    reason: reason.clone(),
                });
                return Err(Error::AuthenticationRequired(reason));
            }
        };

        let refreshed = self.save(&response).await?;
        *last_failure = None;
        metrics::counter!("oauth_token_refresh_total", "result" => "success").increment(1);
        info!(expires_at = refreshed.expires_at, "access token refreshed");
        Ok(refreshed.access_token)
    }

    pub async fn status(&self) -> Result<TokenStatus> {
        let credential = self.store.get(&self.account).await?;
        Ok(match credential {
            Some(c) => TokenStatus {
                authenticated: true,
                expires_at: Some(c.expires_at),
                usable: c.is_usable(now_millis(), self.refresh_margin),
            },
            None => TokenStatus {
                authenticated: false,
                expires_at: None,
                usable: false,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use crate::credentials::MemoryCredentialStore;
    use crate::session::{AuthorizationSessions, MemorySessionStore};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records calls and answers from canned responses.
    #[derive(Default)]
    struct FakeExchange {
        exchanges: StdMutex<Vec<(String, String)>>,
        refreshes: AtomicUsize,
        refresh_delay: Duration,
        refresh_fails: bool,
    }

    impl FakeExchange {
        fn token(access: &str, refresh: Option<&str>, expires_in: u64) -> TokenResponse {
            TokenResponse {
                access_token: access.into(),
                refresh_token: refresh.map(str::to_string),
                expires_in,
                token_type: "Bearer".into(),
                scope: None,
            }
        }
    }

    impl TokenExchange for FakeExchange {
        fn exchange_code<'a>(
            &'a self,
            code: &'a str,
            verifier: &'a str,
        ) -> BoxFuture<'a, Result<TokenResponse>> {
            Box::pin(async move {
                self.exchanges
                    .lock()
                    .unwrap()
                    .push((code.to_string(), verifier.to_string()));
                Ok(Self::token("A1", Some("R1"), 3600))
            })
        }

        fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<TokenResponse>> {
            Box::pin(async move {
                let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(self.refresh_delay).await;
                if self.refresh_fails {
                    return Err(Error::Refresh {
                        message: format!("rejected {refresh_token}"),
                        details: None,
                    });
                }
                Ok(Self::token(&format!("A_refreshed_{n}"), None, 3600))
            })
        }
    }

    async fn manager_with(
        exchange: Arc<FakeExchange>,
        expires_in_millis: Option<u64>,
    ) -> (Arc<MemoryCredentialStore>, TokenManager) {
        let store = Arc::new(MemoryCredentialStore::new());
        if let Some(delta) = expires_in_millis {
            store
                .put(
                    DEFAULT_ACCOUNT.into(),
                    Credential {
                        access_token: "A_old".into(),
                        refresh_token: "R_old".into(),
                        token_type: "Bearer".into(),
                        expires_at: now_millis() + delta,
                    },
                )
                .await
                .unwrap();
        }
        let manager = TokenManager::new(store.clone(), exchange);
        (store, manager)
    }

    #[tokio::test]
    async fn no_credential_is_unauthenticated() {
        let (_, manager) = manager_with(Arc::new(FakeExchange::default()), None).await;
        assert!(matches!(
            manager.get_valid().await,
            Err(Error::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn fresh_credential_is_returned_without_refresh() {
        let exchange = Arc::new(FakeExchange::default());
        let (_, manager) = manager_with(exchange.clone(), Some(10 * 60 * 1000)).await;

        assert_eq!(manager.get_valid().await.unwrap(), "A_old");
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn credential_within_margin_is_refreshed() {
        let exchange = Arc::new(FakeExchange::default());
        let (store, manager) = manager_with(exchange.clone(), Some(4 * 60 * 1000)).await;

        assert_eq!(manager.get_valid().await.unwrap(), "A_refreshed_1");
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 1);

        let stored = store.get(DEFAULT_ACCOUNT).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "A_refreshed_1");
        assert_eq!(
            stored.refresh_token, "R_old",
            "refresh token kept when the response does not rotate it"
        );
    }

    #[tokio::test]
    async fn refresh_failure_requires_authentication() {
        let exchange = Arc::new(FakeExchange {
            refresh_fails: true,
            ..Default::default()
        });
        let (store, manager) = manager_with(exchange.clone(), Some(0)).await;

        let err = manager.get_valid().await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationRequired(_)), "got {err:?}");
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 1, "no retry");
        // The stale credential is left in place, not deleted
        assert!(store.get(DEFAULT_ACCOUNT).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let exchange = Arc::new(FakeExchange {
            refresh_delay: Duration::from_millis(50),
            ..Default::default()
        });
        let (_, manager) = manager_with(exchange.clone(), Some(0)).await;
        let manager = Arc::new(manager);

        let mut handles = vec![];
        for _ in 0..10 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.get_valid().await }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "A_refreshed_1");
        }

        assert_eq!(
            exchange.refreshes.load(Ordering::SeqCst),
            1,
            "only one refresh may reach the token endpoint"
        );
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_failed_refresh() {
        let exchange = Arc::new(FakeExchange {
            refresh_delay: Duration::from_millis(50),
            refresh_fails: true,
            ..Default::default()
        });
        let (_, manager) = manager_with(exchange.clone(), Some(0)).await;
        let manager = Arc::new(manager);

        let mut handles = vec![];
        for _ in 0..10 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.get_valid().await }));
        }
        for h in handles {
            let err = h.await.unwrap().unwrap_err();
            assert!(matches!(err, Error::AuthenticationRequired(_)), "got {err:?}");
        }

        assert_eq!(
            exchange.refreshes.load(Ordering::SeqCst),
            1,
            "a rejected refresh token must not be replayed"
        );
    }

    #[tokio::test]
    async fn new_authorization_clears_failed_refresh() {
        let exchange = Arc::new(FakeExchange {
            refresh_fails: true,
            ..Default::default()
        });
        let (_, manager) = manager_with(exchange.clone(), Some(0)).await;

        assert!(manager.get_valid().await.is_err());
        assert!(manager.get_valid().await.is_err());
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 1);

        manager.authorize("C2", "verifier").await.unwrap();
        assert_eq!(manager.get_valid().await.unwrap(), "A1");
    }

    #[tokio::test]
    async fn status_reports_without_tokens() {
        let (_, manager) = manager_with(Arc::new(FakeExchange::default()), None).await;
        let status = manager.status().await.unwrap();
        assert!(!status.authenticated);
        assert!(status.expires_at.is_none());

        let (_, manager) =
            manager_with(Arc::new(FakeExchange::default()), Some(60 * 60 * 1000)).await;
        let status = manager.status().await.unwrap();
        assert!(status.authenticated);
        assert!(status.usable);
    }

    #[tokio::test]
    async fn begin_callback_then_get_valid_end_to_end() {
        let sessions = AuthorizationSessions::new(Arc::new(MemorySessionStore::new()));
        let exchange = Arc::new(FakeExchange::default());
        let (_, manager) = manager_with(exchange.clone(), None).await;

        let request = sessions.begin().await.unwrap();
        let verifier = sessions.resolve(&request.state).await.unwrap();
        let response = manager.authorize("C1", &verifier).await.unwrap();
        assert_eq!(response.access_token, "A1");

        assert_eq!(
            exchange.exchanges.lock().unwrap().as_slice(),
            &[("C1".to_string(), request.verifier.clone())]
        );
        assert_eq!(manager.get_valid().await.unwrap(), "A1");
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 0);
    }
}
