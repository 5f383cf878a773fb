//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (completing the browser flow)
//! 2. Token refresh (lazy, when the stored token is near expiry)
//!
//! Both POST form-encoded bodies to the token endpoint with HTTP Basic client
//! authentication. Neither is retried here: authorization codes are single
//! use and Canva may rotate refresh tokens on first use.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::BoxFuture;
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time.
#[derive(Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// The two grants the token manager and callback handler depend on.
///
/// Boxed futures keep the trait dyn-compatible (`Arc<dyn TokenExchange>`).
pub trait TokenExchange: Send + Sync {
    /// Trade an authorization code plus its PKCE verifier for tokens.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse>>;

    /// Trade a refresh token for a fresh access token.
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<TokenResponse>>;
}

/// Why a token endpoint call failed, before it is tagged as exchange or refresh.
struct EndpointFailure {
    message: String,
    details: Option<Value>,
}

/// reqwest-backed [`TokenExchange`] against the configured token endpoint.
#[derive(Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl TokenClient {
    pub fn new(http: reqwest::Client, config: Arc<ClientConfig>) -> Self {
        Self { http, config }
    }

    async fn post_grant(
        &self,
        params: &[(&str, &str)],
    ) -> std::result::Result<TokenResponse, EndpointFailure> {
        let response = self
            .http
            .post(&self.config.token_endpoint)
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose()),
            )
            .timeout(self.config.timeout)
            .form(params)
            .send()
            .await
            .map_err(|e| EndpointFailure {
                message: if e.is_timeout() {
                    format!("token endpoint timed out: {e}")
                } else {
                    format!("token endpoint request failed: {e}")
                },
                details: None,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| EndpointFailure {
            message: format!("reading token endpoint response: {e}"),
            details: None,
        })?;

        if !status.is_success() {
            return Err(EndpointFailure {
                message: format!("token endpoint returned {status}"),
                details: Some(payload(&body)),
            });
        }

        serde_json::from_str::<TokenResponse>(&body).map_err(|e| EndpointFailure {
            message: format!("invalid token response: {e}"),
            details: Some(payload(&body)),
        })
    }
}

/// Upstream body as JSON when it parses, raw text otherwise.
fn payload(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

impl TokenExchange for TokenClient {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
    ) -> BoxFuture<'a, Result<TokenResponse>> {
        Box::pin(async move {
            debug!("exchanging authorization code");
            let response = self
                .post_grant(&[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("code_verifier", verifier),
                    ("redirect_uri", self.config.redirect_uri.as_str()),
                ])
                .await
                .map_err(|f| {
                    warn!(error = %f.message, "authorization code exchange failed");
                    Error::Exchange {
                        message: f.message,
                        details: f.details,
                    }
                })?;

            if response.refresh_token.is_none() {
                return Err(Error::Exchange {
                    message: "token response did not include a refresh_token".into(),
                    details: None,
                });
            }
            Ok(response)
        })
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<TokenResponse>> {
        Box::pin(async move {
            debug!("refreshing access token");
            self.post_grant(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await
            .map_err(|f| {
                warn!(error = %f.message, "token refresh failed");
                Error::Refresh {
                    message: f.message,
                    details: f.details,
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use common::Secret;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TokenClient {
        let config = ClientConfig::new(
            "client-id",
            Secret::new("client-secret".into()),
            "http://127.0.0.1:3000/callback",
        )
        .with_token_endpoint(format!("{}/rest/v1/oauth/token", server.uri()))
        .with_timeout(Duration::from_millis(500));
        TokenClient::new(reqwest::Client::new(), Arc::new(config))
    }

    fn basic_header() -> String {
        format!("Basic {}", STANDARD.encode("client-id:client-secret"))
    }

    #[test]
    fn token_response_deserializes_without_optional_fields() {
        let json = r#"{"access_token":"at_abc","expires_in":14400}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at_abc");
        assert!(token.refresh_token.is_none());
        assert_eq!(token.token_type, "Bearer");
    }

    #[test]
    fn token_response_debug_hides_tokens() {
        let json = r#"{"access_token":"at_abc","refresh_token":"rt_def","expires_in":1}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("at_abc"));
        assert!(!debug.contains("rt_def"));
    }

    #[tokio::test]
    async fn exchange_posts_code_grant_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/oauth/token"))
            .and(header("authorization", basic_header().as_str()))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=C1"))
            .and(body_string_contains("code_verifier=V1"))
            .and(body_string_contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A3000%2Fcallback"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "A1",
                "refresh_token": "R1",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = client_for(&server).exchange_code("C1", "V1").await.unwrap();
        assert_eq!(token.access_token, "A1");
        assert_eq!(token.refresh_token.as_deref(), Some("R1"));
        assert_eq!(token.expires_in, 3600);
    }

    #[tokio::test]
    async fn exchange_surfaces_upstream_payload_on_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "code expired"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .exchange_code("stale", "V1")
            .await
            .unwrap_err();
        match &err {
            Error::Exchange { message, details } => {
                assert!(message.contains("400"), "got: {message}");
                assert_eq!(details.as_ref().unwrap()["error"], "invalid_grant");
            }
            other => panic!("expected Exchange, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exchange_without_refresh_token_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "A1",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).exchange_code("C1", "V1").await.unwrap_err();
        assert!(matches!(err, Error::Exchange { .. }));
    }

    #[tokio::test]
    async fn exchange_timeout_maps_to_exchange_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = client_for(&server).exchange_code("C1", "V1").await.unwrap_err();
        match err {
            Error::Exchange { message, details } => {
                assert!(message.contains("timed out"), "got: {message}");
                assert!(details.is_none());
            }
            other => panic!("expected Exchange, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_posts_refresh_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", basic_header().as_str()))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=R1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "A2",
                "expires_in": 14400,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = client_for(&server).refresh("R1").await.unwrap();
        assert_eq!(token.access_token, "A2");
        assert!(token.refresh_token.is_none(), "absent rotation is not an error");
    }

    #[tokio::test]
    async fn refresh_rejection_maps_to_refresh_error_with_text_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("revoked"))
            .mount(&server)
            .await;

        let err = client_for(&server).refresh("R1").await.unwrap_err();
        match err {
            Error::Refresh { details, .. } => {
                assert_eq!(details, Some(Value::String("revoked".into())));
            }
            other => panic!("expected Refresh, got {other:?}"),
        }
    }
}
