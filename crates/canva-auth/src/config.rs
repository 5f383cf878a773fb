//! OAuth client registration

use std::time::Duration;

use common::Secret;

use crate::constants::{AUTHORIZE_ENDPOINT, REQUEST_TIMEOUT, SCOPES, TOKEN_ENDPOINT};

/// Everything needed to talk to the Canva authorization server on behalf of
/// one registered integration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_uri: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub scopes: Vec<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    /// Client config against the production Canva endpoints.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
            authorize_endpoint: AUTHORIZE_ENDPOINT.to_string(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Point the token endpoint elsewhere (tests, staging).
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Space-separated scope string as sent in the authorization URL.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}
