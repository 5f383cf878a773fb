//! Error types for OAuth authentication operations

use serde_json::Value;

/// Errors from the authorization handshake and token lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Callback state is unknown, already consumed, or past its TTL.
    #[error("invalid or expired state parameter")]
    InvalidOrExpiredState,

    /// Authorization code exchange was rejected or never reached the server.
    #[error("token exchange failed: {message}")]
    Exchange {
        message: String,
        details: Option<Value>,
    },

    /// Refresh grant was rejected or never reached the server.
    #[error("token refresh failed: {message}")]
    Refresh {
        message: String,
        details: Option<Value>,
    },

    /// No credential has ever been saved.
    #[error("no tokens found, authenticate first")]
    Unauthenticated,

    /// The stored credential expired and could not be refreshed.
    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl Error {
    /// Upstream payload attached to exchange/refresh failures, if any.
    pub fn details(&self) -> Option<&Value> {
        match self {
            Error::Exchange { details, .. } | Error::Refresh { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Whether recovering requires the user to run the authorization flow again.
    pub fn requires_authorization(&self) -> bool {
        matches!(
            self,
            Error::Unauthenticated | Error::AuthenticationRequired(_)
        )
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
