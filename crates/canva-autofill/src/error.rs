//! Error types for autofill operations

use serde_json::Value;

/// Errors from the autofill API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Job creation failed (non-2xx, timeout, or unreadable response).
    #[error("autofill submission failed: {message}")]
    Submission {
        message: String,
        details: Option<Value>,
    },

    /// A single status check failed. Ends polling; never retried.
    #[error("job status check failed: {0}")]
    PollTransport(String),

    #[error("invalid job status response: {0}")]
    InvalidResponse(String),
}

impl Error {
    pub fn details(&self) -> Option<&Value> {
        match self {
            Error::Submission { details, .. } => details.as_ref(),
            _ => None,
        }
    }
}

/// Result alias for autofill operations.
pub type Result<T> = std::result::Result<T, Error>;
