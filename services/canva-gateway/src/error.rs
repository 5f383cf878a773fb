//! HTTP error responses
//!
//! Every failure leaves the gateway as `{"success": false, "error": ..., "details": ...}`
//! with the upstream payload in `details` when one exists.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;

use crate::json_response;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{error}")]
    BadRequest {
        error: String,
        details: Option<Value>,
    },

    /// No usable credential; the caller must run the authorization flow.
    #[error("{error}")]
    Unauthorized {
        error: String,
        details: Option<Value>,
        auth_url: String,
    },

    #[error("{error}")]
    Internal {
        error: String,
        details: Option<Value>,
    },

    #[error("{error}")]
    BadGateway {
        error: String,
        details: Option<Value>,
    },
}

impl ApiError {
    pub fn bad_request(error: impl Into<String>) -> Self {
        ApiError::BadRequest {
            error: error.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({ "success": false });
        match self {
            ApiError::Unauthorized {
                error,
                details,
                auth_url,
            } => {
                body["error"] = Value::String(error);
                body["auth_url"] = Value::String(auth_url);
                if let Some(details) = details {
                    body["details"] = details;
                }
            }
            ApiError::BadRequest { error, details }
            | ApiError::Internal { error, details }
            | ApiError::BadGateway { error, details } => {
                body["error"] = Value::String(error);
                if let Some(details) = details {
                    body["details"] = details;
                }
            }
        }
        json_response(status, body)
    }
}
