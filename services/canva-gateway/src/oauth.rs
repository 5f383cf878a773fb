//! Authorization routes
//!
//! - GET /api/auth/start (alias /api/auth/canva): begin a PKCE flow, redirect to Canva
//! - GET /callback: resolve state, exchange the code, store the credential

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::{AppState, json_response};

/// Where clients are sent to (re-)authorize.
pub const AUTH_START_PATH: &str = "/api/auth/start";

/// GET /api/auth/start: 302 to Canva's authorize page.
pub async fn start(State(state): State<AppState>) -> Response {
    let request = match state.sessions.begin().await {
        Ok(r) => r,
        Err(e) => return auth_url_failure(e),
    };

    match canva_auth::build_authorization_url(&state.client, &request.state, &request.challenge) {
        Ok(url) => (StatusCode::FOUND, [(header::LOCATION, url)]).into_response(),
        Err(e) => auth_url_failure(e),
    }
}

fn auth_url_failure(e: canva_auth::Error) -> Response {
    warn!(error = %e, "could not start authorization");
    ApiError::Internal {
        error: "Failed to generate auth URL".into(),
        details: Some(Value::String(e.to_string())),
    }
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /callback: Canva redirects here with `code` and `state`, or `error`.
pub async fn callback(
    State(state): State<AppState>,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest {
        error: "Invalid callback parameters".into(),
        details: Some(Value::String(e.body_text())),
    })?;

    if let Some(error) = params.error {
        warn!(error, "authorization denied upstream");
        return Err(ApiError::BadRequest {
            error: "OAuth authorization failed".into(),
            details: Some(Value::String(error)),
        });
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing authorization code"))?;

    let invalid_state = || ApiError::bad_request("Invalid or expired state parameter");
    let callback_state = params.state.ok_or_else(invalid_state)?;
    let verifier = state
        .sessions
        .resolve(&callback_state)
        .await
        .map_err(|_| invalid_state())?;

    let tokens = state
        .tokens
        .authorize(&code, &verifier)
        .await
        .map_err(|e| {
            warn!(error = %e, "authorization code exchange failed");
            ApiError::Internal {
                error: "Failed to exchange code for tokens".into(),
                details: Some(
                    e.details()
                        .cloned()
                        .unwrap_or_else(|| Value::String(e.to_string())),
                ),
            }
        })?;

    info!(expires_in = tokens.expires_in, "OAuth callback completed");

    Ok(json_response(
        StatusCode::OK,
        json!({
            "success": true,
            "message": "OAuth authentication successful",
            "access_token": tokens.access_token,
            "refresh_token": tokens.refresh_token,
            "expires_in": tokens.expires_in,
            "token_type": tokens.token_type,
        }),
    ))
}
