//! POST /api/generate (alias /api/generate-design)
//!
//! Accepts `{templateId, fieldData}` or `{brandTemplateId, data}`, gets a
//! valid access token, and runs one generation to completion.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::Response;
use canva_autofill::{GenerationReport, GenerationRequest, JobStatus};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::oauth::AUTH_START_PATH;
use crate::{AppState, json_response};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    #[serde(default, alias = "brandTemplateId")]
    template_id: Option<String>,
    #[serde(default, alias = "data")]
    field_data: Option<BTreeMap<String, Value>>,
}

impl GenerateBody {
    fn into_request(self) -> Result<GenerationRequest, ApiError> {
        let template_id = self
            .template_id
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("Missing required field: templateId"))?;
        let field_data = self
            .field_data
            .ok_or_else(|| ApiError::bad_request("Missing required field: fieldData"))?;

        let fields = field_data
            .into_iter()
            .map(|(name, value)| (name, field_text(value)))
            .collect();

        Ok(GenerationRequest {
            template_id,
            fields,
        })
    }
}

/// Text fields only: strings pass through, other JSON values are rendered.
fn field_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest {
        error: "Invalid request body".into(),
        details: Some(Value::String(e.body_text())),
    })?;
    let request = body.into_request()?;

    let token = state.tokens.get_valid().await.map_err(|e| {
        if e.requires_authorization() {
            ApiError::Unauthorized {
                error: "Authentication required".into(),
                details: Some(Value::String(e.to_string())),
                auth_url: AUTH_START_PATH.to_string(),
            }
        } else {
            ApiError::Internal {
                error: "Failed to load access token".into(),
                details: Some(Value::String(e.to_string())),
            }
        }
    })?;

    let report = state
        .generator
        .generate(&token, &request)
        .await
        .map_err(|e| {
            warn!(template_id = %request.template_id, error = %e, "autofill submission failed");
            crate::metrics::record_job("submission_failed", 0);
            ApiError::BadGateway {
                error: "Failed to create autofill job".into(),
                details: Some(
                    e.details()
                        .cloned()
                        .unwrap_or_else(|| Value::String(e.to_string())),
                ),
            }
        })?;

    crate::metrics::record_job(report.job.status.label(), report.job.attempts);
    info!(
        job_id = %report.job.job_id,
        status = report.job.status.label(),
        attempts = report.job.attempts,
        "generation finished"
    );

    let (status, body) = render(&report);
    Ok(json_response(status, body))
}

fn render(report: &GenerationReport) -> (StatusCode, Value) {
    let job = &report.job;
    let timestamp = chrono::Utc::now().to_rfc3339();

    if job.is_success() {
        let design = job.design.as_ref();
        let mut body = json!({
            "success": true,
            "jobId": job.job_id,
            "status": job.status.label(),
            "designUrl": design.and_then(|d| d.design_url.clone()),
            "thumbnailUrl": design.and_then(|d| d.thumbnail_url.clone()),
            "securizedUrl": report.upload.as_ref().map(|u| u.secure_url.clone()),
            "uploadId": report.upload.as_ref().map(|u| u.public_id.clone()),
            "templateId": report.template_id,
            "attempts": job.attempts,
            "timestamp": timestamp,
        });
        if let Some(ref warning) = report.warning {
            body["warning"] = Value::String(warning.clone());
        }
        return (StatusCode::OK, body);
    }

    let status = match job.status {
        JobStatus::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        json!({
            "success": false,
            "jobId": job.job_id,
            "status": job.status.label(),
            "error": job.error,
            "attempts": job.attempts,
            "templateId": report.template_id,
            "timestamp": timestamp,
        }),
    )
}
