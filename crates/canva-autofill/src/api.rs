//! Canva autofill REST client
//!
//! `POST /autofills` creates a job from a brand template and field data;
//! `GET /autofills/{id}` reports its status. Both use the caller's bearer
//! token and carry a fixed per-request timeout.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Canva Connect REST base.
pub const API_BASE: &str = "https://api.canva.com/rest/v1";

/// An autofill job as reported by Canva.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub error: Option<JobError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobResult {
    #[serde(default)]
    pub design: Option<Design>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Design {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize)]
struct JobEnvelope {
    job: Job,
}

/// One autofill field. Only text fields are produced.
#[derive(Debug, Serialize)]
struct TextField<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Serialize)]
struct CreateJobRequest<'a> {
    brand_template_id: &'a str,
    data: BTreeMap<&'a str, TextField<'a>>,
}

/// Job creation and status lookup.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn AutofillApi>`).
pub trait AutofillApi: Send + Sync {
    fn create_job<'a>(
        &'a self,
        token: &'a str,
        template_id: &'a str,
        fields: &'a BTreeMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<Job>> + Send + 'a>>;

    fn get_job<'a>(
        &'a self,
        token: &'a str,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Job>> + Send + 'a>>;
}

/// reqwest-backed [`AutofillApi`].
#[derive(Clone)]
pub struct AutofillClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl AutofillClient {
    pub fn new(http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            base_url: API_BASE.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn create_job_inner(
        &self,
        token: &str,
        template_id: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<Job> {
        let body = CreateJobRequest {
            brand_template_id: template_id,
            data: fields
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str(),
                        TextField {
                            kind: "text",
                            text: value.as_str(),
                        },
                    )
                })
                .collect(),
        };

        let response = self
            .http
            .post(self.url("/autofills"))
            .bearer_auth(token)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Submission {
                message: format!("autofill request failed: {e}"),
                details: None,
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| Error::Submission {
            message: format!("reading autofill response: {e}"),
            details: None,
        })?;

        if !status.is_success() {
            return Err(Error::Submission {
                message: format!("autofill endpoint returned {status}"),
                details: Some(payload(&text)),
            });
        }

        let envelope: JobEnvelope = serde_json::from_str(&text).map_err(|e| Error::Submission {
            message: format!("invalid autofill response: {e}"),
            details: Some(payload(&text)),
        })?;
        debug!(job_id = %envelope.job.id, status = %envelope.job.status, "autofill job created");
        Ok(envelope.job)
    }

    async fn get_job_inner(&self, token: &str, job_id: &str) -> Result<Job> {
        let response = self
            .http
            .get(self.url(&format!("/autofills/{job_id}")))
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::PollTransport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::PollTransport(format!(
                "status endpoint returned {status}: {body}"
            )));
        }

        response
            .json::<JobEnvelope>()
            .await
            .map(|e| e.job)
            .map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}

impl AutofillApi for AutofillClient {
    fn create_job<'a>(
        &'a self,
        token: &'a str,
        template_id: &'a str,
        fields: &'a BTreeMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<Job>> + Send + 'a>> {
        Box::pin(self.create_job_inner(token, template_id, fields))
    }

    fn get_job<'a>(
        &'a self,
        token: &'a str,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Job>> + Send + 'a>> {
        Box::pin(self.get_job_inner(token, job_id))
    }
}

/// Upstream body as JSON when it parses, raw text otherwise.
fn payload(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AutofillClient {
        AutofillClient::new(reqwest::Client::new(), Duration::from_millis(500))
            .with_base_url(format!("{}/rest/v1", server.uri()))
    }

    fn fields() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("headline".to_string(), "Summer sale".to_string()),
            ("price".to_string(), "$20".to_string()),
        ])
    }

    #[tokio::test]
    async fn create_job_sends_text_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/autofills"))
            .and(header("authorization", "Bearer A1"))
            .and(body_json(serde_json::json!({
                "brand_template_id": "tmpl-1",
                "data": {
                    "headline": {"type": "text", "text": "Summer sale"},
                    "price": {"type": "text", "text": "$20"}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "job": {"id": "job-1", "status": "in_progress"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let job = client_for(&server)
            .create_job("A1", "tmpl-1", &fields())
            .await
            .unwrap();
        assert_eq!(job.id, "job-1");
        assert_eq!(job.status, "in_progress");
    }

    #[tokio::test]
    async fn create_job_rejection_is_submission_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "code": "permission_denied",
                "message": "Missing scope brandtemplate:content:read"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .create_job("A1", "tmpl-1", &fields())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Submission { .. }));
        assert_eq!(err.details().unwrap()["code"], "permission_denied");
    }

    #[tokio::test]
    async fn get_job_parses_design_urls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/autofills/job-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "job": {
                    "id": "job-1",
                    "status": "success",
                    "result": {
                        "type": "create_design",
                        "design": {
                            "id": "DAF123",
                            "title": "Summer sale",
                            "url": "https://www.canva.com/design/DAF123/edit",
                            "thumbnail": {"url": "https://export.canva.com/thumb.png", "width": 595}
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let job = client_for(&server).get_job("A1", "job-1").await.unwrap();
        let design = job.result.unwrap().design.unwrap();
        assert_eq!(
            design.url.as_deref(),
            Some("https://www.canva.com/design/DAF123/edit")
        );
        assert_eq!(design.thumbnail.unwrap().url, "https://export.canva.com/thumb.png");
    }

    #[tokio::test]
    async fn get_job_non_2xx_is_poll_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client_for(&server).get_job("A1", "job-1").await.unwrap_err();
        match err {
            Error::PollTransport(msg) => assert!(msg.contains("502"), "got: {msg}"),
            other => panic!("expected PollTransport, got {other:?}"),
        }
    }
}
