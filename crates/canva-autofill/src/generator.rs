//! One design generation: submit, poll, hand off
//!
//! Upload is auxiliary. When the job succeeds but the hand-off fails the
//! report stays successful, with no upload and a warning.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uploader::{UploadContext, UploadedAsset, Uploader};

use crate::error::Result;
use crate::poller::{JobReport, Poller};

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub template_id: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub template_id: String,
    pub job: JobReport,
    pub upload: Option<UploadedAsset>,
    pub warning: Option<String>,
}

impl GenerationReport {
    pub fn is_success(&self) -> bool {
        self.job.is_success()
    }
}

pub struct Generator {
    poller: Poller,
    uploader: Option<Arc<dyn Uploader>>,
}

impl Generator {
    pub fn new(poller: Poller, uploader: Option<Arc<dyn Uploader>>) -> Self {
        Self { poller, uploader }
    }

    /// Run a full generation with an already-valid access token.
    ///
    /// Only a failed submission is an `Err`; every polling outcome is a report.
    pub async fn generate(&self, token: &str, request: &GenerationRequest) -> Result<GenerationReport> {
        let job_id = self
            .poller
            .submit(token, &request.template_id, &request.fields)
            .await?;
        let job = self.poller.await_completion(token, &job_id).await;

        let mut report = GenerationReport {
            template_id: request.template_id.clone(),
            job,
            upload: None,
            warning: None,
        };

        if !report.is_success() {
            return Ok(report);
        }

        let (Some(uploader), Some(thumbnail)) = (
            self.uploader.as_ref(),
            report
                .job
                .design
                .as_ref()
                .and_then(|d| d.thumbnail_url.clone()),
        ) else {
            return Ok(report);
        };

        let context = UploadContext {
            job_id: job_id.clone(),
            template_id: request.template_id.clone(),
        };
        match uploader.upload(&thumbnail, &context).await {
            Ok(asset) => {
                info!(job_id, uploader = uploader.id(), public_id = %asset.public_id, "thumbnail uploaded");
                report.upload = Some(asset);
            }
            Err(e) => {
                warn!(job_id, uploader = uploader.id(), error = %e, "thumbnail upload failed, design still generated");
                report.warning = Some(format!("design generated but thumbnail upload failed: {e}"));
            }
        }

        Ok(report)
    }
}
