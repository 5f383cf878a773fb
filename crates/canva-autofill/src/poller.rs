//! Bounded job polling
//!
//! Submits a job, then checks its status on a fixed interval until it
//! reaches a terminal state or the attempt budget runs out. Attempt N+1
//! never starts before attempt N has an answer.
//!
//! Outcomes per check:
//! - `success` → stop, report design and thumbnail URLs
//! - `in_progress` → keep going while attempts remain
//! - any other status → stop as `failed`
//! - transport error → stop, report the last known status and the error
//! - budget exhausted → `timeout`
//!
//! The interval sleep races a cancellation token so a shutdown can end a
//! poll early; cancelled polls report the last known status.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{AutofillApi, Job};
use crate::error::Result;

/// Interval between status checks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Status checks before giving up (60 s at the default interval).
pub const MAX_ATTEMPTS: u32 = 30;

/// Local view of a job's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    Success,
    Failed,
    Timeout,
}

impl JobStatus {
    /// Map an upstream status string. Anything unrecognised is a failure.
    pub fn from_upstream(status: &str) -> Self {
        match status {
            "in_progress" => JobStatus::InProgress,
            "success" => JobStatus::Success,
            _ => JobStatus::Failed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::InProgress => "in_progress",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
        }
    }
}

/// Links produced by a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesignOutput {
    pub design_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Final state of one polled job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub status: JobStatus,
    pub design: Option<DesignOutput>,
    /// Status checks performed.
    pub attempts: u32,
    pub error: Option<String>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

pub struct Poller {
    api: Arc<dyn AutofillApi>,
    config: PollConfig,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(api: Arc<dyn AutofillApi>, config: PollConfig) -> Self {
        Self {
            api,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop in-flight polls when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Create the job and return its id.
    pub async fn submit(
        &self,
        token: &str,
        template_id: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<String> {
        let job = self.api.create_job(token, template_id, fields).await?;
        info!(job_id = %job.id, template_id, fields = fields.len(), "autofill job submitted");
        Ok(job.id)
    }

    /// Poll `job_id` until it settles or the budget runs out.
    pub async fn await_completion(&self, token: &str, job_id: &str) -> JobReport {
        let mut last = JobStatus::InProgress;

        for attempt in 1..=self.config.max_attempts {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!(job_id, attempts = attempt - 1, "polling cancelled");
                    return report(job_id, last, attempt - 1, Some("polling cancelled".into()));
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            let job = match self.api.get_job(token, job_id).await {
                Ok(job) => job,
                Err(e) => {
                    warn!(job_id, attempt, error = %e, "status check failed, ending poll");
                    return report(job_id, last, attempt, Some(e.to_string()));
                }
            };

            last = JobStatus::from_upstream(&job.status);
            debug!(job_id, attempt, status = %job.status, "job status");

            match last {
                JobStatus::InProgress => continue,
                JobStatus::Success => {
                    info!(job_id, attempts = attempt, "autofill job succeeded");
                    let mut done = report(job_id, last, attempt, None);
                    done.design = Some(design_output(&job));
                    return done;
                }
                _ => {
                    let reason = failure_reason(&job);
                    warn!(job_id, attempts = attempt, reason = %reason, "autofill job failed");
                    return report(job_id, JobStatus::Failed, attempt, Some(reason));
                }
            }
        }

        warn!(
            job_id,
            attempts = self.config.max_attempts,
            "autofill job still in progress, giving up"
        );
        report(
            job_id,
            JobStatus::Timeout,
            self.config.max_attempts,
            Some(format!(
                "job did not complete within {} attempts",
                self.config.max_attempts
            )),
        )
    }
}

fn report(job_id: &str, status: JobStatus, attempts: u32, error: Option<String>) -> JobReport {
    JobReport {
        job_id: job_id.to_string(),
        status,
        design: None,
        attempts,
        error,
    }
}

fn design_output(job: &Job) -> DesignOutput {
    let design = job.result.as_ref().and_then(|r| r.design.as_ref());
    DesignOutput {
        design_url: design.and_then(|d| d.url.clone()),
        thumbnail_url: design.and_then(|d| d.thumbnail.as_ref().map(|t| t.url.clone())),
    }
}

fn failure_reason(job: &Job) -> String {
    match &job.error {
        Some(e) => match (&e.code, &e.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => format!("job ended with status {}", job.status),
        },
        None => format!("job ended with status {}", job.status),
    }
}
