//! Prometheus metrics exposition
//!
//! - `gateway_requests_total` (counter): labels `route`, `status`
//! - `gateway_request_duration_seconds` (histogram): label `route`
//! - `autofill_jobs_total` (counter): label `outcome`
//! - `autofill_poll_attempts` (histogram): status checks per job
//! - `oauth_token_refresh_total` (counter): label `result`, emitted by canva-auth

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Request latency buckets. Generation requests can wait out the whole poll budget.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 90.0,
];

const ATTEMPT_BUCKETS: &[f64] = &[1.0, 2.0, 3.0, 5.0, 10.0, 15.0, 20.0, 30.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("gateway_request_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full("autofill_poll_attempts".to_string()),
            ATTEMPT_BUCKETS,
        )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Histograms get explicit buckets so they render `_bucket` lines rather
/// than summaries.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed request against its matched route.
pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(duration_secs);
}

/// Record a finished autofill job by outcome (`success`, `failed`, `timeout`, ...).
pub fn record_job(outcome: &str, attempts: u32) {
    metrics::counter!("autofill_jobs_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("autofill_poll_attempts").record(f64::from(attempts));
}
