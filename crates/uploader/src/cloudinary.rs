//! Cloudinary remote-URL uploads
//!
//! Cloudinary fetches the image itself when `file` is a URL, so the gateway
//! never downloads the thumbnail. Requests are signed: the non-file
//! parameters are sorted, joined as `k=v&k=v`, suffixed with the API secret,
//! and hashed with SHA-256.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::Secret;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{Error, Result, UploadContext, UploadedAsset, Uploader};

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: Secret<String>,
    /// Folder uploads land in; public ids are `{folder}/{job_id}`.
    pub folder: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl CloudinaryConfig {
    pub fn new(cloud_name: String, api_key: String, api_secret: Secret<String>) -> Self {
        Self {
            cloud_name,
            api_key,
            api_secret,
            folder: "canva".to_string(),
            api_base: API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/{}/image/upload",
            self.api_base.trim_end_matches('/'),
            self.cloud_name
        )
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

pub struct CloudinaryUploader {
    http: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryUploader {
    pub fn new(http: reqwest::Client, config: CloudinaryConfig) -> Self {
        Self { http, config }
    }

    async fn upload_inner(&self, source_url: &str, context: &UploadContext) -> Result<UploadedAsset> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string();
        let public_id = context.job_id.clone();

        let mut signed = vec![
            ("folder", self.config.folder.clone()),
            ("public_id", public_id),
            ("timestamp", timestamp),
        ];
        let signature = sign(&signed, self.config.api_secret.expose());

        signed.push(("file", source_url.to_string()));
        signed.push(("api_key", self.config.api_key.clone()));
        signed.push(("signature", signature));
        signed.push(("signature_algorithm", "sha256".to_string()));

        debug!(job_id = %context.job_id, template_id = %context.template_id, "uploading thumbnail");

        let response = self
            .http
            .post(self.config.upload_url())
            .timeout(self.config.timeout)
            .form(&signed)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            warn!(status = status.as_u16(), "cloudinary rejected upload");
            return Err(Error::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = response
            .json::<UploadResponse>()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        Ok(UploadedAsset {
            secure_url: parsed.secure_url,
            public_id: parsed.public_id,
        })
    }
}

impl Uploader for CloudinaryUploader {
    fn id(&self) -> &str {
        "cloudinary"
    }

    fn upload<'a>(
        &'a self,
        source_url: &'a str,
        context: &'a UploadContext,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<UploadedAsset>> + Send + 'a>>
    {
        Box::pin(self.upload_inner(source_url, context))
    }
}

/// Hex SHA-256 over `k=v` pairs sorted by key, joined with `&`, plus the secret.
fn sign(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let digest = Sha256::digest(format!("{joined}{secret}").as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
