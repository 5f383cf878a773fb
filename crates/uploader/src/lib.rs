//! Image hosting hand-off for finished designs
//!
//! Defines the `Uploader` trait the generation flow calls once a design's
//! thumbnail exists. The flow treats the uploader as an opaque collaborator:
//! `upload(url) -> { secure_url, public_id }`. A failure here never turns a
//! successful generation into a failed one; the caller downgrades it to a
//! warning.

pub mod cloudinary;

pub use cloudinary::{CloudinaryConfig, CloudinaryUploader};

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// Identifies the generation a hosted image belongs to.
#[derive(Debug, Clone)]
pub struct UploadContext {
    pub job_id: String,
    pub template_id: String,
}

/// Where the hosted copy ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedAsset {
    pub secure_url: String,
    pub public_id: String,
}

/// Errors from upload operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("upload request failed: {0}")]
    Http(String),

    #[error("upload rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid upload response: {0}")]
    InvalidResponse(String),
}

/// Result alias for upload operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Hosts a copy of a remote image.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Uploader>`).
pub trait Uploader: Send + Sync {
    /// Identifier for logging (e.g. "cloudinary")
    fn id(&self) -> &str;

    /// Fetch `source_url` into the hosting service.
    fn upload<'a>(
        &'a self,
        source_url: &'a str,
        context: &'a UploadContext,
    ) -> Pin<Box<dyn Future<Output = Result<UploadedAsset>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_carries_status_and_body() {
        let err = Error::Rejected {
            status: 401,
            body: "Invalid Signature".into(),
        };
        assert_eq!(err.to_string(), "upload rejected (401): Invalid Signature");
    }

    #[test]
    fn uploaded_asset_serializes() {
        let asset = UploadedAsset {
            secure_url: "https://res.cloudinary.com/demo/image/upload/x.png".into(),
            public_id: "canva/job-1".into(),
        };
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["public_id"], "canva/job-1");
    }
}
