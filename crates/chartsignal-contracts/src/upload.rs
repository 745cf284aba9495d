use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::errors::ChartError;

/// Largest accepted upload, 10 MiB.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const NOT_AN_IMAGE_MESSAGE: &str = "Please upload an image file";
pub const TOO_LARGE_MESSAGE: &str = "File size must be less than 10MB";

/// A file handed over by the picker or a drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl ChartFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    /// Checks the declared media type and size. Nothing is read or sent on failure.
    pub fn validate(&self) -> Result<(), ChartError> {
        if !self.is_image() {
            return Err(ChartError::Validation(NOT_AN_IMAGE_MESSAGE.to_string()));
        }
        if self.size() > MAX_UPLOAD_BYTES {
            return Err(ChartError::Validation(TOO_LARGE_MESSAGE.to_string()));
        }
        Ok(())
    }

    pub fn to_data_url(&self) -> UploadedImage {
        UploadedImage(format!(
            "data:{};base64,{}",
            self.media_type,
            BASE64.encode(&self.bytes)
        ))
    }
}

/// The last accepted upload, encoded as a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage(String);

impl UploadedImage {
    pub fn from_data_url(data_url: impl Into<String>) -> Self {
        Self(data_url.into())
    }

    pub fn data_url(&self) -> &str {
        &self.0
    }

    pub fn media_type(&self) -> Option<&str> {
        self.0
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(';'))
            .map(|(mime, _)| mime)
    }

    /// Short stable id for logs, so image bytes never land in the event log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..8])
    }
}
