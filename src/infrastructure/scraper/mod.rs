pub mod webdriver;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::core::errors::GateError;

/// An image captured from the donation page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QrImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl QrImage {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        QrImage {
            mime: mime.into(),
            bytes,
        }
    }

    /// Wraps raw bytes, guessing the mime type from the file signature.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime = sniff_mime(&bytes).to_string();
        QrImage { mime, bytes }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        QrImage::new("image/png", bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    /// Decodes `data:<mime>;base64,<payload>`.
    pub fn from_data_url(data_url: &str) -> Result<Self, GateError> {
        let rest = data_url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| GateError::InvalidQrPayload("missing data: prefix".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| GateError::InvalidQrPayload("missing payload".to_string()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| GateError::InvalidQrPayload("payload is not base64".to_string()))?;
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| GateError::InvalidQrPayload(e.to_string()))?;
        if bytes.is_empty() {
            return Err(GateError::InvalidQrPayload("empty image".to_string()));
        }
        let mime = if mime.is_empty() { sniff_mime(&bytes) } else { mime };
        Ok(QrImage::new(mime, bytes))
    }
}

pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() > 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else if bytes.starts_with(b"<svg") || bytes.starts_with(b"<?xml") {
        "image/svg+xml"
    } else {
        "image/png"
    }
}

/// Produces the payment QR for an amount and donation message.
#[async_trait]
pub trait QrSource: Send + Sync {
    async fn fetch_qr(&self, amount: i64, message: &str) -> Result<QrImage, GateError>;

    /// Screenshot of the bare profile page.
    async fn profile_snapshot(&self) -> Result<QrImage, GateError>;

    /// Screenshot of the checkout panel after submitting the donation form.
    async fn checkout_snapshot(&self, amount: i64, message: &str) -> Result<QrImage, GateError>;

    /// Screenshot of the donation form once filled, before it is submitted.
    /// `method` overrides the configured payment method when given.
    async fn fill_snapshot(&self, amount: i64, message: &str, method: Option<&str>) -> Result<QrImage, GateError>;
}
