use async_trait::async_trait;

use crate::studio::catalog::AspectRatio;
use crate::studio::selection::ImageAsset;

pub const DEFAULT_RESULT_MIME_TYPE: &str = "image/png";

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SynthesisError {
    /// Transport, authentication, quota or malformed-response failures.
    #[error("{0}")]
    Service(String),
    #[error("Synthesis produced no image.")]
    EmptyResult,
}

/// One outbound generation call: references in slot order plus the composed prompt.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub identity: ImageAsset,
    pub outfit: ImageAsset,
    pub product: Option<ImageAsset>,
    pub aspect_ratio: AspectRatio,
    pub prompt: String,
}

impl SynthesisRequest {
    pub fn images(&self) -> impl Iterator<Item = &ImageAsset> {
        [Some(&self.identity), Some(&self.outfit), self.product.as_ref()]
            .into_iter()
            .flatten()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SynthesizedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl SynthesizedImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let mime_type = if mime_type.trim().is_empty() {
            DEFAULT_RESULT_MIME_TYPE.to_string()
        } else {
            mime_type.trim().to_ascii_lowercase()
        };
        Self { bytes, mime_type }
    }

    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

impl std::fmt::Debug for SynthesizedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesizedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    /// Issues exactly one request; implementations never retry.
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedImage, SynthesisError>;
}
