//! Hosted vision model integration.
//!
//! Defines the `VisionService` trait (damage detection, vehicle image
//! generation, instant appraisal) and the Gemini implementation.

pub mod appraisal;
pub mod damage;
pub mod gemini;

use async_trait::async_trait;

use crate::types::VehicleCriteria;
pub use appraisal::{Appraisal, AppraisalRequest};
pub use damage::{BoundingBox, DamageRecord, DamageReport};

/// MIME types the model accepts for inline images.
pub const SUPPORTED_IMAGE_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/heic",
    "image/heif",
];

/// Abstraction over the hosted vision model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Locate visible damage in a vehicle photo.
    async fn detect_damage(&self, image: &ImageInput) -> Result<DamageReport, AiError>;

    /// Render a stock image of the described vehicle in the given color.
    async fn generate_vehicle_image(
        &self,
        vehicle: &VehicleCriteria,
        color: &str,
    ) -> Result<ImageInput, AiError>;

    /// Instant valuation from the seller's description.
    async fn appraise(&self, request: &AppraisalRequest) -> Result<Appraisal, AiError>;
}

/// Raw image bytes plus their MIME type.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageInput {
    /// Rejects empty payloads and MIME types the model can't read.
    pub fn new(bytes: Vec<u8>, mime_type: &str) -> Result<Self, AiError> {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        let mime_type = if mime_type == "image/jpg" {
            "image/jpeg".to_string()
        } else {
            mime_type
        };
        if !SUPPORTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
            return Err(AiError::UnsupportedMime(mime_type));
        }
        if bytes.is_empty() {
            return Err(AiError::InvalidRequest("image is empty".to_string()));
        }
        Ok(Self { bytes, mime_type })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("Unsupported image type: {0}")]
    UnsupportedMime(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The model answered, but not with what the schema promised.
    #[error("Invalid AI response: {0}")]
    InvalidResponse(String),

    #[error("AI API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("AI transport error: {0}")]
    Transport(String),
}

impl AiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::Api { status, .. } => *status == 429 || *status >= 500,
            AiError::Transport(_) => true,
            _ => false,
        }
    }
}
