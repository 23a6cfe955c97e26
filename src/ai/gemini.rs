//! Google Gemini integration.
//!
//! Implements `VisionService` against the `generateContent` REST endpoint.
//! Damage and appraisal calls constrain the reply with a `responseSchema`;
//! image generation asks for an inline image part.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::appraisal::{appraisal_schema, parse_appraisal};
use super::damage::{damage_schema, parse_damage_report, DAMAGE_PROMPT};
use super::{AiError, Appraisal, AppraisalRequest, DamageReport, ImageInput, VisionService};
use crate::types::VehicleCriteria;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: Value,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    Inline { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, rename = "usageMetadata")]
    usage: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "inlineData", alias = "inline_data")]
    inline_data: Option<ResponseInline>,
}

#[derive(Debug, Deserialize)]
struct ResponseInline {
    #[serde(rename = "mimeType", alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(default, rename = "totalTokenCount")]
    total_tokens: u32,
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
    }

    fn text(&self) -> Result<String, AiError> {
        let text: String = self.parts().filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() {
            let reason = self
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone())
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(AiError::InvalidResponse(format!("empty response ({reason})")));
        }
        Ok(text)
    }

    fn image(&self) -> Result<ImageInput, AiError> {
        let inline = self
            .parts()
            .find_map(|p| p.inline_data.as_ref())
            .ok_or_else(|| AiError::InvalidResponse("response carried no image".to_string()))?;
        let bytes = BASE64
            .decode(inline.data.as_bytes())
            .map_err(|e| AiError::InvalidResponse(format!("image payload: {e}")))?;
        ImageInput::new(bytes, &inline.mime_type)
            .map_err(|e| AiError::InvalidResponse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    image_model: String,
    backoff_ms: u64,
}

impl GeminiClient {
    pub fn new(
        api_key: SecretString,
        model: Option<String>,
        image_model: Option<String>,
    ) -> Result<Self, AiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AiError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            base_url: GEMINI_API_URL.to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            image_model: image_model.unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            backoff_ms: BASE_BACKOFF_MS,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_backoff(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    fn structured_config(schema: Value) -> Value {
        json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
        })
    }

    /// POST `generateContent`, retrying 429/5xx and transport failures.
    /// A 2xx whose body doesn't parse is returned as-is, never retried.
    async fn call_api(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse, AiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = self.backoff_ms * 2u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(&url)
                .query(&[("key", self.api_key.expose_secret().as_str())])
                .json(request)
                .send()
                .await;

            let err = match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body: GenerateResponse = response
                            .json()
                            .await
                            .map_err(|e| AiError::InvalidResponse(format!("envelope: {e}")))?;
                        if let Some(usage) = &body.usage {
                            debug!(model, tokens = usage.total_tokens, "Gemini call complete");
                        }
                        return Ok(body);
                    }
                    let message = response.text().await.unwrap_or_default();
                    AiError::Api {
                        status: status.as_u16(),
                        message,
                    }
                }
                Err(e) => AiError::Transport(e.without_url().to_string()),
            };

            if !err.is_retryable() {
                return Err(err);
            }
            warn!(model, attempt, error = %err, "Retryable Gemini error");
            last_error = Some(err);
        }

        Err(last_error.unwrap_or_else(|| AiError::Transport("no attempts made".to_string())))
    }
}

#[async_trait]
impl VisionService for GeminiClient {
    async fn detect_damage(&self, image: &ImageInput) -> Result<DamageReport, AiError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Text {
                        text: DAMAGE_PROMPT.to_string(),
                    },
                    RequestPart::Inline {
                        inline_data: InlineData {
                            mime_type: image.mime_type.clone(),
                            data: BASE64.encode(&image.bytes),
                        },
                    },
                ],
            }],
            generation_config: Self::structured_config(damage_schema()),
        };

        let response = self.call_api(&self.model, &request).await?;
        let report = parse_damage_report(&response.text()?)?;
        info!(
            has_damage = report.has_damage,
            regions = report.damages.len(),
            color = %report.color,
            "Damage detection complete"
        );
        Ok(report)
    }

    async fn generate_vehicle_image(
        &self,
        vehicle: &VehicleCriteria,
        color: &str,
    ) -> Result<ImageInput, AiError> {
        let prompt = format!(
            "A clean studio photograph of a {color} {} {} {}, three-quarter front view, \
             neutral background, no people, no text.",
            vehicle.year, vehicle.make, vehicle.model
        );
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart::Text { text: prompt }],
            }],
            generation_config: json!({ "responseModalities": ["TEXT", "IMAGE"] }),
        };

        let response = self.call_api(&self.image_model, &request).await?;
        let image = response.image()?;
        info!(vehicle = %vehicle, color, bytes = image.bytes.len(), "Vehicle image generated");
        Ok(image)
    }

    async fn appraise(&self, request: &AppraisalRequest) -> Result<Appraisal, AiError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart::Text { text: request.prompt() }],
            }],
            generation_config: Self::structured_config(appraisal_schema()),
        };

        let response = self.call_api(&self.model, &body).await?;
        let appraisal = parse_appraisal(&response.text()?)?;
        info!(
            make = %request.make,
            model = %request.model,
            estimate = %appraisal.estimated_value,
            "Appraisal complete"
        );
        Ok(appraisal)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
