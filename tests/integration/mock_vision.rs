//! Mock vision service.
//!
//! Answers from canned JSON text through the same parsers the real client
//! uses, so schema validation is exercised end to end.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use amacar::ai::appraisal::parse_appraisal;
use amacar::ai::damage::parse_damage_report;
use amacar::ai::{AiError, Appraisal, AppraisalRequest, DamageReport, ImageInput, VisionService};
use amacar::types::VehicleCriteria;

pub const DENTED: &str = r#"{"hasDamage": true, "damages":[{"description":"dent on rear bumper","boundingBox":{"x":0.1,"y":0.2,"width":0.3,"height":0.15}}], "color":"Silver"}"#;
pub const CLEAN: &str = r#"{"hasDamage": false, "damages": [], "color": "Silver"}"#;
pub const TRUNCATED: &str = r#"{"hasDamage": true, "damages":[{"descr"#;

pub struct MockVision {
    /// Reply text keyed by the first byte of the photo.
    damage_replies: HashMap<u8, &'static str>,
    appraisal_reply: Mutex<String>,
    pub damage_calls: AtomicUsize,
    pub appraisal_calls: AtomicUsize,
}

impl MockVision {
    pub fn new() -> Self {
        let mut damage_replies = HashMap::new();
        damage_replies.insert(1, DENTED);
        damage_replies.insert(2, CLEAN);
        damage_replies.insert(3, TRUNCATED);
        Self {
            damage_replies,
            appraisal_reply: Mutex::new(
                r#"{"estimatedValue": 16400, "lowValue": 15200, "highValue": 17300, "condition": "Good", "notes": "Typical wear for mileage"}"#
                    .to_string(),
            ),
            damage_calls: AtomicUsize::new(0),
            appraisal_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_appraisal_reply(&self, text: &str) {
        *self.appraisal_reply.lock().unwrap() = text.to_string();
    }

    /// A photo whose reply is selected by `tag`.
    pub fn photo(tag: u8) -> ImageInput {
        ImageInput::new(vec![tag, 0xD8, 0xFF], "image/jpeg").unwrap()
    }
}

#[async_trait]
impl VisionService for MockVision {
    async fn detect_damage(&self, image: &ImageInput) -> Result<DamageReport, AiError> {
        self.damage_calls.fetch_add(1, Ordering::SeqCst);
        let reply = image
            .bytes
            .first()
            .and_then(|tag| self.damage_replies.get(tag))
            .ok_or_else(|| AiError::Api {
                status: 400,
                message: "Unable to process input image".into(),
            })?;
        parse_damage_report(reply)
    }

    async fn generate_vehicle_image(
        &self,
        _vehicle: &VehicleCriteria,
        _color: &str,
    ) -> Result<ImageInput, AiError> {
        ImageInput::new(vec![0x89, 0x50, 0x4E, 0x47], "image/png")
    }

    async fn appraise(&self, _request: &AppraisalRequest) -> Result<Appraisal, AiError> {
        self.appraisal_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.appraisal_reply.lock().unwrap().clone();
        parse_appraisal(&reply)
    }
}
