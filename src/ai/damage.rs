//! Damage detection response schema.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::AiError;

pub const DAMAGE_PROMPT: &str = "Inspect this vehicle photo. Report whether any exterior \
damage is visible, the vehicle's primary paint color, and for each damaged area a short \
description and a bounding box with x, y, width and height normalized to the image size \
(0.0 to 1.0, origin top-left). Return an empty damages list when the vehicle is undamaged.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageReport {
    pub has_damage: bool,
    pub color: String,
    pub damages: Vec<DamageRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageRecord {
    pub description: String,
    pub bounding_box: BoundingBox,
}

/// Normalized rectangle; every field lies in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    fn validate(&self, index: usize) -> Result<(), AiError> {
        for (name, v) in [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(AiError::InvalidResponse(format!(
                    "damages[{index}].boundingBox.{name} = {v} is outside [0, 1]"
                )));
            }
        }
        Ok(())
    }

    /// Pixel rectangle for an image of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let w = width as f64;
        let h = height as f64;
        (
            (self.x * w).round() as u32,
            (self.y * h).round() as u32,
            (self.width * w).round() as u32,
            (self.height * h).round() as u32,
        )
    }
}

/// Parse and validate the model's JSON text.
pub fn parse_damage_report(text: &str) -> Result<DamageReport, AiError> {
    let report: DamageReport = serde_json::from_str(text.trim())
        .map_err(|e| AiError::InvalidResponse(format!("damage report: {e}")))?;
    for (i, damage) in report.damages.iter().enumerate() {
        damage.bounding_box.validate(i)?;
    }
    Ok(report)
}

/// `responseSchema` sent with every damage request.
pub fn damage_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "hasDamage": { "type": "BOOLEAN" },
            "color": { "type": "STRING" },
            "damages": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "description": { "type": "STRING" },
                        "boundingBox": {
                            "type": "OBJECT",
                            "properties": {
                                "x": { "type": "NUMBER" },
                                "y": { "type": "NUMBER" },
                                "width": { "type": "NUMBER" },
                                "height": { "type": "NUMBER" }
                            },
                            "required": ["x", "y", "width", "height"]
                        }
                    },
                    "required": ["description", "boundingBox"]
                }
            }
        },
        "required": ["hasDamage", "color", "damages"]
    })
}
