//! Instant appraisal request and response schema.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::AiError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppraisalRequest {
    pub year: u16,
    pub make: String,
    pub model: String,
    #[serde(default)]
    pub trim: Option<String>,
    pub mileage: u32,
    pub zip_code: String,
    /// Seller's own description ("excellent", "fair", ...).
    #[serde(default)]
    pub condition: Option<String>,
}

impl AppraisalRequest {
    pub fn prompt(&self) -> String {
        let mut vehicle = format!("{} {} {}", self.year, self.make, self.model);
        if let Some(trim) = &self.trim {
            vehicle.push(' ');
            vehicle.push_str(trim);
        }
        format!(
            "Estimate the current US trade-in value of a {vehicle} with {mileage} miles \
             located in ZIP {zip}. Seller-reported condition: {condition}. Give a point \
             estimate with a low/high range in US dollars, an overall condition grade and \
             brief notes on what drives the value.",
            mileage = self.mileage,
            zip = self.zip_code,
            condition = self.condition.as_deref().unwrap_or("not stated"),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appraisal {
    pub estimated_value: Decimal,
    pub low_value: Decimal,
    pub high_value: Decimal,
    pub condition: String,
    pub notes: String,
}

/// Parse and sanity-check the model's appraisal.
pub fn parse_appraisal(text: &str) -> Result<Appraisal, AiError> {
    let appraisal: Appraisal = serde_json::from_str(text.trim())
        .map_err(|e| AiError::InvalidResponse(format!("appraisal: {e}")))?;

    if appraisal.low_value < Decimal::ZERO {
        return Err(AiError::InvalidResponse(format!(
            "appraisal lowValue {} is negative",
            appraisal.low_value
        )));
    }
    if appraisal.low_value > appraisal.estimated_value || appraisal.estimated_value > appraisal.high_value {
        return Err(AiError::InvalidResponse(format!(
            "appraisal range {}..{} does not contain estimate {}",
            appraisal.low_value, appraisal.high_value, appraisal.estimated_value
        )));
    }
    Ok(appraisal)
}

pub fn appraisal_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "estimatedValue": { "type": "NUMBER" },
            "lowValue": { "type": "NUMBER" },
            "highValue": { "type": "NUMBER" },
            "condition": { "type": "STRING" },
            "notes": { "type": "STRING" }
        },
        "required": ["estimatedValue", "lowValue", "highValue", "condition", "notes"]
    })
}
