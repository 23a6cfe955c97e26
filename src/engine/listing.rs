//! Seller listing assistant.
//!
//! Validates the listing form, asks the vision model for an instant
//! appraisal and runs damage detection over each photo. A photo the model
//! can't read is reported per photo; it does not sink the draft.

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::ai::{AiError, Appraisal, AppraisalRequest, DamageReport, ImageInput, VisionService};
use crate::validation::{AuctionListingForm, ValidationErrors};

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("Listing form is invalid: {0}")]
    Invalid(#[from] ValidationErrors),

    #[error("Appraisal failed: {0}")]
    Appraisal(#[source] AiError),
}

/// Outcome of inspecting one photo.
#[derive(Debug)]
pub struct PhotoInspection {
    pub index: usize,
    pub result: Result<DamageReport, AiError>,
}

#[derive(Debug)]
pub struct ListingDraft {
    pub form: AuctionListingForm,
    pub appraisal: Appraisal,
    pub inspections: Vec<PhotoInspection>,
}

impl ListingDraft {
    /// Total damaged regions across all readable photos.
    pub fn damage_count(&self) -> usize {
        self.inspections
            .iter()
            .filter_map(|i| i.result.as_ref().ok())
            .map(|r| r.damages.len())
            .sum()
    }

    /// Paint color reported by the first readable photo.
    pub fn detected_color(&self) -> Option<&str> {
        self.inspections
            .iter()
            .filter_map(|i| i.result.as_ref().ok())
            .map(|r| r.color.as_str())
            .find(|c| !c.is_empty())
    }

    /// True when the seller's reserve sits above the appraised range.
    pub fn reserve_above_market(&self) -> bool {
        self.form.reserve_price > self.appraisal.high_value
    }

    /// Reserve suggestion: the low end of the appraisal.
    pub fn suggested_reserve(&self) -> Decimal {
        self.appraisal.low_value
    }
}

/// Photos sent to the model so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadProgress {
    pub done: usize,
    pub total: usize,
}

impl UploadProgress {
    /// Whole percent complete; an empty upload counts as finished.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.done.min(self.total) * 100) / self.total) as u8
    }
}

pub struct ListingAssistant {
    vision: Arc<dyn VisionService>,
    progress: watch::Sender<UploadProgress>,
}

impl ListingAssistant {
    pub fn new(vision: Arc<dyn VisionService>) -> Self {
        let (progress, _) = watch::channel(UploadProgress::default());
        Self { vision, progress }
    }

    /// Watch photo upload progress. Reporting never waits on the receiver.
    pub fn progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress.subscribe()
    }

    pub async fn prepare(
        &self,
        form: AuctionListingForm,
        photos: &[ImageInput],
    ) -> Result<ListingDraft, ListingError> {
        form.validate()?;

        let request = AppraisalRequest {
            year: form.year,
            make: form.make.trim().to_string(),
            model: form.model.trim().to_string(),
            trim: None,
            mileage: form.mileage,
            zip_code: form.zip_code.trim().to_string(),
            condition: form.condition.clone(),
        };

        self.progress.send_replace(UploadProgress {
            done: 0,
            total: photos.len(),
        });

        let appraisal_call = self.vision.appraise(&request);
        let inspections_call = futures::future::join_all(photos.iter().map(|photo| async move {
            let result = self.vision.detect_damage(photo).await;
            self.progress.send_modify(|p| p.done += 1);
            debug!(percent = self.progress.borrow().percent(), "Photo processed");
            result
        }));
        let (appraisal, reports) = futures::join!(appraisal_call, inspections_call);
        let appraisal = appraisal.map_err(ListingError::Appraisal)?;

        let inspections: Vec<PhotoInspection> = reports
            .into_iter()
            .enumerate()
            .map(|(index, result)| {
                if let Err(e) = &result {
                    warn!(photo = index, error = %e, "Damage detection failed");
                }
                PhotoInspection { index, result }
            })
            .collect();

        let draft = ListingDraft {
            form,
            appraisal,
            inspections,
        };
        info!(
            vin = %draft.form.vin,
            estimate = %draft.appraisal.estimated_value,
            photos = draft.inspections.len(),
            damages = draft.damage_count(),
            "Listing draft prepared"
        );
        Ok(draft)
    }
}
