//! Seller listing preparation against the mock vision service.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use amacar::ai::{AiError, VisionService};
use amacar::engine::listing::{ListingAssistant, ListingError};
use amacar::validation::AuctionListingForm;
use rust_decimal_macros::dec;

use crate::mock_backend::criteria;
use crate::mock_vision::MockVision;

fn form() -> AuctionListingForm {
    AuctionListingForm {
        vin: "2T1BURHE5KC123456".into(),
        year: 2019,
        make: "Toyota".into(),
        model: "Corolla".into(),
        mileage: 61000,
        zip_code: "98101".into(),
        reserve_price: dec!(15000),
        condition: Some("Good".into()),
    }
}

#[tokio::test]
async fn test_draft_keeps_readable_photos() {
    let vision = Arc::new(MockVision::new());
    let assistant = ListingAssistant::new(vision.clone());

    let photos = [MockVision::photo(1), MockVision::photo(2), MockVision::photo(3)];
    let draft = assistant.prepare(form(), &photos).await.unwrap();

    assert_eq!(vision.damage_calls.load(Ordering::SeqCst), 3);
    assert_eq!(vision.appraisal_calls.load(Ordering::SeqCst), 1);
    assert_eq!(draft.appraisal.estimated_value, dec!(16400));
    assert_eq!(draft.damage_count(), 1);
    assert_eq!(draft.detected_color(), Some("Silver"));

    let dent = draft.inspections[0].result.as_ref().unwrap();
    assert_eq!(dent.damages[0].description, "dent on rear bumper");
    assert!(draft.inspections[1].result.as_ref().unwrap().damages.is_empty());
    assert!(matches!(draft.inspections[2].result, Err(AiError::InvalidResponse(_))));

    assert!(!draft.reserve_above_market());
}

#[tokio::test]
async fn test_unreadable_photo_is_reported_not_fatal() {
    let vision = Arc::new(MockVision::new());
    let assistant = ListingAssistant::new(vision);

    let draft = assistant
        .prepare(form(), &[MockVision::photo(9), MockVision::photo(2)])
        .await
        .unwrap();
    assert!(matches!(draft.inspections[0].result, Err(AiError::Api { status: 400, .. })));
    assert_eq!(draft.inspections[1].index, 1);
    assert_eq!(draft.damage_count(), 0);
}

#[tokio::test]
async fn test_invalid_form_skips_model_calls() {
    let vision = Arc::new(MockVision::new());
    let assistant = ListingAssistant::new(vision.clone());

    let mut bad = form();
    bad.vin = "2T1BURHE5KC12345O".into();
    bad.zip_code = "981".into();

    match assistant.prepare(bad, &[MockVision::photo(1)]).await {
        Err(ListingError::Invalid(errors)) => {
            assert!(errors.contains("vin"));
            assert!(errors.contains("zip_code"));
        }
        other => panic!("expected validation errors, got {other:?}"),
    }
    assert_eq!(vision.appraisal_calls.load(Ordering::SeqCst), 0);
    assert_eq!(vision.damage_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_inconsistent_appraisal_fails_draft() {
    let vision = Arc::new(MockVision::new());
    vision.set_appraisal_reply(
        r#"{"estimatedValue": 18000, "lowValue": 19000, "highValue": 17000, "condition": "Good"}"#,
    );
    let assistant = ListingAssistant::new(vision);

    let err = assistant.prepare(form(), &[]).await.unwrap_err();
    assert!(matches!(err, ListingError::Appraisal(AiError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_high_reserve_gets_suggestion() {
    let vision = Arc::new(MockVision::new());
    let assistant = ListingAssistant::new(vision);

    let mut high = form();
    high.reserve_price = dec!(18500);
    let draft = assistant.prepare(high, &[]).await.unwrap();

    assert!(draft.reserve_above_market());
    assert_eq!(draft.suggested_reserve(), dec!(15200));
    assert!(draft.inspections.is_empty());
}

#[tokio::test]
async fn test_generated_image_is_usable_input() {
    let vision: Arc<dyn VisionService> = Arc::new(MockVision::new());
    let image = vision
        .generate_vehicle_image(&criteria("Toyota", "Corolla", dec!(21000)), "Silver")
        .await
        .unwrap();
    assert_eq!(image.mime_type, "image/png");
    assert!(!image.bytes.is_empty());
}
