//! AMACAR — vehicle marketplace client core
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores state from disk (or starts fresh), and runs the clock and
//! backend sync loop with graceful shutdown.
//!
//! `amacar inspect <listing.json> [photo ...]` prepares a single listing
//! draft (validation, appraisal, damage detection) and exits.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use amacar::ai::gemini::GeminiClient;
use amacar::ai::{ImageInput, VisionService};
use amacar::backend::rest::RestBackend;
use amacar::clock::ClockService;
use amacar::config;
use amacar::engine::{Engine, ListingAssistant, SyncReport};
use amacar::state::{Action, AppState, StateService};
use amacar::storage;
use amacar::validation::AuctionListingForm;
use amacar::views;

const BANNER: &str = r#"
    _    __  __    _    ____    _    ____
   / \  |  \/  |  / \  / ___|  / \  |  _ \
  / _ \ | |\/| | / _ \| |     / _ \ | |_) |
 / ___ \| |  | |/ ___ \ |___ / ___ \|  _ <
/_/   \_\_|  |_/_/   \_\____/_/   \_\_| \_\

  Vehicle marketplace client core
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;
    init_logging();

    // The AI key is mandatory; refuse to start without it.
    let api_key = cfg.ai_api_key()?;
    if cfg.ai.provider != "gemini" {
        warn!(provider = %cfg.ai.provider, "Unknown AI provider, using Gemini");
    }
    let vision: Arc<dyn VisionService> = Arc::new(GeminiClient::new(
        api_key,
        Some(cfg.ai.model.clone()),
        cfg.ai.image_model.clone(),
    )?);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("inspect") {
        return inspect_listing(vision, &args[1..]).await;
    }

    println!("{BANNER}");
    info!(
        name = %cfg.app.name,
        backend = %cfg.backend.base_url,
        model = %cfg.ai.model,
        sync_interval_secs = cfg.app.sync_interval_secs,
        "AMACAR starting up"
    );

    // -- Restore or create state -----------------------------------------

    let state_file = cfg.app.state_file.as_deref();
    let initial = match storage::load_state(state_file)? {
        Some(s) => {
            info!(
                sessions = s.sessions.len(),
                appointments = s.appointments.len(),
                "Resumed from saved state"
            );
            s
        }
        None => {
            info!("Fresh start");
            AppState::default()
        }
    };

    // -- Initialise components -------------------------------------------

    let (state, state_task) = StateService::spawn(initial);

    let token = cfg.backend_token();
    if token.is_none() {
        warn!("No backend token configured, requests are unauthenticated");
    }
    let backend = RestBackend::new(&cfg.backend.base_url, token, Some(cfg.backend.timeout_secs))?;
    let engine = Engine::new(Arc::new(backend), state.clone());

    let views_task = if cfg.views.enabled {
        Some(views::spawn_views(state.clone(), cfg.expiry_thresholds(), cfg.views.port).await?)
    } else {
        None
    };

    let clock = ClockService::spawn(cfg.tick_interval());
    let mut ticks = clock.subscribe();

    // -- Main loop -------------------------------------------------------

    let mut sync = tokio::time::interval(Duration::from_secs(cfg.app.sync_interval_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        tick_ms = cfg.app.tick_interval_ms,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            tick = ticks.tick() => {
                let Some(now) = tick else {
                    warn!("Clock stopped unexpectedly");
                    break;
                };
                if let Err(e) = state.dispatch(Action::ClockTick(now)).await {
                    error!(error = %e, "Clock tick rejected");
                    break;
                }
            }
            _ = sync.tick() => {
                match engine.sync_all().await {
                    Ok(report) => {
                        log_sync_report(&report);
                        if let Err(e) = storage::save_state(&state.snapshot(), state_file) {
                            error!(error = %e, "Failed to save state");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Sync failed, stopping");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    // -- Shutdown --------------------------------------------------------

    drop(ticks);
    clock.shutdown().await;
    if let Some(task) = views_task {
        task.abort();
    }

    let final_state = state.snapshot();
    storage::save_state(&final_state, state_file)?;
    drop(engine);
    drop(state);
    let _ = state_task.await;

    info!(
        sessions = final_state.sessions.len(),
        auctions = final_state.auctions.len(),
        appointments = final_state.appointments.len(),
        "AMACAR shut down cleanly."
    );

    Ok(())
}

/// Prepare one listing draft and print it.
async fn inspect_listing(vision: Arc<dyn VisionService>, args: &[String]) -> Result<()> {
    let form_path = args
        .first()
        .context("usage: amacar inspect <listing.json> [photo ...]")?;
    let form_json = std::fs::read_to_string(form_path)
        .with_context(|| format!("Failed to read listing form {form_path}"))?;
    let form: AuctionListingForm = serde_json::from_str(&form_json)
        .with_context(|| format!("Failed to parse listing form {form_path}"))?;

    let mut photos = Vec::new();
    for path in &args[1..] {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read photo {path}"))?;
        photos.push(ImageInput::new(bytes, mime_for(path))?);
    }

    let assistant = ListingAssistant::new(vision);
    let mut progress = assistant.progress();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let p = *progress.borrow_and_update();
            if p.total > 0 {
                println!("Uploading photos: {}% ({}/{})", p.percent(), p.done, p.total);
            }
        }
    });

    let draft = assistant.prepare(form, &photos).await?;
    drop(assistant);
    let _ = reporter.await;

    println!(
        "Appraisal: ${} (range ${} - ${}), condition {}",
        draft.appraisal.estimated_value,
        draft.appraisal.low_value,
        draft.appraisal.high_value,
        draft.appraisal.condition
    );
    if draft.reserve_above_market() {
        println!(
            "Reserve ${} is above the appraised range; consider ${}",
            draft.form.reserve_price,
            draft.suggested_reserve()
        );
    }
    for inspection in &draft.inspections {
        match &inspection.result {
            Ok(report) => {
                println!(
                    "Photo {}: {} damage region(s), color {}",
                    inspection.index + 1,
                    report.damages.len(),
                    report.color
                );
                for damage in &report.damages {
                    println!("  - {}", damage.description);
                }
            }
            Err(e) => println!("Photo {}: not inspected ({e})", inspection.index + 1),
        }
    }
    Ok(())
}

/// MIME type from a photo's file extension.
fn mime_for(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => "application/octet-stream",
    }
}

/// Log a one-line sync summary.
fn log_sync_report(report: &SyncReport) {
    if report.is_clean() {
        info!(
            sessions = report.sessions,
            auctions = report.auctions,
            bid_books = report.bid_books,
            "Sync complete"
        );
    } else {
        warn!(
            sessions = report.sessions,
            auctions = report.auctions,
            failures = ?report.failures,
            "Sync complete with failures; showing last good data"
        );
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("amacar=info"));

    let json_logging = std::env::var("AMACAR_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
