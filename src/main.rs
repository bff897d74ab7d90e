//! Invoice Relay - OCR + LLM invoice extraction server.

mod config;
mod decode;
mod error;
mod extractor;
mod generative;
mod google_auth;
mod ocr;
mod schema;
#[cfg(test)]
mod testing;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use config::AppConfig;
use error::AppError;
use extractor::Extractor;
use generative::GeminiClient;
use ocr::VisionProvider;
use schema::InvoiceExtractionRequest;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    extractor: Arc<Extractor>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "invoice_relay=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    // Collaborator clients are built once and shared read-only
    let http = reqwest::Client::new();
    let vision = VisionProvider::new(&config.vision, http.clone())?;
    let gemini = GeminiClient::new(&config.gemini, http);
    info!(
        "Gemini client initialized: model={} temperature={} max_output_tokens={}",
        config.gemini.model, config.gemini.temperature, config.gemini.max_output_tokens
    );

    let extractor = Extractor::new(Arc::new(vision), Arc::new(gemini), config.on_parse_failure);
    info!("Parse failure policy: {:?}", extractor.policy());

    let state = AppState {
        extractor: Arc::new(extractor),
    };
    let app = build_router(state, config.server.max_body_bytes);

    // Run server
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/process-invoice-ai", post(process_invoice))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Decode an invoice image, OCR it and ask the model for structured fields.
async fn process_invoice(
    State(state): State<AppState>,
    payload: Result<Json<InvoiceExtractionRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let image = request
        .image
        .filter(|image| !image.is_empty())
        .ok_or_else(|| AppError::Validation("No image data provided".to_string()))?;

    let image_bytes = decode::decode_image(&image)?;
    info!(
        "Received invoice image: {:?} ({} bytes)",
        request.filename.as_deref().unwrap_or(""),
        image_bytes.len()
    );

    let invoice = state.extractor.extract(&image_bytes).await?;
    Ok(Json(invoice))
}
