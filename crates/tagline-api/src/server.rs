use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::info;

use tagline_common::openai::OpenAiClient;

use crate::completion::Completer;
use crate::config::Config;
use crate::error::AppError;
use crate::model::{CopyResponse, GenerateRequest, ReviewRequest, ReviseRequest, ReviseResponse};
use crate::pipeline::CopyPipeline;
use crate::rate_limit::RateLimiter;

const ALLOW_METHODS: &str = "POST, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

pub struct AppState {
    config: Config,
    pipeline: CopyPipeline,
    limiter: Option<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, limiter: Option<RateLimiter>) -> Result<Self, AppError> {
        let client = OpenAiClient::new(config.openai.clone())
            .map_err(|e| AppError::Config(format!("failed to build completion client: {e}")))?;
        let completer = Completer::new(Arc::new(client), config.model.clone());
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("failed to build http client: {e}")))?;
        let pipeline = CopyPipeline::new(completer, http, config.fetch_timeout);
        Ok(Self {
            config,
            pipeline,
            limiter,
        })
    }

    /// Checks every request must pass before any work is done.
    async fn admit(&self) -> Result<(), AppError> {
        if let Some(limiter) = &self.limiter {
            limiter.check().await?;
        }
        if !self.config.has_api_key() {
            return Err(AppError::Config("OPENAI_API_KEY is not set".to_string()));
        }
        Ok(())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/describe", post(describe).options(preflight))
        .route("/api/review", post(review).options(preflight))
        .route("/api/revise", post(revise).options(preflight))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
        ],
    )
}

/// Bodies are parsed by hand so malformed JSON maps to our 400 error shape.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidRequest(format!("invalid JSON body: {e}")))
}

async fn describe(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<CopyResponse>, AppError> {
    state.admit().await?;
    let job = parse_body::<GenerateRequest>(&body)?.validate()?;
    info!(
        name = %job.name,
        url = %job.url,
        tone = ?job.options.tone,
        min = job.options.range.min,
        max = job.options.range.max,
        "generate request"
    );
    Ok(Json(state.pipeline.generate(job).await?))
}

async fn review(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<CopyResponse>, AppError> {
    state.admit().await?;
    let job = parse_body::<ReviewRequest>(&body)?.validate()?;
    info!(chars = job.text.chars().count(), tone = ?job.options.tone, "review request");
    Ok(Json(state.pipeline.review(job).await?))
}

async fn revise(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ReviseResponse>, AppError> {
    state.admit().await?;
    let job = parse_body::<ReviseRequest>(&body)?.validate()?;
    info!(
        chars = job.text.chars().count(),
        notes = job.revision_notes.len(),
        "revise request"
    );
    Ok(Json(state.pipeline.revise(job).await?))
}
