//! HTTP routes and handlers

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use moderator_core::{ModerationRequest, ModerationResponse, Prediction, VerdictResponse};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let max_body_bytes = state.config.server.max_body_bytes;

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/v1/model", get(model_info))
        .route("/moderate", post(moderate))
        .route("/moderate/verdict", post(moderate_verdict))
        .fallback(fallback)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    name: String,
    classes: Vec<String>,
    threshold: f32,
    max_batch_size: usize,
}

async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(ModelInfo {
        name: state.model.name().to_string(),
        classes: state.model.class_names().to_vec(),
        threshold: state.threshold(),
        max_batch_size: state.config.server.max_batch_size,
    })
}

/// Score the submitted text(s) for every toxicity class
async fn moderate(
    State(state): State<AppState>,
    payload: Result<Json<ModerationRequest>, JsonRejection>,
) -> Result<Json<ModerationResponse>, AppError> {
    metrics::counter!("moderator_requests_total").increment(1);
    let Json(request) = payload?;
    let prediction = predict(&state, &request).await?;

    Ok(Json(prediction.into_response()))
}

/// Score the submitted text(s) and report which classes exceed the threshold
async fn moderate_verdict(
    State(state): State<AppState>,
    payload: Result<Json<ModerationRequest>, JsonRejection>,
) -> Result<Json<VerdictResponse>, AppError> {
    metrics::counter!("moderator_requests_total").increment(1);
    let Json(request) = payload?;
    let prediction = predict(&state, &request).await?;

    Ok(Json(VerdictResponse {
        verdicts: prediction.verdicts(state.threshold()),
    }))
}

async fn predict(state: &AppState, request: &ModerationRequest) -> Result<Prediction, AppError> {
    request.validate(state.config.server.max_batch_size)?;

    let start = Instant::now();
    let prediction = state.model.predict(&request.content).await?;
    let elapsed_us = start.elapsed().as_micros() as f64;

    metrics::histogram!("moderator_inference_latency_us").record(elapsed_us);
    metrics::counter!("moderator_inputs_total").increment(request.content.len() as u64);
    debug!(
        "Scored {} texts in {}us",
        request.content.len(),
        elapsed_us
    );

    Ok(prediction)
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Body could not be read or did not match the request schema
    #[error("{message}")]
    InvalidRequest { status: StatusCode, message: String },

    #[error(transparent)]
    Model(#[from] moderator_core::Error),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        // Content-type and size problems keep their own status; schema failures are 422
        let status = match &rejection {
            JsonRejection::MissingJsonContentType(_) | JsonRejection::BytesRejection(_) => {
                rejection.status()
            }
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };

        AppError::InvalidRequest {
            status,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, error_type, message) = match self {
            AppError::InvalidRequest { status, message } => {
                (status, "request", "invalid_request_error", message)
            }
            AppError::Model(moderator_core::Error::Validation(message)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                "invalid_request_error",
                message,
            ),
            AppError::Model(err) => {
                error!("Prediction failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    err.kind(),
                    "model_error",
                    err.to_string(),
                )
            }
        };

        if status.is_client_error() {
            warn!("Rejected request ({}): {}", status, message);
        }
        metrics::counter!("moderator_errors_total", "kind" => kind).increment(1);

        let body = json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        });

        (status, Json(body)).into_response()
    }
}
