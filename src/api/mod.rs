use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::ComfortError,
    inference::{ComfortService, DailyScoreResult, ScoreRequest},
};

#[derive(Debug, Serialize, Deserialize)]
pub struct ComfortResponse {
    pub city: String,
    pub results: Vec<DailyScoreResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub trees: usize,
    pub trained_at: DateTime<Utc>,
}

impl ComfortError {
    fn status_code(&self) -> StatusCode {
        match self {
            ComfortError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ComfortError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), "Request failed: {}", self);
        } else {
            tracing::warn!(kind = self.kind(), "Rejected request: {}", self);
        }

        let body = ErrorResponse {
            error: self.kind().to_string(),
            message: self.user_message(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(service: ComfortService) -> Router {
    Router::new()
        .route("/comfort-by-city", post(comfort_by_city))
        .route("/health", get(health))
        .with_state(service)
}

async fn comfort_by_city(
    State(service): State<ComfortService>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> Result<Json<ComfortResponse>, ComfortError> {
    let Json(request) =
        payload.map_err(|rejection| ComfortError::invalid_request(rejection.body_text()))?;

    let results = service.score(&request).await?;
    Ok(Json(ComfortResponse {
        city: request.city.unwrap_or_default().trim().to_string(),
        results,
    }))
}

async fn health(State(service): State<ComfortService>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        trees: service.model().tree_count(),
        trained_at: service.model().trained_at(),
    })
}
