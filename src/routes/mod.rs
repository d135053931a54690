//! HTTP gateway: merges every subrouter and owns the shared error response.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, warn};

use crate::engine::Recommenders;
use crate::error::AnalyticsError;
use crate::Config;

mod analytics;
mod health;
mod model_admin;
mod recommendations;
mod sensor;

// ---

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    // ---
    pub pool: PgPool,
    pub config: Config,
    pub recommenders: Arc<Recommenders>,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(sensor::router())
        .merge(analytics::router())
        .merge(recommendations::router())
        .merge(model_admin::router())
        .merge(health::router())
        .with_state(state)
}

/// Failure of a request, rendered as `{"error": code, "message": text}`.
#[derive(Debug)]
pub enum ApiError {
    // ---
    Analytics(AnalyticsError),
    /// Nothing recorded yet for the requested query.
    NoData(String),
    NotFound(String),
    Store(sqlx::Error),
}

impl From<AnalyticsError> for ApiError {
    fn from(e: AnalyticsError) -> Self {
        ApiError::Analytics(e)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Store(e)
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    // ---
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        match self {
            ApiError::Analytics(e) => match e {
                AnalyticsError::InvalidInput(msg) => {
                    json_error(StatusCode::BAD_REQUEST, "invalid_input", msg)
                }
                AnalyticsError::EmptyHistory => {
                    json_error(StatusCode::NOT_FOUND, "no_data", e.to_string())
                }
                AnalyticsError::ModelNotLoaded(ref msg) => {
                    warn!("Model unavailable: {}", msg);
                    json_error(StatusCode::SERVICE_UNAVAILABLE, "model_not_loaded", e.to_string())
                }
                AnalyticsError::FeatureShape { .. } => {
                    error!("Feature/model mismatch: {}", e);
                    json_error(StatusCode::INTERNAL_SERVER_ERROR, "feature_shape", e.to_string())
                }
            },
            ApiError::NoData(msg) => json_error(StatusCode::NOT_FOUND, "no_data", msg),
            ApiError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Store(e) => {
                error!("Database error: {}", e);
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        }
    }
}

/// Clamp a caller-supplied `limit` into `1..=max`.
pub(crate) fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}
