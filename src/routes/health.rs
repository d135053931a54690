// src/routes/health.rs
//! Liveness endpoints for the agriflow backend.
//!
//! This module defines the `/health` route used by container orchestrators
//! (e.g., Docker, Kubernetes) and CI pipelines to verify that the service is
//! running, plus the `/` banner. It is a sibling module in the `routes`
//! directory and follows the Explicit Module Boundary Pattern (EMBP):
//! - Internal to this file: endpoint handler(s) and related types
//! - Exports to the gateway (`mod.rs`): a subrouter with both routes
//!
//! Neither route touches the database or the models; crop health scoring
//! lives under `/api/analytics/health`.

use axum::{routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// JSON response body for `/`.
#[derive(Serialize)]
struct BannerResponse {
    message: &'static str,
    status: &'static str,
    timestamp: DateTime<Utc>,
}

/// Handle `GET /health`.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Handle `GET /`.
async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "Smart Agriculture API",
        status: "online",
        timestamp: Utc::now(),
    })
}

/// Create a subrouter containing `/` and `/health`.
///
/// This router is generic over the application state so it can merge cleanly
/// with the gateway router, regardless of the state type.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
}
