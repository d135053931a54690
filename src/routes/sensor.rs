//! Sensor ingestion and reading lookup.
//!
//! `POST /api/sensor/data` validates a reading, stores it, evaluates alerts
//! against the device's recent moisture history and stores those too.

use axum::{
    extract::rejection::JsonRejection, extract::Query, extract::State, http::StatusCode,
    routing::get, Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{clamp_limit, ApiError, AppState};
use crate::engine;
use crate::error::AnalyticsError;
use crate::models::{RawReading, StoredAlert, StoredReading};
use crate::store;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/sensor/data", get(list).post(ingest))
        .route("/api/sensor/data/latest", get(latest))
}

#[derive(Serialize)]
struct IngestResponse {
    message: &'static str,
    data: StoredReading,
    alerts: Vec<StoredAlert>,
}

async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<RawReading>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    // ---
    info!("POST /api/sensor/data");

    let Json(raw) = payload.map_err(|e| AnalyticsError::InvalidInput(e.body_text()))?;
    let reading = raw.validate(Utc::now())?;

    // Step 1: store the reading
    debug!("POST /api/sensor/data - Step 1 (device {})", reading.device_id);
    let stored = store::insert_reading(&state.pool, &reading).await?;

    // Step 2: evaluate alerts over this device's history window
    debug!("POST /api/sensor/data - Step 2");
    let since = Utc::now() - Duration::days(i64::from(state.config.history_days));
    let history = store::readings_since(&state.pool, since, Some(&reading.device_id)).await?;
    let moisture = moisture_series(&history, &stored);
    let alerts = engine::generate_alerts(&reading, &moisture)?;

    // Step 3: store alerts
    debug!("POST /api/sensor/data - Step 3 ({} alerts)", alerts.len());
    let alerts = store::insert_alerts(&state.pool, &alerts).await?;

    info!(
        "Stored reading {} from {} with {} alert(s)",
        stored.id,
        stored.device_id,
        alerts.len()
    );
    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            message: "Data received and processed successfully",
            data: stored,
            alerts,
        }),
    ))
}

/// Moisture history ending with `current`, whatever its timestamp.
///
/// A back-dated reading would otherwise sort into the middle of the window.
fn moisture_series(history: &[StoredReading], current: &StoredReading) -> Vec<f64> {
    // ---
    history
        .iter()
        .filter(|r| r.id != current.id)
        .map(|r| r.moisture)
        .chain(std::iter::once(current.moisture))
        .collect()
}

/// Query parameters for listing readings
#[derive(Debug, Deserialize)]
struct ListQuery {
    device_id: Option<String>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct ListResponse {
    data: Vec<StoredReading>,
    count: usize,
}

async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    // ---
    info!("GET /api/sensor/data: {:?}", params);
    let limit = clamp_limit(params.limit, 100, 1000);
    let data = store::list_readings(&state.pool, params.device_id.as_deref(), limit).await?;

    Ok(Json(ListResponse {
        count: data.len(),
        data,
    }))
}

#[derive(Debug, Deserialize)]
struct LatestQuery {
    device_id: Option<String>,
}

async fn latest(
    State(state): State<AppState>,
    Query(params): Query<LatestQuery>,
) -> Result<Json<StoredReading>, ApiError> {
    // ---
    info!("GET /api/sensor/data/latest: {:?}", params);
    store::latest_reading(&state.pool, params.device_id.as_deref())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NoData("No data found".to_string()))
}
