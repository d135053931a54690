//! Dashboard analytics: health score, yield prediction and alert handling.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{clamp_limit, ApiError, AppState};
use crate::engine::{self, HealthAssessment};
use crate::error::AnalyticsError;
use crate::models::{Reading, StoredAlert, StoredReading};
use crate::store;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/analytics/current", get(current))
        .route("/api/analytics/health", get(health_score))
        .route("/api/analytics/yield-prediction", get(yield_prediction))
        .route("/api/analytics/alerts", get(alerts))
        .route("/api/analytics/alerts/{id}/resolve", post(resolve))
}

/// Column-oriented history for dashboard charts, oldest first.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct ChartSeries {
    // ---
    pub timestamps: Vec<DateTime<Utc>>,
    pub moisture: Vec<f64>,
    pub temperature: Vec<f64>,
    pub humidity: Vec<f64>,
    pub nitrogen: Vec<i32>,
    pub phosphorus: Vec<i32>,
    pub potassium: Vec<i32>,
}

impl ChartSeries {
    pub fn from_readings(readings: &[StoredReading]) -> Self {
        // ---
        let mut series = ChartSeries::default();
        for r in readings {
            series.timestamps.push(r.timestamp);
            series.moisture.push(r.moisture);
            series.temperature.push(r.temperature);
            series.humidity.push(r.humidity);
            series.nitrogen.push(r.nitrogen);
            series.phosphorus.push(r.phosphorus);
            series.potassium.push(r.potassium);
        }
        series
    }
}

/// Latest stored reading, both as stored and as a validated [`Reading`].
async fn latest(state: &AppState) -> Result<(StoredReading, Reading), ApiError> {
    // ---
    let stored = store::latest_reading(&state.pool, None)
        .await?
        .ok_or_else(|| ApiError::NoData("No data available".to_string()))?;
    let reading = Reading::try_from(stored.clone())?;
    Ok((stored, reading))
}

/// Readings inside the configured history window.
async fn history(state: &AppState) -> Result<Vec<StoredReading>, ApiError> {
    // ---
    let since = Utc::now() - Duration::days(i64::from(state.config.history_days));
    Ok(store::readings_since(&state.pool, since, None).await?)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentResponse {
    current: StoredReading,
    historical: ChartSeries,
    health_score: f64,
    alerts: Vec<StoredAlert>,
}

async fn current(State(state): State<AppState>) -> Result<Json<CurrentResponse>, ApiError> {
    // ---
    info!("GET /api/analytics/current");
    let (stored, reading) = latest(&state).await?;
    let historical = ChartSeries::from_readings(&history(&state).await?);
    let alerts = store::list_alerts(&state.pool, false, 1000).await?;

    Ok(Json(CurrentResponse {
        current: stored,
        historical,
        health_score: engine::assess_crop_health(&reading),
        alerts,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthScoreResponse {
    health_score: f64,
    components: HealthAssessment,
    timestamp: DateTime<Utc>,
}

async fn health_score(State(state): State<AppState>) -> Result<Json<HealthScoreResponse>, ApiError> {
    // ---
    info!("GET /api/analytics/health");
    let (_, reading) = latest(&state).await?;
    let assessment = HealthAssessment::evaluate(&reading);

    Ok(Json(HealthScoreResponse {
        health_score: assessment.score,
        components: assessment,
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
struct YieldQuery {
    crop: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct YieldResponse {
    predicted_yield: f64,
    crop: String,
    /// `null` when the history window holds no readings.
    water_stress: Option<bool>,
    timestamp: DateTime<Utc>,
}

async fn yield_prediction(
    State(state): State<AppState>,
    Query(params): Query<YieldQuery>,
) -> Result<Json<YieldResponse>, ApiError> {
    // ---
    info!("GET /api/analytics/yield-prediction: {:?}", params);
    let crop = params
        .crop
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.config.default_crop.clone());

    let (_, reading) = latest(&state).await?;
    let moisture: Vec<f64> = history(&state).await?.iter().map(|r| r.moisture).collect();

    let water_stress = match engine::detect_water_stress(&moisture) {
        Ok(stressed) => Some(stressed),
        Err(AnalyticsError::EmptyHistory) => {
            debug!("No readings in history window; water stress unknown");
            None
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(YieldResponse {
        predicted_yield: engine::predict_yield(&reading, &crop),
        crop,
        water_stress,
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    resolved: Option<String>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct AlertsResponse {
    alerts: Vec<StoredAlert>,
    count: usize,
}

async fn alerts(
    State(state): State<AppState>,
    Query(params): Query<AlertsQuery>,
) -> Result<Json<AlertsResponse>, ApiError> {
    // ---
    info!("GET /api/analytics/alerts: {:?}", params);
    let resolved = params
        .resolved
        .as_deref()
        .is_some_and(|r| r.eq_ignore_ascii_case("true"));
    let limit = clamp_limit(params.limit, 50, 1000);
    let alerts = store::list_alerts(&state.pool, resolved, limit).await?;

    Ok(Json(AlertsResponse {
        count: alerts.len(),
        alerts,
    }))
}

#[derive(Serialize)]
struct ResolveResponse {
    message: &'static str,
    alert: StoredAlert,
}

async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ResolveResponse>, ApiError> {
    // ---
    info!("POST /api/analytics/alerts/{}/resolve", id);
    let alert = store::resolve_alert(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Alert {id} not found")))?;

    Ok(Json(ResolveResponse {
        message: "Alert resolved successfully",
        alert,
    }))
}
