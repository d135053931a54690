//! Crop and fertilizer recommendations for the latest reading.
//!
//! Features are built from the latest reading and aligned by name with the
//! columns the loaded artifact was trained on. Raw (unstandardized) values
//! are used: a one-row batch standardizes to all zeros, so scaling is left
//! to the scaler stored in the artifact.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{clamp_limit, ApiError, AppState};
use crate::engine::{CropTagged, FeatureBuilder, Scaling};
use crate::models::{
    CropSuggestion, FertilizerSuggestion, Reading, Recommendation, RecommendationKind,
    StoredRecommendation,
};
use crate::store;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/recommendations/crops", get(crops))
        .route("/api/recommendations/fertilizer", get(fertilizer))
        .route("/api/recommendations/history", get(history))
}

/// Feature vector for one reading in the column order `names` lists.
///
/// `crop_*` columns in `names` are one-hot encoded from `crop`.
pub fn features_for(reading: &Reading, crop: &str, names: &[String]) -> Result<Vec<f64>, ApiError> {
    // ---
    let table = FeatureBuilder::for_feature_names(names).build(&[CropTagged {
        source: reading,
        crop,
    }]);
    Ok(table.aligned_row(0, names, Scaling::Raw)?)
}

async fn latest_reading(state: &AppState) -> Result<Reading, ApiError> {
    // ---
    let stored = store::latest_reading(&state.pool, None)
        .await?
        .ok_or_else(|| ApiError::NoData("No data available".to_string()))?;
    Ok(Reading::try_from(stored)?)
}

/// Persist a recommendation; failure is logged and does not fail the request.
async fn persist(state: &AppState, recommendation: &Recommendation) {
    // ---
    if let Err(e) = store::insert_recommendation(&state.pool, recommendation).await {
        error!(
            "Failed to store {} recommendation: {}",
            recommendation.kind, e
        );
    }
}

#[derive(Serialize)]
struct CropsResponse {
    recommendations: Vec<CropSuggestion>,
    timestamp: DateTime<Utc>,
}

async fn crops(State(state): State<AppState>) -> Result<Json<CropsResponse>, ApiError> {
    // ---
    info!("GET /api/recommendations/crops");
    let reading = latest_reading(&state).await?;

    let recommender = &state.recommenders.crop;
    let names = recommender.expected_features()?;
    let features = features_for(&reading, "", &names)?;
    let recommendations = recommender.recommend_crop(&features)?;

    let timestamp = Utc::now();
    persist(&state, &Recommendation::crops(recommendations.clone(), timestamp)).await;

    info!("Recommended crops: {:?}", recommendations);
    Ok(Json(CropsResponse {
        recommendations,
        timestamp,
    }))
}

#[derive(Debug, Deserialize)]
struct FertilizerQuery {
    crop: Option<String>,
}

#[derive(Serialize)]
struct FertilizerResponse {
    recommendation: FertilizerSuggestion,
    timestamp: DateTime<Utc>,
}

async fn fertilizer(
    State(state): State<AppState>,
    Query(params): Query<FertilizerQuery>,
) -> Result<Json<FertilizerResponse>, ApiError> {
    // ---
    info!("GET /api/recommendations/fertilizer: {:?}", params);
    let crop = params
        .crop
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.config.default_crop.clone());
    let reading = latest_reading(&state).await?;

    let recommender = &state.recommenders.fertilizer;
    let names = recommender.expected_features()?;
    let features = features_for(&reading, &crop, &names)?;
    let recommendation = recommender.recommend_fertilizer(&features, &crop)?;

    let timestamp = Utc::now();
    persist(&state, &Recommendation::fertilizer(recommendation.clone(), timestamp)).await;

    info!("Recommended fertilizer: {:?}", recommendation);
    Ok(Json(FertilizerResponse {
        recommendation,
        timestamp,
    }))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Serialize)]
struct HistoryResponse {
    recommendations: Vec<StoredRecommendation>,
    count: usize,
}

async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    // ---
    info!("GET /api/recommendations/history: {:?}", params);
    let kind = params
        .kind
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(str::parse::<RecommendationKind>)
        .transpose()?;
    let limit = clamp_limit(params.limit, 10, 1000);
    let recommendations = store::list_recommendations(&state.pool, kind, limit).await?;

    Ok(Json(HistoryResponse {
        count: recommendations.len(),
        recommendations,
    }))
}
