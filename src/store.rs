//! PostgreSQL access for readings, alerts and recommendations.
//!
//! Plain `sqlx` queries against the tables created by `schema`. The engine
//! never calls into this module; routes fetch bounded windows here and hand
//! them to the engine as arguments.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::{
    Alert, Reading, Recommendation, RecommendationKind, StoredAlert, StoredReading,
    StoredRecommendation,
};

// ---

/// Convert a validated nutrient value into the `INTEGER` column type.
fn nutrient_column(value: u32) -> Result<i32, sqlx::Error> {
    i32::try_from(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

pub async fn insert_reading(pool: &PgPool, reading: &Reading) -> Result<StoredReading, sqlx::Error> {
    // ---
    sqlx::query_as::<_, StoredReading>(
        r#"
        INSERT INTO sensor_data (
            device_id, timestamp, moisture, temperature, humidity,
            nitrogen, phosphorus, potassium
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, device_id, timestamp, moisture, temperature, humidity, nitrogen, phosphorus, potassium
        "#,
    )
    .bind(&reading.device_id)
    .bind(reading.timestamp)
    .bind(reading.moisture)
    .bind(reading.temperature)
    .bind(reading.humidity)
    .bind(nutrient_column(reading.nitrogen)?)
    .bind(nutrient_column(reading.phosphorus)?)
    .bind(nutrient_column(reading.potassium)?)
    .fetch_one(pool)
    .await
}

/// Most recent reading, optionally for a single device.
pub async fn latest_reading(
    pool: &PgPool,
    device_id: Option<&str>,
) -> Result<Option<StoredReading>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, StoredReading>(
        r#"
        SELECT id, device_id, timestamp, moisture, temperature, humidity, nitrogen, phosphorus, potassium
        FROM sensor_data
        WHERE ($1::TEXT IS NULL OR device_id = $1)
        ORDER BY timestamp DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(device_id)
    .fetch_optional(pool)
    .await
}

/// Newest-first listing of readings.
pub async fn list_readings(
    pool: &PgPool,
    device_id: Option<&str>,
    limit: i64,
) -> Result<Vec<StoredReading>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, StoredReading>(
        r#"
        SELECT id, device_id, timestamp, moisture, temperature, humidity, nitrogen, phosphorus, potassium
        FROM sensor_data
        WHERE ($1::TEXT IS NULL OR device_id = $1)
        ORDER BY timestamp DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(device_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Oldest-first readings recorded at or after `since`.
pub async fn readings_since(
    pool: &PgPool,
    since: DateTime<Utc>,
    device_id: Option<&str>,
) -> Result<Vec<StoredReading>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, StoredReading>(
        r#"
        SELECT id, device_id, timestamp, moisture, temperature, humidity, nitrogen, phosphorus, potassium
        FROM sensor_data
        WHERE timestamp >= $1
          AND ($2::TEXT IS NULL OR device_id = $2)
        ORDER BY timestamp ASC, id ASC
        "#,
    )
    .bind(since)
    .bind(device_id)
    .fetch_all(pool)
    .await
}

/// Store a batch of alerts in one transaction.
pub async fn insert_alerts(pool: &PgPool, alerts: &[Alert]) -> Result<Vec<StoredAlert>, sqlx::Error> {
    // ---
    let mut tx = pool.begin().await?;
    let mut stored = Vec::with_capacity(alerts.len());

    for alert in alerts {
        let row = sqlx::query_as::<_, StoredAlert>(
            r#"
            INSERT INTO alerts (type, message, severity, resolved)
            VALUES ($1, $2, $3, $4)
            RETURNING id, timestamp, type, message, severity, resolved
            "#,
        )
        .bind(alert.kind.as_str())
        .bind(&alert.message)
        .bind(alert.severity.as_str())
        .bind(alert.resolved)
        .fetch_one(&mut *tx)
        .await?;
        stored.push(row);
    }

    tx.commit().await?;
    Ok(stored)
}

pub async fn list_alerts(
    pool: &PgPool,
    resolved: bool,
    limit: i64,
) -> Result<Vec<StoredAlert>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, StoredAlert>(
        r#"
        SELECT id, timestamp, type, message, severity, resolved
        FROM alerts
        WHERE resolved = $1
        ORDER BY timestamp DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(resolved)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Mark an alert resolved; `None` if no alert has this id.
pub async fn resolve_alert(pool: &PgPool, id: i32) -> Result<Option<StoredAlert>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, StoredAlert>(
        r#"
        UPDATE alerts SET resolved = TRUE
        WHERE id = $1
        RETURNING id, timestamp, type, message, severity, resolved
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn insert_recommendation(
    pool: &PgPool,
    recommendation: &Recommendation,
) -> Result<StoredRecommendation, sqlx::Error> {
    // ---
    sqlx::query_as::<_, StoredRecommendation>(
        r#"
        INSERT INTO recommendations (timestamp, recommendation_type, data)
        VALUES ($1, $2, $3)
        RETURNING id, timestamp, recommendation_type, data
        "#,
    )
    .bind(recommendation.timestamp)
    .bind(recommendation.kind.as_str())
    .bind(Json(&recommendation.payload))
    .fetch_one(pool)
    .await
}

/// Newest-first recommendation history, optionally of one kind.
pub async fn list_recommendations(
    pool: &PgPool,
    kind: Option<RecommendationKind>,
    limit: i64,
) -> Result<Vec<StoredRecommendation>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, StoredRecommendation>(
        r#"
        SELECT id, timestamp, recommendation_type, data
        FROM recommendations
        WHERE ($1::TEXT IS NULL OR recommendation_type = $1)
        ORDER BY timestamp DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(kind.map(|k| k.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await
}
