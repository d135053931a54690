//! Database schema management for `agriflow`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates `sensor_data` for ingested readings, `alerts` for evaluator
/// output and `recommendations` for persisted model suggestions. Safe to
/// call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Readings, append-only
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_data (
            id           SERIAL PRIMARY KEY,
            device_id    TEXT             NOT NULL,
            timestamp    TIMESTAMPTZ      NOT NULL DEFAULT NOW(),
            moisture     DOUBLE PRECISION NOT NULL,
            temperature  DOUBLE PRECISION NOT NULL,
            humidity     DOUBLE PRECISION NOT NULL,
            nitrogen     INTEGER          NOT NULL,
            phosphorus   INTEGER          NOT NULL,
            potassium    INTEGER          NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Alerts; only `resolved` is ever updated
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id         SERIAL PRIMARY KEY,
            timestamp  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            type       TEXT        NOT NULL,
            message    TEXT        NOT NULL,
            severity   TEXT        NOT NULL,
            resolved   BOOLEAN     NOT NULL DEFAULT FALSE
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recommendations (
            id                   SERIAL PRIMARY KEY,
            timestamp            TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            recommendation_type  TEXT        NOT NULL,
            data                 JSONB       NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Basic indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_data_timestamp
            ON sensor_data (timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_data_device_id
            ON sensor_data (device_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_resolved
            ON alerts (resolved, timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
