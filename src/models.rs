//! Typed records for sensor readings, alerts and recommendations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, AnalyticsResult};

// ---

/// Device id recorded when an ingested payload does not name one.
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Sensor payload as received from a device, before validation.
///
/// Every measurement is optional so that the feature builder can mean-fill
/// gaps in a batch. Nutrients are signed here so that negative values reach
/// validation instead of failing deserialization with an opaque message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    // ---
    pub device_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub moisture: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub nitrogen: Option<i64>,
    pub phosphorus: Option<i64>,
    pub potassium: Option<i64>,
}

/// One validated soil/climate sample. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    // ---
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub moisture: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub nitrogen: u32,
    pub phosphorus: u32,
    pub potassium: u32,
}

/// Persisted reading as stored in `sensor_data`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredReading {
    // ---
    pub id: i32,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub moisture: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub nitrogen: i32,
    pub phosphorus: i32,
    pub potassium: i32,
}

fn require<T>(value: Option<T>, field: &str) -> AnalyticsResult<T> {
    // ---
    value.ok_or_else(|| AnalyticsError::InvalidInput(format!("missing field: {field}")))
}

fn percentage(value: f64, field: &str) -> AnalyticsResult<f64> {
    // ---
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(AnalyticsError::InvalidInput(format!(
            "{field} must be a percentage in [0, 100], got {value}"
        )));
    }
    Ok(value)
}

/// Nutrients are stored in `INTEGER` columns, so the upper bound is `i32::MAX`.
fn nutrient(value: i64, field: &str) -> AnalyticsResult<u32> {
    // ---
    if !(0..=i64::from(i32::MAX)).contains(&value) {
        return Err(AnalyticsError::InvalidInput(format!(
            "{field} must be an integer in [0, {}] (mg/kg), got {value}",
            i32::MAX
        )));
    }
    u32::try_from(value).map_err(|_| {
        AnalyticsError::InvalidInput(format!("{field} out of range, got {value}"))
    })
}

impl RawReading {
    // ---
    /// Validate into a [`Reading`], stamping `now` when no timestamp was sent.
    pub fn validate(&self, now: DateTime<Utc>) -> AnalyticsResult<Reading> {
        // ---
        let temperature = require(self.temperature, "temperature")?;
        if !temperature.is_finite() {
            return Err(AnalyticsError::InvalidInput(format!(
                "temperature must be finite, got {temperature}"
            )));
        }

        Ok(Reading {
            device_id: self
                .device_id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
            timestamp: self.timestamp.unwrap_or(now),
            moisture: percentage(require(self.moisture, "moisture")?, "moisture")?,
            temperature,
            humidity: percentage(require(self.humidity, "humidity")?, "humidity")?,
            nitrogen: nutrient(require(self.nitrogen, "nitrogen")?, "nitrogen")?,
            phosphorus: nutrient(require(self.phosphorus, "phosphorus")?, "phosphorus")?,
            potassium: nutrient(require(self.potassium, "potassium")?, "potassium")?,
        })
    }
}

impl Reading {
    // ---
    /// Build a validated reading from complete measurements.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        moisture: f64,
        temperature: f64,
        humidity: f64,
        nitrogen: i64,
        phosphorus: i64,
        potassium: i64,
    ) -> AnalyticsResult<Self> {
        // ---
        RawReading {
            device_id: Some(device_id.into()),
            timestamp: Some(timestamp),
            moisture: Some(moisture),
            temperature: Some(temperature),
            humidity: Some(humidity),
            nitrogen: Some(nitrogen),
            phosphorus: Some(phosphorus),
            potassium: Some(potassium),
        }
        .validate(timestamp)
    }
}

impl From<&Reading> for RawReading {
    fn from(r: &Reading) -> Self {
        // ---
        RawReading {
            device_id: Some(r.device_id.clone()),
            timestamp: Some(r.timestamp),
            moisture: Some(r.moisture),
            temperature: Some(r.temperature),
            humidity: Some(r.humidity),
            nitrogen: Some(r.nitrogen.into()),
            phosphorus: Some(r.phosphorus.into()),
            potassium: Some(r.potassium.into()),
        }
    }
}

impl TryFrom<StoredReading> for Reading {
    type Error = AnalyticsError;

    fn try_from(row: StoredReading) -> AnalyticsResult<Self> {
        // ---
        Reading::new(
            row.device_id,
            row.timestamp,
            row.moisture,
            row.temperature,
            row.humidity,
            row.nitrogen.into(),
            row.phosphorus.into(),
            row.potassium.into(),
        )
    }
}

// ---

/// Category of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    WaterStress,
    NutrientDeficiency,
}

/// Alert urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = AnalyticsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(AnalyticsError::InvalidInput(format!(
                        "unknown {}: {other}",
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

text_enum!(AlertKind {
    WaterStress => "water_stress",
    NutrientDeficiency => "nutrient_deficiency",
});

text_enum!(Severity {
    Low => "low",
    Medium => "medium",
    High => "high",
});

/// Alert produced by the evaluator. Always unresolved when created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    // ---
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
    pub severity: Severity,
    pub resolved: bool,
}

impl Alert {
    pub fn new(kind: AlertKind, message: impl Into<String>, severity: Severity) -> Self {
        // ---
        Alert {
            kind,
            message: message.into(),
            severity,
            resolved: false,
        }
    }
}

/// Persisted alert row as stored in `alerts`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredAlert {
    // ---
    pub id: i32,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub message: String,
    pub severity: String,
    pub resolved: bool,
}

// ---

/// Which recommender produced a stored recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Crop,
    Fertilizer,
}

text_enum!(RecommendationKind {
    Crop => "crop",
    Fertilizer => "fertilizer",
});

/// One ranked crop candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropSuggestion {
    pub crop: String,
    pub probability: f64,
}

/// Single fertilizer pick with the crop it was requested for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FertilizerSuggestion {
    pub fertilizer: String,
    pub probability: f64,
    pub crop: String,
}

/// Recommendation payload, persisted verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecommendationPayload {
    Crops { recommendations: Vec<CropSuggestion> },
    Fertilizer { recommendation: FertilizerSuggestion },
}

/// A recommendation ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    // ---
    pub kind: RecommendationKind,
    pub payload: RecommendationPayload,
    pub timestamp: DateTime<Utc>,
}

impl Recommendation {
    // ---
    pub fn crops(recommendations: Vec<CropSuggestion>, timestamp: DateTime<Utc>) -> Self {
        Recommendation {
            kind: RecommendationKind::Crop,
            payload: RecommendationPayload::Crops { recommendations },
            timestamp,
        }
    }

    pub fn fertilizer(recommendation: FertilizerSuggestion, timestamp: DateTime<Utc>) -> Self {
        Recommendation {
            kind: RecommendationKind::Fertilizer,
            payload: RecommendationPayload::Fertilizer { recommendation },
            timestamp,
        }
    }
}

/// Persisted recommendation row as stored in `recommendations`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredRecommendation {
    // ---
    pub id: i32,
    pub timestamp: DateTime<Utc>,
    pub recommendation_type: String,
    pub data: serde_json::Value,
}
