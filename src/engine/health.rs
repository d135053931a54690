//! Rule-based crop health, yield and alert evaluation.
//!
//! Every function here is pure: identical inputs give identical outputs and
//! history windows are passed in by the caller.

use serde::Serialize;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::{Alert, AlertKind, Reading, Severity};

// ---

/// Moisture (%) at which the moisture factor saturates.
const MOISTURE_SATURATION: f64 = 60.0;

/// Optimal growing temperature (°C) and the spread over which the
/// temperature score falls from 1 to 0.
const OPTIMAL_TEMPERATURE: f64 = 25.0;
const TEMPERATURE_SPREAD: f64 = 30.0;

/// Nutrient levels (mg/kg) at which each nutrient factor saturates.
const NITROGEN_SATURATION: f64 = 100.0;
const PHOSPHORUS_SATURATION: f64 = 50.0;
const POTASSIUM_SATURATION: f64 = 150.0;

const MOISTURE_WEIGHT: f64 = 0.4;
const TEMPERATURE_WEIGHT: f64 = 0.3;
const NUTRIENT_WEIGHT: f64 = 0.3;

/// Moisture (%) below which a reading counts as dry.
pub const WATER_STRESS_THRESHOLD: f64 = 30.0;
/// Number of trailing readings inspected for water stress.
pub const WATER_STRESS_WINDOW: usize = 5;
/// Consecutive dry readings needed to flag water stress.
pub const WATER_STRESS_MIN_DRY: usize = 3;

const NITROGEN_LOW: u32 = 30;
const PHOSPHORUS_LOW: u32 = 15;
const POTASSIUM_LOW: u32 = 50;

/// Base yield (kg/ha) used for crops missing from [`BASE_YIELDS`].
pub const DEFAULT_BASE_YIELD: f64 = 3000.0;

/// Base yield per crop in kg/ha.
pub const BASE_YIELDS: [(&str, f64); 4] = [
    ("Wheat", 3000.0),
    ("Rice", 4000.0),
    ("Maize", 5000.0),
    ("Cotton", 800.0),
];

/// Health score with the sub-scores it was blended from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthAssessment {
    // ---
    pub score: f64,
    pub moisture_score: f64,
    /// Not clamped: temperatures more than 30°C from optimal go negative.
    pub temperature_score: f64,
    pub nutrient_score: f64,
}

impl HealthAssessment {
    pub fn evaluate(reading: &Reading) -> Self {
        // ---
        let moisture_score = moisture_factor(reading);
        let temperature_score =
            1.0 - (reading.temperature - OPTIMAL_TEMPERATURE).abs() / TEMPERATURE_SPREAD;
        let nutrient_score = nutrient_factor(reading);

        let blended = MOISTURE_WEIGHT * moisture_score
            + TEMPERATURE_WEIGHT * temperature_score
            + NUTRIENT_WEIGHT * nutrient_score;

        HealthAssessment {
            score: round_to((blended * 100.0).clamp(0.0, 100.0), 2),
            moisture_score,
            temperature_score,
            nutrient_score,
        }
    }
}

/// Composite 0–100 crop health score, rounded to 2 decimals.
pub fn assess_crop_health(reading: &Reading) -> f64 {
    HealthAssessment::evaluate(reading).score
}

/// Base yield for `crop_type`, falling back to [`DEFAULT_BASE_YIELD`].
pub fn base_yield(crop_type: &str) -> f64 {
    // ---
    BASE_YIELDS
        .iter()
        .find(|(name, _)| *name == crop_type)
        .map(|(_, y)| *y)
        .unwrap_or(DEFAULT_BASE_YIELD)
}

/// Expected yield in kg/ha, rounded to 2 decimals.
pub fn predict_yield(reading: &Reading, crop_type: &str) -> f64 {
    // ---
    let predicted = base_yield(crop_type) * moisture_factor(reading) * nutrient_factor(reading);
    round_to(predicted, 2)
}

/// True when the trailing window ends in a run of at least
/// [`WATER_STRESS_MIN_DRY`] dry readings.
///
/// Only the last [`WATER_STRESS_WINDOW`] values count, scanned oldest to
/// newest; any reading at or above the threshold resets the run.
pub fn detect_water_stress(moisture_series: &[f64]) -> AnalyticsResult<bool> {
    // ---
    if moisture_series.is_empty() {
        return Err(AnalyticsError::EmptyHistory);
    }

    let start = moisture_series.len().saturating_sub(WATER_STRESS_WINDOW);
    let consecutive_dry = moisture_series[start..].iter().fold(0usize, |run, m| {
        if *m < WATER_STRESS_THRESHOLD {
            run + 1
        } else {
            0
        }
    });

    Ok(consecutive_dry >= WATER_STRESS_MIN_DRY)
}

/// Alerts for the current reading given its moisture history.
///
/// Returns a fresh, unresolved set on every call; deduplication is left to
/// storage.
pub fn generate_alerts(current: &Reading, historical_moisture: &[f64]) -> AnalyticsResult<Vec<Alert>> {
    // ---
    let mut alerts = Vec::new();

    if detect_water_stress(historical_moisture)? {
        alerts.push(Alert::new(
            AlertKind::WaterStress,
            "Water stress detected - irrigation recommended",
            Severity::High,
        ));
    }

    let deficiencies = [
        (current.nitrogen, NITROGEN_LOW, "Nitrogen level low"),
        (current.phosphorus, PHOSPHORUS_LOW, "Phosphorus level low"),
        (current.potassium, POTASSIUM_LOW, "Potassium level low"),
    ];
    for (level, threshold, message) in deficiencies {
        if level < threshold {
            alerts.push(Alert::new(AlertKind::NutrientDeficiency, message, Severity::Medium));
        }
    }

    Ok(alerts)
}

fn moisture_factor(reading: &Reading) -> f64 {
    (reading.moisture / MOISTURE_SATURATION).min(1.0)
}

fn nutrient_factor(reading: &Reading) -> f64 {
    // ---
    let n = (f64::from(reading.nitrogen) / NITROGEN_SATURATION).min(1.0);
    let p = (f64::from(reading.phosphorus) / PHOSPHORUS_SATURATION).min(1.0);
    let k = (f64::from(reading.potassium) / POTASSIUM_SATURATION).min(1.0);
    (n + p + k) / 3.0
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn reading(moisture: f64, temperature: f64, n: i64, p: i64, k: i64) -> Reading {
        // ---
        Reading::new(
            "device-A",
            Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap(),
            moisture,
            temperature,
            55.0,
            n,
            p,
            k,
        )
        .unwrap()
    }

    #[test]
    fn test_ideal_conditions_score_100() {
        // ---
        assert_eq!(assess_crop_health(&reading(60.0, 25.0, 100, 50, 150)), 100.0);
        assert_eq!(assess_crop_health(&reading(60.0, 25.0, 400, 90, 300)), 100.0);
        // Moisture above saturation does not push past 100.
        assert_eq!(assess_crop_health(&reading(95.0, 25.0, 100, 50, 150)), 100.0);
    }

    #[test]
    fn test_health_blend() {
        // ---
        // moisture 30/60 = 0.5, temp 1 - 5/30, nutrients (0.5 + 0.5 + 0.5)/3
        let score = assess_crop_health(&reading(30.0, 30.0, 50, 25, 75));
        let expected = 100.0 * (0.4 * 0.5 + 0.3 * (1.0 - 5.0 / 30.0) + 0.3 * 0.5);
        assert_relative_eq!(score, round_to(expected, 2), epsilon = 1e-9);
        assert_eq!(score, 60.0);
    }

    #[test]
    fn test_extreme_temperature_keeps_score_in_range() {
        // ---
        let frozen = HealthAssessment::evaluate(&reading(60.0, -200.0, 100, 50, 150));
        assert_eq!(frozen.score, 0.0);
        // The sub-score itself stays unclamped.
        assert_relative_eq!(frozen.temperature_score, 1.0 - 225.0 / 30.0, epsilon = 1e-9);

        let scorched = assess_crop_health(&reading(60.0, 400.0, 100, 50, 150));
        assert_eq!(scorched, 0.0);
    }

    #[test]
    fn test_temperature_score_goes_negative() {
        // ---
        let assessment = HealthAssessment::evaluate(&reading(60.0, 70.0, 100, 50, 150));
        assert_relative_eq!(assessment.temperature_score, -0.5, epsilon = 1e-12);
        assert_eq!(assessment.score, 55.0);
    }

    #[test]
    fn test_predict_yield_saturated_wheat() {
        // ---
        assert_eq!(predict_yield(&reading(60.0, 25.0, 100, 50, 150), "Wheat"), 3000.0);
        assert_eq!(predict_yield(&reading(60.0, 25.0, 100, 50, 150), "Maize"), 5000.0);
    }

    #[test]
    fn test_predict_yield_unknown_crop_uses_default() {
        // ---
        assert_eq!(base_yield("UnknownCrop"), DEFAULT_BASE_YIELD);
        assert_eq!(predict_yield(&reading(60.0, 25.0, 100, 50, 150), "UnknownCrop"), 3000.0);
        // Lookup is case sensitive.
        assert_eq!(base_yield("rice"), DEFAULT_BASE_YIELD);
    }

    #[test]
    fn test_predict_yield_scales_with_factors() {
        // ---
        // moisture 0.5, nutrients (1 + 0.5 + 0)/3 = 0.5
        assert_eq!(predict_yield(&reading(30.0, 25.0, 100, 25, 0), "Rice"), 1000.0);
        assert_eq!(predict_yield(&reading(0.0, 25.0, 100, 50, 150), "Rice"), 0.0);
    }

    #[test]
    fn test_water_stress_examples() {
        // ---
        assert!(!detect_water_stress(&[40.0, 40.0, 40.0, 40.0, 40.0]).unwrap());
        assert!(!detect_water_stress(&[20.0, 20.0, 20.0, 40.0, 40.0]).unwrap());
        assert!(detect_water_stress(&[40.0, 20.0, 20.0, 20.0, 20.0]).unwrap());
    }

    #[test]
    fn test_water_stress_only_last_five_count() {
        // ---
        // Old dry run falls outside the window.
        assert!(!detect_water_stress(&[10.0, 10.0, 10.0, 10.0, 40.0, 40.0, 40.0, 40.0, 40.0]).unwrap());
        // Threshold is strict.
        assert!(!detect_water_stress(&[30.0, 30.0, 30.0]).unwrap());
        assert!(detect_water_stress(&[29.9, 29.9, 29.9]).unwrap());
        assert!(!detect_water_stress(&[10.0, 10.0]).unwrap());
    }

    #[test]
    fn test_water_stress_empty_history() {
        // ---
        assert_eq!(detect_water_stress(&[]), Err(AnalyticsError::EmptyHistory));
    }

    #[test]
    fn test_single_nitrogen_alert() {
        // ---
        let alerts = generate_alerts(&reading(45.0, 25.0, 20, 20, 100), &[45.0, 50.0, 40.0]).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::NutrientDeficiency);
        assert_eq!(alerts[0].message, "Nitrogen level low");
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert!(!alerts[0].resolved);
    }

    #[test]
    fn test_all_alerts_fire_in_order() {
        // ---
        let alerts = generate_alerts(&reading(10.0, 25.0, 0, 0, 0), &[40.0, 10.0, 10.0, 10.0]).unwrap();
        let messages: Vec<&str> = alerts.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Water stress detected - irrigation recommended",
                "Nitrogen level low",
                "Phosphorus level low",
                "Potassium level low"
            ]
        );
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[0].kind, AlertKind::WaterStress);
    }

    #[test]
    fn test_no_alerts_at_thresholds() {
        // ---
        let alerts = generate_alerts(&reading(45.0, 25.0, 30, 15, 50), &[45.0]).unwrap();
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_alerts_need_history() {
        // ---
        assert_eq!(
            generate_alerts(&reading(45.0, 25.0, 20, 20, 100), &[]),
            Err(AnalyticsError::EmptyHistory)
        );
    }

    proptest! {
        #[test]
        fn health_non_decreasing_in_moisture(
            m1 in 0.0f64..=60.0,
            m2 in 0.0f64..=60.0,
            temperature in -10.0f64..50.0,
            n in 0i64..300,
            p in 0i64..200,
            k in 0i64..400,
        ) {
            let (lo, hi) = if m1 <= m2 { (m1, m2) } else { (m2, m1) };
            let low = assess_crop_health(&reading(lo, temperature, n, p, k));
            let high = assess_crop_health(&reading(hi, temperature, n, p, k));
            prop_assert!(low <= high);
        }

        #[test]
        fn evaluators_are_idempotent(
            moisture in 0.0f64..=100.0,
            temperature in -10.0f64..50.0,
            n in 0i64..300,
            p in 0i64..200,
            k in 0i64..400,
            history in prop::collection::vec(0.0f64..100.0, 1..12),
        ) {
            let r = reading(moisture, temperature, n, p, k);
            prop_assert_eq!(assess_crop_health(&r), assess_crop_health(&r));
            prop_assert_eq!(predict_yield(&r, "Cotton"), predict_yield(&r, "Cotton"));
            prop_assert_eq!(detect_water_stress(&history), detect_water_stress(&history));
            prop_assert_eq!(generate_alerts(&r, &history), generate_alerts(&r, &history));
        }

        #[test]
        fn yield_bounded_by_base(
            moisture in 0.0f64..=100.0,
            n in 0i64..300,
            p in 0i64..200,
            k in 0i64..400,
        ) {
            let y = predict_yield(&reading(moisture, 25.0, n, p, k), "Maize");
            prop_assert!((0.0..=5000.0).contains(&y));
        }
    }
}
