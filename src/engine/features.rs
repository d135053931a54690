//! Feature builder: turns readings into the numeric table consumed by the
//! classifiers.
//!
//! Per batch:
//! 1. Missing measurements are filled with the column mean over the batch
//!    (0.0 when the whole column is missing or the batch is empty).
//! 2. `n_p_ratio`, `n_k_ratio` and `p_k_ratio` are derived from the filled
//!    values. A zero denominator yields 0.0 instead of inf/NaN.
//! 3. The nine numeric columns are standardized with a scaler fit on the
//!    same batch. Optional crop one-hot columns are appended unscaled.

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::{RawReading, Reading};

// ---

/// Measured columns, in table order.
pub const MEASUREMENT_COLUMNS: [&str; 6] = [
    "moisture",
    "temperature",
    "humidity",
    "nitrogen",
    "phosphorus",
    "potassium",
];

/// Derived nutrient ratio columns, in table order.
pub const RATIO_COLUMNS: [&str; 3] = ["n_p_ratio", "n_k_ratio", "p_k_ratio"];

/// Prefix of crop one-hot column names (`crop_Wheat`, `crop_Rice`, ...).
pub const CROP_COLUMN_PREFIX: &str = "crop_";

const NUMERIC_WIDTH: usize = MEASUREMENT_COLUMNS.len() + RATIO_COLUMNS.len();

/// Anything the builder can pull measurements from.
pub trait FeatureSource {
    /// Measurements in [`MEASUREMENT_COLUMNS`] order; `None` marks a gap.
    fn measurements(&self) -> [Option<f64>; 6];

    /// Crop this row should be one-hot encoded as, if any.
    fn crop(&self) -> Option<&str> {
        None
    }
}

impl FeatureSource for RawReading {
    fn measurements(&self) -> [Option<f64>; 6] {
        // ---
        [
            self.moisture,
            self.temperature,
            self.humidity,
            self.nitrogen.map(|v| v as f64),
            self.phosphorus.map(|v| v as f64),
            self.potassium.map(|v| v as f64),
        ]
    }
}

impl FeatureSource for Reading {
    fn measurements(&self) -> [Option<f64>; 6] {
        // ---
        [
            Some(self.moisture),
            Some(self.temperature),
            Some(self.humidity),
            Some(f64::from(self.nitrogen)),
            Some(f64::from(self.phosphorus)),
            Some(f64::from(self.potassium)),
        ]
    }
}

/// A row paired with the crop it is being evaluated for.
#[derive(Debug, Clone, Copy)]
pub struct CropTagged<'a, R> {
    pub source: &'a R,
    pub crop: &'a str,
}

impl<R: FeatureSource> FeatureSource for CropTagged<'_, R> {
    fn measurements(&self) -> [Option<f64>; 6] {
        self.source.measurements()
    }

    fn crop(&self) -> Option<&str> {
        Some(self.crop)
    }
}

// ---

/// Mean/scale pair fit per column (population standard deviation).
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    // ---
    /// Fit on `rows`, each of which must be `width` wide.
    ///
    /// Zero-variance columns get a scale of 1.0 so they transform to 0.0.
    pub fn fit(rows: &[Vec<f64>], width: usize) -> Self {
        // ---
        let n = rows.len() as f64;
        let mut mean = vec![0.0; width];
        let mut scale = vec![1.0; width];

        if rows.is_empty() {
            return StandardScaler { mean, scale };
        }

        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        for (col, s) in scale.iter_mut().enumerate() {
            let variance = rows
                .iter()
                .map(|row| (row[col] - mean[col]).powi(2))
                .sum::<f64>()
                / n;
            let std = variance.sqrt();
            *s = if std.is_finite() && std > f64::EPSILON { std } else { 1.0 };
        }

        StandardScaler { mean, scale }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        // ---
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}

/// Which matrix of a [`FeatureTable`] to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scaling {
    Raw,
    Standardized,
}

/// Output of [`FeatureBuilder::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    // ---
    /// Column names, in the order used by every row of `raw` and `scaled`.
    pub column_names: Vec<String>,

    /// Filled, ratio-extended values before standardization.
    pub raw: Vec<Vec<f64>>,

    /// Standardized numeric columns followed by unscaled one-hot columns.
    pub scaled: Vec<Vec<f64>>,

    /// Scaler fit on this batch's numeric columns.
    pub scaler: StandardScaler,
}

impl FeatureTable {
    // ---
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Select one row's values by column name, in the order of `names`.
    ///
    /// Used to align a row with the feature order a model artifact was
    /// trained on. Unknown names fail with `FeatureShape`.
    pub fn aligned_row(
        &self,
        row: usize,
        names: &[String],
        scaling: Scaling,
    ) -> AnalyticsResult<Vec<f64>> {
        // ---
        let matrix = match scaling {
            Scaling::Raw => &self.raw,
            Scaling::Standardized => &self.scaled,
        };
        let values = matrix.get(row).ok_or_else(|| {
            AnalyticsError::InvalidInput(format!(
                "feature row {row} out of range ({} rows)",
                matrix.len()
            ))
        })?;

        let picked: Vec<f64> = names
            .iter()
            .filter_map(|name| {
                self.column_names
                    .iter()
                    .position(|c| c == name)
                    .map(|idx| values[idx])
            })
            .collect();

        if picked.len() != names.len() {
            return Err(AnalyticsError::FeatureShape {
                expected: names.len(),
                actual: picked.len(),
            });
        }
        Ok(picked)
    }
}

/// Builds feature tables, optionally with crop one-hot columns.
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    crop_columns: Vec<String>,
}

impl FeatureBuilder {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one `crop_<name>` column per crop, in the given order.
    pub fn with_crop_columns<I, S>(mut self, crops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.crop_columns = crops.into_iter().map(Into::into).collect();
        self
    }

    /// Crop one-hot columns this builder emits, derived from a model's
    /// feature names (`crop_Wheat` → `Wheat`).
    pub fn for_feature_names(names: &[String]) -> Self {
        // ---
        Self::new().with_crop_columns(
            names
                .iter()
                .filter_map(|n| n.strip_prefix(CROP_COLUMN_PREFIX))
                .map(str::to_string),
        )
    }

    pub fn column_names(&self) -> Vec<String> {
        // ---
        MEASUREMENT_COLUMNS
            .iter()
            .chain(RATIO_COLUMNS.iter())
            .map(|c| c.to_string())
            .chain(
                self.crop_columns
                    .iter()
                    .map(|crop| format!("{CROP_COLUMN_PREFIX}{crop}")),
            )
            .collect()
    }

    pub fn build<R: FeatureSource>(&self, rows: &[R]) -> FeatureTable {
        // ---
        let measured: Vec<[Option<f64>; 6]> = rows.iter().map(|r| r.measurements()).collect();
        let fill = column_means(&measured);

        let numeric: Vec<Vec<f64>> = measured
            .iter()
            .map(|m| {
                let filled: Vec<f64> = m
                    .iter()
                    .zip(&fill)
                    .map(|(v, f)| v.filter(|x| x.is_finite()).unwrap_or(*f))
                    .collect();
                let (n, p, k) = (filled[3], filled[4], filled[5]);
                let mut row = filled;
                row.extend([ratio(n, p), ratio(n, k), ratio(p, k)]);
                row
            })
            .collect();

        let scaler = StandardScaler::fit(&numeric, NUMERIC_WIDTH);

        let one_hot: Vec<Vec<f64>> = rows
            .iter()
            .map(|r| {
                self.crop_columns
                    .iter()
                    .map(|c| if r.crop() == Some(c.as_str()) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect();

        let raw: Vec<Vec<f64>> = numeric
            .iter()
            .zip(&one_hot)
            .map(|(n, h)| n.iter().chain(h).copied().collect())
            .collect();
        let scaled: Vec<Vec<f64>> = numeric
            .iter()
            .zip(&one_hot)
            .map(|(n, h)| {
                let mut row = scaler.transform_row(n);
                row.extend(h);
                row
            })
            .collect();

        tracing::debug!(
            rows = rows.len(),
            crop_columns = self.crop_columns.len(),
            "built feature table"
        );

        FeatureTable {
            column_names: self.column_names(),
            raw,
            scaled,
            scaler,
        }
    }
}

/// Build the default (no one-hot) feature table for a batch.
pub fn build_features<R: FeatureSource>(readings: &[R]) -> FeatureTable {
    FeatureBuilder::new().build(readings)
}

fn column_means(measured: &[[Option<f64>; 6]]) -> [f64; 6] {
    // ---
    let mut means = [0.0; 6];
    for (col, mean) in means.iter_mut().enumerate() {
        let present: Vec<f64> = measured
            .iter()
            .filter_map(|m| m[col])
            .filter(|v| v.is_finite())
            .collect();
        if !present.is_empty() {
            *mean = present.iter().sum::<f64>() / present.len() as f64;
        }
    }
    means
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    // ---
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use approx::assert_relative_eq;

    fn raw(n: Option<i64>, p: Option<i64>, k: Option<i64>, moisture: Option<f64>) -> RawReading {
        // ---
        RawReading {
            moisture,
            temperature: Some(25.0),
            humidity: Some(50.0),
            nitrogen: n,
            phosphorus: p,
            potassium: k,
            ..RawReading::default()
        }
    }

    #[test]
    fn test_column_order() {
        // ---
        let table = build_features(&[raw(Some(10), Some(5), Some(20), Some(40.0))]);
        assert_eq!(
            table.column_names,
            vec![
                "moisture",
                "temperature",
                "humidity",
                "nitrogen",
                "phosphorus",
                "potassium",
                "n_p_ratio",
                "n_k_ratio",
                "p_k_ratio"
            ]
        );
        assert_eq!(table.raw[0], vec![40.0, 25.0, 50.0, 10.0, 5.0, 20.0, 2.0, 0.5, 0.25]);
    }

    #[test]
    fn test_zero_denominator_yields_zero() {
        // ---
        let table = build_features(&[raw(Some(10), Some(0), Some(0), Some(40.0))]);
        let row = &table.raw[0];
        assert_eq!(row[6], 0.0);
        assert_eq!(row[7], 0.0);
        assert_eq!(row[8], 0.0);
        assert!(table.scaled[0].iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_missing_values_use_batch_mean() {
        // ---
        let table = build_features(&[
            raw(Some(10), Some(5), Some(20), Some(20.0)),
            raw(Some(30), Some(5), Some(20), None),
            raw(None, Some(5), Some(20), Some(40.0)),
        ]);
        assert_eq!(table.raw[1][0], 30.0);
        assert_eq!(table.raw[2][3], 20.0);
        // Ratio uses the filled nitrogen.
        assert_eq!(table.raw[2][6], 4.0);
    }

    #[test]
    fn test_entirely_missing_column_falls_back_to_zero() {
        // ---
        let table = build_features(&[raw(None, Some(5), Some(20), None), raw(None, Some(5), Some(20), None)]);
        assert_eq!(table.raw[0][0], 0.0);
        assert_eq!(table.raw[1][3], 0.0);
        assert_eq!(table.raw[0][6], 0.0);
    }

    #[test]
    fn test_empty_batch() {
        // ---
        let table = build_features::<RawReading>(&[]);
        assert!(table.is_empty());
        assert_eq!(table.column_names.len(), 9);
        assert_eq!(table.scaler.scale, vec![1.0; 9]);
    }

    #[test]
    fn test_standardized_columns_have_zero_mean_unit_variance() {
        // ---
        let rows: Vec<RawReading> = (0..5)
            .map(|i| raw(Some(10 + i * 7), Some(5 + i), Some(20 + i * 3), Some(10.0 * i as f64)))
            .collect();
        let table = build_features(&rows);

        for col in 0..9 {
            let values: Vec<f64> = table.scaled.iter().map(|r| r[col]).collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            assert_relative_eq!(mean, 0.0, epsilon = 1e-9);
        }
        // Moisture varies, so its standardized variance is 1.
        let moisture: Vec<f64> = table.scaled.iter().map(|r| r[0]).collect();
        let var = moisture.iter().map(|v| v * v).sum::<f64>() / moisture.len() as f64;
        assert_relative_eq!(var, 1.0, epsilon = 1e-9);
        // Temperature is constant, so it standardizes to zero.
        assert!(table.scaled.iter().all(|r| r[1] == 0.0));
    }

    #[test]
    fn test_crop_one_hot_columns_are_not_scaled() {
        // ---
        let a = raw(Some(10), Some(5), Some(20), Some(40.0));
        let b = raw(Some(50), Some(25), Some(60), Some(20.0));
        let builder = FeatureBuilder::new().with_crop_columns(["Wheat", "Rice"]);
        let table = builder.build(&[
            CropTagged { source: &a, crop: "Rice" },
            CropTagged { source: &b, crop: "Maize" },
        ]);

        assert_eq!(table.column_names[9], "crop_Wheat");
        assert_eq!(table.column_names[10], "crop_Rice");
        assert_eq!(&table.scaled[0][9..], &[0.0, 1.0]);
        assert_eq!(&table.scaled[1][9..], &[0.0, 0.0]);
        assert_eq!(table.scaler.mean.len(), 9);
    }

    #[test]
    fn test_builder_from_feature_names() {
        // ---
        let names: Vec<String> = ["moisture", "crop_Cotton", "crop_Sugarcane"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let builder = FeatureBuilder::for_feature_names(&names);
        let cols = builder.column_names();
        assert_eq!(&cols[9..], &["crop_Cotton".to_string(), "crop_Sugarcane".to_string()]);
    }

    #[test]
    fn test_aligned_row_reorders_and_rejects_unknown() {
        // ---
        let table = build_features(&[raw(Some(10), Some(5), Some(20), Some(40.0))]);
        let wanted = vec!["potassium".to_string(), "moisture".to_string()];
        assert_eq!(table.aligned_row(0, &wanted, Scaling::Raw).unwrap(), vec![20.0, 40.0]);

        let unknown = vec!["moisture".to_string(), "ph".to_string()];
        assert_eq!(
            table.aligned_row(0, &unknown, Scaling::Raw),
            Err(AnalyticsError::FeatureShape { expected: 2, actual: 1 })
        );
        assert!(table.aligned_row(3, &wanted, Scaling::Standardized).is_err());
    }
}
