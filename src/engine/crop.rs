//! Crop recommender: ranks the classifier's classes and keeps the top three.

use std::cmp::Ordering;

use crate::engine::artifact::{Classifier, ModelArtifact, ModelSlot};
use crate::engine::health::round_to;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::CropSuggestion;

// ---

/// Number of crops returned per recommendation.
pub const TOP_CROPS: usize = 3;

pub struct CropRecommender<C = ModelArtifact> {
    slot: ModelSlot<C>,
}

impl<C: Classifier> CropRecommender<C> {
    // ---
    pub fn unloaded() -> Self {
        Self {
            slot: ModelSlot::empty("crop recommender"),
        }
    }

    pub fn with_model(model: C) -> Self {
        Self {
            slot: ModelSlot::with_model("crop recommender", model),
        }
    }

    pub fn slot(&self) -> &ModelSlot<C> {
        &self.slot
    }

    /// Feature names the loaded model expects, in input order.
    pub fn expected_features(&self) -> AnalyticsResult<Vec<String>> {
        Ok(self.slot.get()?.feature_names().to_vec())
    }

    /// Top three crops for one feature vector, most likely first.
    ///
    /// Probabilities are rounded to 3 decimals. Equal probabilities keep the
    /// classifier's class order.
    pub fn recommend_crop(&self, features: &[f64]) -> AnalyticsResult<Vec<CropSuggestion>> {
        // ---
        let model = self.slot.get()?;

        if features.len() != model.n_features() {
            return Err(AnalyticsError::FeatureShape {
                expected: model.n_features(),
                actual: features.len(),
            });
        }

        let probabilities = model.predict_class_probabilities(features)?;
        let labels = model.labels();
        if probabilities.len() != labels.len() || labels.len() < TOP_CROPS {
            return Err(AnalyticsError::ModelNotLoaded(format!(
                "crop model must map at least {TOP_CROPS} classes to labels, has {} labels for {} outputs",
                labels.len(),
                probabilities.len()
            )));
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(AnalyticsError::ModelNotLoaded(format!(
                "{} produced a non-finite probability",
                self.slot.name()
            )));
        }

        let mut ranked: Vec<(usize, f64)> = probabilities.into_iter().enumerate().collect();
        // Stable sort: ties stay in class order.
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        Ok(ranked
            .into_iter()
            .take(TOP_CROPS)
            .map(|(idx, p)| CropSuggestion {
                crop: labels[idx].clone(),
                probability: round_to(p.clamp(0.0, 1.0), 3),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use proptest::prelude::*;

    /// Returns the same probabilities for every input.
    struct FixedClassifier {
        features: Vec<String>,
        labels: Vec<String>,
        probabilities: Vec<f64>,
    }

    impl FixedClassifier {
        fn new(labels: &[&str], probabilities: Vec<f64>) -> Self {
            // ---
            FixedClassifier {
                features: (0..9).map(|i| format!("f{i}")).collect(),
                labels: labels.iter().map(|s| s.to_string()).collect(),
                probabilities,
            }
        }
    }

    impl Classifier for FixedClassifier {
        fn feature_names(&self) -> &[String] {
            &self.features
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn predict_class_probabilities(&self, _features: &[f64]) -> AnalyticsResult<Vec<f64>> {
            Ok(self.probabilities.clone())
        }
    }

    const CROPS: [&str; 5] = ["Wheat", "Rice", "Maize", "Barley", "Cotton"];

    #[test]
    fn test_top_three_descending() {
        // ---
        let rec = CropRecommender::with_model(FixedClassifier::new(
            &CROPS,
            vec![0.05, 0.40, 0.1234, 0.30, 0.1266],
        ));
        let out = rec.recommend_crop(&[0.0; 9]).unwrap();
        let names: Vec<&str> = out.iter().map(|s| s.crop.as_str()).collect();
        assert_eq!(names, vec!["Rice", "Barley", "Cotton"]);
        assert_eq!(out[2].probability, 0.127);
    }

    #[test]
    fn test_ties_keep_class_order() {
        // ---
        let rec = CropRecommender::with_model(FixedClassifier::new(&CROPS, vec![0.2; 5]));
        let out = rec.recommend_crop(&[0.0; 9]).unwrap();
        let names: Vec<&str> = out.iter().map(|s| s.crop.as_str()).collect();
        assert_eq!(names, vec!["Wheat", "Rice", "Maize"]);
    }

    #[test]
    fn test_unloaded_model() {
        // ---
        let rec: CropRecommender = CropRecommender::unloaded();
        assert!(matches!(
            rec.recommend_crop(&[0.0; 9]),
            Err(AnalyticsError::ModelNotLoaded(_))
        ));
    }

    #[test]
    fn test_feature_shape_mismatch() {
        // ---
        let rec = CropRecommender::with_model(FixedClassifier::new(&CROPS, vec![0.2; 5]));
        assert_eq!(
            rec.recommend_crop(&[0.0; 6]),
            Err(AnalyticsError::FeatureShape { expected: 9, actual: 6 })
        );
    }

    #[test]
    fn test_too_few_classes() {
        // ---
        let rec = CropRecommender::with_model(FixedClassifier::new(&CROPS[..2], vec![0.5, 0.5]));
        assert!(matches!(
            rec.recommend_crop(&[0.0; 9]),
            Err(AnalyticsError::ModelNotLoaded(_))
        ));
    }

    #[test]
    fn test_non_finite_probability_is_an_error() {
        // ---
        let rec = CropRecommender::with_model(FixedClassifier::new(
            &CROPS,
            vec![f64::NAN, 0.2, 0.2, 0.2, 0.2],
        ));
        assert!(matches!(
            rec.recommend_crop(&[0.0; 9]),
            Err(AnalyticsError::ModelNotLoaded(msg)) if msg.contains("non-finite")
        ));
    }

    proptest! {
        #[test]
        fn always_three_bounded_non_increasing(
            weights in prop::collection::vec(0.0f64..1.0, 5),
        ) {
            let total: f64 = weights.iter().sum::<f64>() + 1e-9;
            let probs = weights.iter().map(|w| w / total).collect();
            let rec = CropRecommender::with_model(FixedClassifier::new(&CROPS, probs));
            let out = rec.recommend_crop(&[0.0; 9]).unwrap();

            prop_assert_eq!(out.len(), 3);
            for s in &out {
                prop_assert!((0.0..=1.0).contains(&s.probability));
            }
            for pair in out.windows(2) {
                prop_assert!(pair[0].probability >= pair[1].probability);
            }
        }
    }
}
