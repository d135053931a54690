//! Fertilizer recommender: the single most likely fertilizer for a reading.
//!
//! The crop is attached to the result as context only. Models trained with
//! crop one-hot columns get them from the feature builder upstream.

use crate::engine::artifact::{Classifier, ModelArtifact, ModelSlot};
use crate::engine::health::round_to;
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::models::FertilizerSuggestion;

// ---

pub struct FertilizerRecommender<C = ModelArtifact> {
    slot: ModelSlot<C>,
}

impl<C: Classifier> FertilizerRecommender<C> {
    // ---
    pub fn unloaded() -> Self {
        Self {
            slot: ModelSlot::empty("fertilizer recommender"),
        }
    }

    pub fn with_model(model: C) -> Self {
        Self {
            slot: ModelSlot::with_model("fertilizer recommender", model),
        }
    }

    pub fn slot(&self) -> &ModelSlot<C> {
        &self.slot
    }

    /// Feature names the loaded model expects, in input order.
    pub fn expected_features(&self) -> AnalyticsResult<Vec<String>> {
        Ok(self.slot.get()?.feature_names().to_vec())
    }

    /// Highest-probability fertilizer; the first class wins a tie.
    pub fn recommend_fertilizer(
        &self,
        features: &[f64],
        crop: &str,
    ) -> AnalyticsResult<FertilizerSuggestion> {
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
        if probabilities.is_empty() || probabilities.len() != labels.len() {
            return Err(AnalyticsError::ModelNotLoaded(format!(
                "fertilizer model has {} labels for {} outputs",
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

        let (best, p) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, probabilities[0]), |(bi, bp), (i, p)| {
                if p > bp {
                    (i, p)
                } else {
                    (bi, bp)
                }
            });

        Ok(FertilizerSuggestion {
            fertilizer: labels[best].clone(),
            probability: round_to(p.clamp(0.0, 1.0), 3),
            crop: crop.to_string(),
        })
    }
}
