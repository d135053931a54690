//! Analytics and recommendation engine.
//!
//! Gateway for the pure decision logic of the service (EMBP): feature
//! preparation, rule-based health/alert evaluation and the two classifier
//! recommenders. Nothing in here touches the database or HTTP; the routes
//! call these functions and persist whatever they return.

mod artifact;
mod crop;
mod features;
mod fertilizer;
mod health;

use std::path::Path;

pub use artifact::{
    ArtifactScaler, Classifier, DecisionTree, ForestModel, ModelArtifact, ModelSlot, ModelSpec,
    SoftmaxModel, TreeNode, ARTIFACT_SCHEMA,
};
pub use crop::{CropRecommender, TOP_CROPS};
pub use features::{
    build_features, CropTagged, FeatureBuilder, FeatureSource, FeatureTable, Scaling,
    StandardScaler, CROP_COLUMN_PREFIX, MEASUREMENT_COLUMNS, RATIO_COLUMNS,
};
pub use fertilizer::FertilizerRecommender;
pub use health::{
    assess_crop_health, base_yield, detect_water_stress, generate_alerts, predict_yield,
    round_to, HealthAssessment, BASE_YIELDS, DEFAULT_BASE_YIELD, WATER_STRESS_MIN_DRY,
    WATER_STRESS_THRESHOLD, WATER_STRESS_WINDOW,
};

use crate::error::AnalyticsResult;

// ---

/// Both recommenders, shared read-only across requests.
pub struct Recommenders {
    pub crop: CropRecommender,
    pub fertilizer: FertilizerRecommender,
}

impl Recommenders {
    // ---
    pub fn unloaded() -> Self {
        Recommenders {
            crop: CropRecommender::unloaded(),
            fertilizer: FertilizerRecommender::unloaded(),
        }
    }

    /// Load both artifacts. A failure is logged and recorded in the slot so
    /// requests report why the model is unavailable; the other recommender
    /// is unaffected.
    pub fn load(crop_path: &Path, fertilizer_path: &Path) -> Self {
        // ---
        let recommenders = Self::unloaded();
        let _ = reload_slot(recommenders.crop.slot(), crop_path);
        let _ = reload_slot(recommenders.fertilizer.slot(), fertilizer_path);
        recommenders
    }
}

/// Load an artifact from `path` and swap it into `slot`.
///
/// The new model is fully parsed and validated before the swap; on failure
/// the slot keeps whatever it held before.
pub fn reload_slot(slot: &ModelSlot<ModelArtifact>, path: &Path) -> AnalyticsResult<String> {
    // ---
    match ModelArtifact::load(path) {
        Ok(artifact) => {
            let name = artifact.name.clone();
            let previous = slot.replace(artifact);
            tracing::info!(
                slot = slot.name(),
                artifact = %name,
                replaced = previous.is_some(),
                "model slot updated"
            );
            Ok(name)
        }
        Err(e) => {
            tracing::warn!(slot = slot.name(), path = %path.display(), "model load failed: {e}");
            slot.mark_unavailable(e.to_string());
            Err(e)
        }
    }
}
