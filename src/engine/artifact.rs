//! Trained classifier artifacts and the slot that holds the live model.
//!
//! Artifacts are JSON documents produced by offline training. They carry a
//! schema tag, the ordered feature names the model was trained on, the
//! class-index-to-label mapping, an optional scaler and the model itself.
//! Everything is checked at load time so inference never runs on a model
//! whose shapes disagree.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;

use crate::error::{AnalyticsError, AnalyticsResult};

// ---

/// Schema tag every artifact must carry.
pub const ARTIFACT_SCHEMA: &str = "agri-classifier/v1";

/// A multi-class probabilistic classifier.
///
/// Implementations must be usable from many threads at once without
/// mutating themselves during inference.
pub trait Classifier: Send + Sync {
    /// Feature names in the order `predict_class_probabilities` expects.
    fn feature_names(&self) -> &[String];

    /// Class labels, indexed like the probability vector.
    fn labels(&self) -> &[String];

    /// One probability per class for a single feature vector.
    fn predict_class_probabilities(&self, features: &[f64]) -> AnalyticsResult<Vec<f64>>;

    fn n_features(&self) -> usize {
        self.feature_names().len()
    }
}

/// Per-feature standardization stored with the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArtifactScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Multinomial logistic regression: one weight row per class.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SoftmaxModel {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

/// Node of a decision tree. Node 0 is the root.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// `features[feature] <= threshold` goes left, otherwise right.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        probabilities: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

/// Ensemble of decision trees whose leaf distributions are averaged.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForestModel {
    pub trees: Vec<DecisionTree>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSpec {
    Softmax(SoftmaxModel),
    Forest(ForestModel),
}

/// A validated, ready-to-serve classifier artifact.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelArtifact {
    // ---
    pub schema: String,
    pub name: String,
    pub feature_names: Vec<String>,
    pub classes: Vec<String>,
    #[serde(default)]
    pub scaler: Option<ArtifactScaler>,
    pub model: ModelSpec,
}

fn invalid(name: &str, reason: impl std::fmt::Display) -> AnalyticsError {
    AnalyticsError::ModelNotLoaded(format!("artifact '{name}' rejected: {reason}"))
}

impl ModelArtifact {
    // ---
    /// Parse and validate an artifact from its JSON text.
    pub fn from_json(text: &str) -> AnalyticsResult<Self> {
        // ---
        let artifact: ModelArtifact = serde_json::from_str(text)
            .map_err(|e| AnalyticsError::ModelNotLoaded(format!("malformed artifact: {e}")))?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Read, parse and validate an artifact file.
    pub fn load(path: impl AsRef<Path>) -> AnalyticsResult<Self> {
        // ---
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AnalyticsError::ModelNotLoaded(format!("cannot read {}: {e}", path.display()))
        })?;
        let artifact = Self::from_json(&text)?;

        tracing::info!(
            artifact = %artifact.name,
            path = %path.display(),
            features = artifact.feature_names.len(),
            classes = artifact.classes.len(),
            "loaded model artifact"
        );
        Ok(artifact)
    }

    fn validate(&self) -> AnalyticsResult<()> {
        // ---
        let name = self.name.as_str();
        if self.schema != ARTIFACT_SCHEMA {
            return Err(invalid(
                name,
                format!("schema '{}' is not '{ARTIFACT_SCHEMA}'", self.schema),
            ));
        }
        if self.feature_names.is_empty() {
            return Err(invalid(name, "no feature names"));
        }
        if self.classes.is_empty() {
            return Err(invalid(name, "no classes"));
        }

        let width = self.feature_names.len();
        let n_classes = self.classes.len();

        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != width || scaler.scale.len() != width {
                return Err(invalid(name, "scaler width differs from feature count"));
            }
            if scaler.scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err(invalid(name, "scaler has a zero or non-finite scale"));
            }
            if scaler.mean.iter().any(|m| !m.is_finite()) {
                return Err(invalid(name, "scaler has a non-finite mean"));
            }
        }

        match &self.model {
            ModelSpec::Softmax(m) => {
                if m.weights.len() != n_classes || m.bias.len() != n_classes {
                    return Err(invalid(name, "softmax rows differ from class count"));
                }
                if m.weights.iter().any(|row| row.len() != width) {
                    return Err(invalid(name, "softmax weight row differs from feature count"));
                }
                if m.weights.iter().flatten().chain(&m.bias).any(|v| !v.is_finite()) {
                    return Err(invalid(name, "softmax parameters must be finite"));
                }
            }
            ModelSpec::Forest(f) => {
                if f.trees.is_empty() {
                    return Err(invalid(name, "forest has no trees"));
                }
                for (t, tree) in f.trees.iter().enumerate() {
                    tree.validate(width, n_classes)
                        .map_err(|reason| invalid(name, format!("tree {t}: {reason}")))?;
                }
            }
        }
        Ok(())
    }
}

impl DecisionTree {
    // ---
    /// Children must point forward so traversal always terminates.
    fn validate(&self, width: usize, n_classes: usize) -> Result<(), String> {
        // ---
        if self.nodes.is_empty() {
            return Err("no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= width {
                        return Err(format!("node {idx} splits on missing feature {feature}"));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {idx} has a NaN threshold"));
                    }
                    for child in [left, right] {
                        if *child <= idx || *child >= self.nodes.len() {
                            return Err(format!("node {idx} has invalid child {child}"));
                        }
                    }
                }
                TreeNode::Leaf { probabilities } => {
                    if probabilities.len() != n_classes {
                        return Err(format!("leaf {idx} has {} classes", probabilities.len()));
                    }
                    if probabilities.iter().any(|p| !(0.0..=1.0).contains(p)) {
                        return Err(format!("leaf {idx} has a probability outside [0, 1]"));
                    }
                }
            }
        }
        Ok(())
    }

    fn leaf(&self, features: &[f64]) -> &[f64] {
        // ---
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] <= *threshold { *left } else { *right };
                }
                TreeNode::Leaf { probabilities } => return probabilities,
            }
        }
    }
}

impl SoftmaxModel {
    fn probabilities(&self, features: &[f64]) -> Vec<f64> {
        // ---
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(features).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }
}

impl ForestModel {
    fn probabilities(&self, features: &[f64], n_classes: usize) -> Vec<f64> {
        // ---
        let mut sums = vec![0.0; n_classes];
        for tree in &self.trees {
            for (s, p) in sums.iter_mut().zip(tree.leaf(features)) {
                *s += p;
            }
        }
        let n = self.trees.len() as f64;
        sums.into_iter().map(|s| s / n).collect()
    }
}

impl Classifier for ModelArtifact {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn labels(&self) -> &[String] {
        &self.classes
    }

    fn predict_class_probabilities(&self, features: &[f64]) -> AnalyticsResult<Vec<f64>> {
        // ---
        if features.len() != self.feature_names.len() {
            return Err(AnalyticsError::FeatureShape {
                expected: self.feature_names.len(),
                actual: features.len(),
            });
        }
        if let Some(bad) = features.iter().position(|v| !v.is_finite()) {
            return Err(AnalyticsError::InvalidInput(format!(
                "feature '{}' is not finite",
                self.feature_names[bad]
            )));
        }

        let scaled: Vec<f64> = match &self.scaler {
            Some(s) => features
                .iter()
                .zip(s.mean.iter().zip(&s.scale))
                .map(|(v, (m, sc))| (v - m) / sc)
                .collect(),
            None => features.to_vec(),
        };

        let probabilities = match &self.model {
            ModelSpec::Softmax(m) => m.probabilities(&scaled),
            ModelSpec::Forest(f) => f.probabilities(&scaled, self.classes.len()),
        };
        // Finite parameters can still overflow a logit on extreme inputs.
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(AnalyticsError::ModelNotLoaded(format!(
                "artifact '{}' produced a non-finite probability",
                self.name
            )));
        }
        Ok(probabilities.into_iter().map(|p| p.clamp(0.0, 1.0)).collect())
    }
}

// ---

/// Holder for the live model of one recommender.
///
/// Readers clone the inner `Arc` and run inference without holding the
/// lock. [`ModelSlot::replace`] swaps in a fully loaded model, so in-flight
/// calls keep using the model they started with.
#[derive(Debug)]
pub struct ModelSlot<C> {
    name: &'static str,
    current: RwLock<Result<Arc<C>, String>>,
}

impl<C> ModelSlot<C> {
    // ---
    pub fn empty(name: &'static str) -> Self {
        // ---
        ModelSlot {
            name,
            current: RwLock::new(Err("no artifact has been loaded".to_string())),
        }
    }

    pub fn with_model(name: &'static str, model: C) -> Self {
        // ---
        ModelSlot {
            name,
            current: RwLock::new(Ok(Arc::new(model))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The current model, or `ModelNotLoaded` with the last failure reason.
    pub fn get(&self) -> AnalyticsResult<Arc<C>> {
        // ---
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        match &*guard {
            Ok(model) => Ok(Arc::clone(model)),
            Err(reason) => Err(AnalyticsError::ModelNotLoaded(format!(
                "{}: {reason}",
                self.name
            ))),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.get().is_ok()
    }

    /// Swap in a new model, returning the previous one if there was one.
    pub fn replace(&self, model: C) -> Option<Arc<C>> {
        // ---
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Ok(Arc::new(model))).ok()
    }

    /// Record why no model is available. Ignored if a model is already
    /// loaded, so a failed reload keeps serving the previous model.
    pub fn mark_unavailable(&self, reason: impl Into<String>) {
        // ---
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if guard.is_err() {
            *guard = Err(reason.into());
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn softmax_json() -> serde_json::Value {
        // ---
        json!({
            "schema": ARTIFACT_SCHEMA,
            "name": "crop-test",
            "feature_names": ["moisture", "nitrogen"],
            "classes": ["Wheat", "Rice", "Maize"],
            "model": {
                "type": "softmax",
                "weights": [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
                "bias": [0.0, 0.0, 0.0]
            }
        })
    }

    fn forest_json() -> serde_json::Value {
        // ---
        json!({
            "schema": ARTIFACT_SCHEMA,
            "name": "fertilizer-test",
            "feature_names": ["nitrogen"],
            "classes": ["Urea", "DAP"],
            "model": {
                "type": "forest",
                "trees": [
                    { "nodes": [
                        { "feature": 0, "threshold": 50.0, "left": 1, "right": 2 },
                        { "probabilities": [1.0, 0.0] },
                        { "probabilities": [0.0, 1.0] }
                    ]},
                    { "nodes": [ { "probabilities": [0.5, 0.5] } ] }
                ]
            }
        })
    }

    fn parse(value: serde_json::Value) -> AnalyticsResult<ModelArtifact> {
        ModelArtifact::from_json(&value.to_string())
    }

    #[test]
    fn test_softmax_probabilities_sum_to_one() {
        // ---
        let artifact = parse(softmax_json()).unwrap();
        let probs = artifact.predict_class_probabilities(&[0.0, 0.0]).unwrap();
        for p in &probs {
            assert_relative_eq!(*p, 1.0 / 3.0, epsilon = 1e-12);
        }

        let probs = artifact.predict_class_probabilities(&[2.0, 0.0]).unwrap();
        assert_relative_eq!(probs.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(probs[1] > probs[0]);
        assert_relative_eq!(probs[0], probs[2], epsilon = 1e-12);
    }

    #[test]
    fn test_softmax_applies_scaler() {
        // ---
        let mut value = softmax_json();
        value["scaler"] = json!({ "mean": [10.0, 0.0], "scale": [2.0, 1.0] });
        let artifact = parse(value).unwrap();
        // (10 - 10) / 2 = 0 so all logits are zero.
        let probs = artifact.predict_class_probabilities(&[10.0, 0.0]).unwrap();
        assert_relative_eq!(probs[0], probs[1], epsilon = 1e-12);
    }

    #[test]
    fn test_forest_averages_leaves() {
        // ---
        let artifact = parse(forest_json()).unwrap();
        assert_eq!(artifact.predict_class_probabilities(&[10.0]).unwrap(), vec![0.75, 0.25]);
        assert_eq!(artifact.predict_class_probabilities(&[50.0]).unwrap(), vec![0.75, 0.25]);
        assert_eq!(artifact.predict_class_probabilities(&[80.0]).unwrap(), vec![0.25, 0.75]);
    }

    #[test]
    fn test_wrong_feature_count() {
        // ---
        let artifact = parse(softmax_json()).unwrap();
        assert_eq!(
            artifact.predict_class_probabilities(&[1.0]),
            Err(AnalyticsError::FeatureShape { expected: 2, actual: 1 })
        );
        assert!(matches!(
            artifact.predict_class_probabilities(&[f64::NAN, 1.0]),
            Err(AnalyticsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_bad_schema_and_shapes() {
        // ---
        let mut value = softmax_json();
        value["schema"] = json!("pickle");
        assert!(matches!(parse(value), Err(AnalyticsError::ModelNotLoaded(_))));

        let mut value = softmax_json();
        value["model"]["bias"] = json!([0.0, 0.0]);
        assert!(parse(value).is_err());

        let mut value = softmax_json();
        value["model"]["weights"][1] = json!([1.0]);
        assert!(parse(value).is_err());

        let mut value = softmax_json();
        value["scaler"] = json!({ "mean": [0.0, 0.0], "scale": [1.0, 0.0] });
        assert!(parse(value).is_err());

        assert!(ModelArtifact::from_json("not json").is_err());
    }

    #[test]
    fn test_overflowing_logits_fail_instead_of_nan() {
        // ---
        let mut value = softmax_json();
        value["model"]["weights"] = json!([[1e308, 0.0], [0.0, 0.0], [0.0, 0.0]]);
        let artifact = parse(value).unwrap();

        assert!(matches!(
            artifact.predict_class_probabilities(&[10.0, 0.0]),
            Err(AnalyticsError::ModelNotLoaded(msg)) if msg.contains("crop-test")
        ));
        // Inputs that stay in range still predict.
        let probs = artifact.predict_class_probabilities(&[0.0, 0.0]).unwrap();
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_rejects_leaf_probability_out_of_range() {
        // ---
        let mut value = forest_json();
        value["model"]["trees"][1]["nodes"][0]["probabilities"] = json!([1.5, -0.5]);
        assert!(matches!(parse(value), Err(AnalyticsError::ModelNotLoaded(_))));
    }

    #[test]
    fn test_rejects_cyclic_or_mismatched_trees() {
        // ---
        let mut value = forest_json();
        value["model"]["trees"][0]["nodes"][0]["left"] = json!(0);
        assert!(parse(value).is_err());

        let mut value = forest_json();
        value["model"]["trees"][0]["nodes"][1] = json!({ "probabilities": [1.0] });
        assert!(parse(value).is_err());

        let mut value = forest_json();
        value["model"]["trees"][0]["nodes"][0]["feature"] = json!(3);
        assert!(parse(value).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        // ---
        let err = ModelArtifact::load("/nonexistent/crop_model.json").unwrap_err();
        assert!(matches!(err, AnalyticsError::ModelNotLoaded(msg) if msg.contains("cannot read")));
    }

    #[test]
    fn test_slot_swap_keeps_in_flight_model() {
        // ---
        let slot = ModelSlot::with_model("crop", 1u32);
        let held = slot.get().unwrap();
        let previous = slot.replace(2u32);

        assert_eq!(*held, 1);
        assert_eq!(previous.as_deref(), Some(&1));
        assert_eq!(*slot.get().unwrap(), 2);
    }

    #[test]
    fn test_slot_unavailable_reason() {
        // ---
        let slot: ModelSlot<u32> = ModelSlot::empty("fertilizer");
        assert!(!slot.is_loaded());

        slot.mark_unavailable("file missing");
        assert_eq!(
            slot.get(),
            Err(AnalyticsError::ModelNotLoaded("fertilizer: file missing".to_string()))
        );

        slot.replace(7);
        slot.mark_unavailable("reload failed");
        assert_eq!(*slot.get().unwrap(), 7);
    }
}
