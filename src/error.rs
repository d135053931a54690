//! Error taxonomy for the analytics and recommendation engine.
//!
//! The engine returns these typed errors and never logs or retries on its
//! own; translating them into HTTP responses is the job of `routes`.

use thiserror::Error;

/// Failures raised by the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyticsError {
    // ---
    /// A reading field is missing or outside its accepted range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A recommender was invoked with no usable model artifact.
    #[error("model not loaded: {0}")]
    ModelNotLoaded(String),

    /// Feature dimensionality does not match what the model was trained on.
    #[error("feature shape mismatch: model expects {expected} features, got {actual}")]
    FeatureShape { expected: usize, actual: usize },

    /// A history-based query was made against zero readings.
    #[error("no historical readings available")]
    EmptyHistory,
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
