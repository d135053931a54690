//! Live model reload.
//!
//! `POST /api/models/reload` re-reads both artifacts from the configured
//! paths. Each slot is swapped only after its new artifact validated, so a
//! bad file leaves the previous model serving.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info};

use super::{json_error, AppState};
use crate::engine::{self, ModelArtifact, ModelSlot};

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/api/models/reload", post(reload))
}

#[derive(Debug, Serialize)]
struct SlotOutcome {
    loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReloadResponse {
    crop: SlotOutcome,
    fertilizer: SlotOutcome,
}

fn reload_one(slot: &ModelSlot<ModelArtifact>, path: &Path) -> SlotOutcome {
    // ---
    match engine::reload_slot(slot, path) {
        Ok(name) => SlotOutcome {
            loaded: true,
            artifact: Some(name),
            error: None,
        },
        Err(e) => SlotOutcome {
            loaded: slot.is_loaded(),
            artifact: None,
            error: Some(e.to_string()),
        },
    }
}

async fn reload(State(state): State<AppState>) -> Response {
    // ---
    info!("POST /api/models/reload");
    let recommenders = Arc::clone(&state.recommenders);
    let crop_path = state.config.crop_model_path.clone();
    let fertilizer_path = state.config.fertilizer_model_path.clone();

    // File reads and validation stay off the async workers.
    let outcome = tokio::task::spawn_blocking(move || ReloadResponse {
        crop: reload_one(recommenders.crop.slot(), &crop_path),
        fertilizer: reload_one(recommenders.fertilizer.slot(), &fertilizer_path),
    })
    .await;

    match outcome {
        Ok(response) => {
            info!("Model reload finished: {:?}", response);
            Json(response).into_response()
        }
        Err(e) => {
            error!("Model reload task failed: {}", e);
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            )
        }
    }
}
