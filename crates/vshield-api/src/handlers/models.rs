//! Model listing handler.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use vshield_models::ModelId;

use crate::state::AppState;

/// Configured models and which of them are loaded.
#[derive(Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelId>,
    pub default: ModelId,
    pub loaded: Vec<ModelId>,
}

/// List configured models.
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let catalog = state.registry.catalog();

    Json(ModelsResponse {
        models: catalog.iter().cloned().collect(),
        default: catalog.default_model().clone(),
        loaded: state.registry.loaded_models(),
    })
}
