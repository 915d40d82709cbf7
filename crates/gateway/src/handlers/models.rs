//! Model discovery handler

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use claimforge_common::{errors::Result, extraction::ModelInfo};

#[derive(Debug, Default, Deserialize)]
pub struct ListModelsQuery {
    /// Keep only models supporting this generation method, e.g. `generateContent`
    pub method: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListModelsResponse {
    /// Configured fallback order
    pub candidates: Vec<String>,
    /// Models the credential can reach
    pub models: Vec<ModelInfo>,
}

/// List reachable models alongside the configured candidates
pub async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ListModelsQuery>,
) -> Result<Json<ListModelsResponse>> {
    let mut models = state.extractor.list_models().await?;

    if let Some(method) = query.method.as_deref() {
        models.retain(|model| {
            model
                .supported_generation_methods
                .iter()
                .any(|supported| supported == method)
        });
    }

    tracing::debug!(count = models.len(), "Listed models");

    Ok(Json(ListModelsResponse {
        candidates: state.extractor.candidates().to_vec(),
        models,
    }))
}
