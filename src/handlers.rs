use std::collections::BTreeMap;
use std::time::Instant;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::adapter::SequencePhase;
use crate::error::ApiError;
use crate::logger::log_completion;
use crate::metrics::MetricsSnapshot;
use crate::models::{CompletionRequest, CompletionResponse, ModelEntry};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub runtime: bool
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {

    let runtime = state.adapter.health().await;

    Json(HealthResponse {
        status: (if runtime { "ok" } else { "degraded" }).to_string(),
        runtime,
    })

}

pub async fn list_models(State(state): State<AppState>) -> Json<BTreeMap<String, ModelEntry>> {

    Json(state.registry.list_models())

}

#[derive(Debug, Deserialize)]
pub struct LoadModelQuery {
    pub model_id: String
}

pub async fn load_model(
    State(state): State<AppState>,
    Query(query): Query<LoadModelQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {

    state.registry.load_model(&query.model_id)?;

    Ok(Json(serde_json::json!({ "loaded": query.model_id })))

}

pub async fn loaded_model(State(state): State<AppState>) -> Json<serde_json::Value> {

    Json(serde_json::json!({ "loaded": state.registry.loaded() }))

}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub phase: SequencePhase,
    pub mock_runtime: bool,
    pub runtime_process: Option<bool>,
    pub success_rate: f64,
    #[serde(flatten)]
    pub counters: MetricsSnapshot
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {

    let counters = state.adapter.metrics().snapshot();

    Json(MetricsResponse {
        phase: state.adapter.phase(),
        mock_runtime: state.adapter.is_mock(),
        runtime_process: state.adapter.process_running().await,
        success_rate: counters.success_rate(),
        counters,
    })

}

pub async fn chat_completions(
    State(state): State<AppState>,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<Json<CompletionResponse>, ApiError> {

    let Json(request) = payload?;

    let params = request.resolve_params(
        state.settings.default_max_tokens,
        state.settings.max_context_tokens,
    )?;

    // system messages go through reset, the rest are the turns
    let system_prompt = request.system_prompt();
    let turns = request.turns();

    tracing::debug!(model = %request.model, turns = turns.len(), max_tokens = params.max_tokens, "completion request");

    let started = Instant::now();
    let completion = state.adapter
        .reset_then_chat(system_prompt, &turns, &params)
        .await?;

    log_completion(&request.model, completion.prompt_tokens, completion.completion_tokens, started.elapsed());

    Ok(Json(CompletionResponse::from_completion(&request.model, completion)))

}
