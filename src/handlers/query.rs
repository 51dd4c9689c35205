use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::models::{ExplainQueryRequest, GenerateQueryRequest, SuggestQueriesRequest};
use crate::utils::ApiResult;

/// Generate an optimized telemetry query from natural language
#[utoipa::path(
    post,
    path = "/v1/generate_query",
    responses(
        (status = 200, description = "Generated query with cost estimate and alternatives"),
        (status = 400, description = "Malformed request")
    ),
    tag = "Intelligence"
)]
pub async fn generate_query(
    State(state): State<Arc<crate::AppState>>,
    Json(request): Json<GenerateQueryRequest>,
) -> ApiResult<Json<Value>> {
    tracing::info!("Generating query for: {:.80}", request.natural_query);
    let result = state
        .query_generator
        .generate(&request.natural_query, request.context.as_ref());
    Ok(Json(json!({ "result": result })))
}

/// Suggest query completions for a partial utterance
#[utoipa::path(
    post,
    path = "/v1/suggest_queries",
    responses(
        (status = 200, description = "Up to 10 completions")
    ),
    tag = "Intelligence"
)]
pub async fn suggest_queries(
    State(state): State<Arc<crate::AppState>>,
    Json(request): Json<SuggestQueriesRequest>,
) -> ApiResult<Json<Value>> {
    let suggestions = state
        .query_generator
        .suggest_queries(&request.partial_query, request.context.as_ref());
    Ok(Json(json!({ "result": { "suggestions": suggestions } })))
}

/// Explain what a query does in natural language
#[utoipa::path(
    post,
    path = "/v1/explain_query",
    responses(
        (status = 200, description = "Query decomposition and summary")
    ),
    tag = "Intelligence"
)]
pub async fn explain_query(
    State(state): State<Arc<crate::AppState>>,
    Json(request): Json<ExplainQueryRequest>,
) -> ApiResult<Json<Value>> {
    let explanation = state.query_generator.explain_query(&request.query);
    Ok(Json(json!({ "result": explanation })))
}
