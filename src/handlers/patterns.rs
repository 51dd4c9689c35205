use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::models::AnalyzePatternsRequest;
use crate::services::frame::Frame;
use crate::services::patterns::PatternContext;
use crate::utils::{ApiError, ApiResult};

/// Run pattern detection over a tabular frame
#[utoipa::path(
    post,
    path = "/v1/analyze_patterns",
    responses(
        (status = 200, description = "Ranked patterns, insights and recommendations"),
        (status = 400, description = "Malformed frame or context")
    ),
    tag = "Intelligence"
)]
pub async fn analyze_patterns(
    State(state): State<Arc<crate::AppState>>,
    Json(request): Json<AnalyzePatternsRequest>,
) -> ApiResult<Json<Value>> {
    let frame = Frame::from_json(&request.data)?;
    tracing::info!(
        "Analyzing patterns over {} rows x {} columns",
        frame.row_count(),
        frame.column_count()
    );

    // Requested columns must exist; auto-selection handles the rest
    if let Some(columns) = &request.columns {
        for column in columns {
            if !frame.has_column(column) {
                return Err(ApiError::invalid_data(format!("unknown column '{}'", column)));
            }
        }
    }

    let context: Option<PatternContext> = request
        .context
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ApiError::invalid_data(format!("invalid context: {}", e)))?;

    let report = state
        .pattern_engine
        .analyze(Arc::new(frame), request.columns, request.detector_types, context)
        .await;

    Ok(Json(json!({ "result": report })))
}

/// Pattern engine and query generator runtime metrics
#[utoipa::path(
    get,
    path = "/v1/metrics",
    responses(
        (status = 200, description = "Engine metrics")
    ),
    tag = "Service"
)]
pub async fn engine_metrics(State(state): State<Arc<crate::AppState>>) -> Json<Value> {
    Json(json!({
        "pattern_engine": state.pattern_engine.metrics(),
        "query_generator": state.query_generator.metrics(),
    }))
}
