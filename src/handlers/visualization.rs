use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::models::{OptimizeLayoutRequest, RecommendChartsRequest};
use crate::services::frame::Frame;
use crate::services::visualization::LayoutStrategy;
use crate::utils::{ApiError, ApiResult};

/// Recommend chart types for a data shape (or raw frame data)
#[utoipa::path(
    post,
    path = "/v1/recommend_charts",
    responses(
        (status = 200, description = "Ranked chart recommendations"),
        (status = 400, description = "Neither a data shape nor frame data supplied")
    ),
    tag = "Intelligence"
)]
pub async fn recommend_charts(
    State(state): State<Arc<crate::AppState>>,
    Json(request): Json<RecommendChartsRequest>,
) -> ApiResult<Json<Value>> {
    let shape = match (request.data_shape, &request.data) {
        (Some(shape), _) => shape,
        (None, Some(data)) => {
            let frame = Frame::from_json(data)?;
            state.shape_analyzer.analyze(&frame, None)
        },
        (None, None) => {
            return Err(ApiError::invalid_data(
                "request must carry either data_shape or data",
            ));
        },
    };

    let recommendations = state
        .chart_recommender
        .recommend(&shape, request.context.as_ref());
    tracing::info!("Produced {} chart recommendations", recommendations.len());

    Ok(Json(json!({
        "result": {
            "data_shape": shape,
            "recommendations": recommendations,
        }
    })))
}

/// Optimize a dashboard layout for the given widgets
#[utoipa::path(
    post,
    path = "/v1/optimize_layout",
    responses(
        (status = 200, description = "Placements with layout quality scores"),
        (status = 400, description = "Unknown strategy or malformed widgets")
    ),
    tag = "Intelligence"
)]
pub async fn optimize_layout(
    State(state): State<Arc<crate::AppState>>,
    Json(request): Json<OptimizeLayoutRequest>,
) -> ApiResult<Json<Value>> {
    let strategy = match &request.strategy {
        Some(name) => LayoutStrategy::parse(name)
            .ok_or_else(|| ApiError::invalid_data(format!("unknown layout strategy '{}'", name)))?,
        None => LayoutStrategy::Grid,
    };

    let layout = state.layout_optimizer.optimize(
        &request.widgets,
        request.constraints.as_ref(),
        strategy,
    );
    let suggestions = state.layout_optimizer.suggest_improvements(&layout);

    Ok(Json(json!({
        "result": {
            "layout": layout,
            "suggestions": suggestions,
        }
    })))
}
