use axum::Json;
use std::collections::BTreeMap;

use crate::models::HealthResponse;

/// Health check for the service and its engines
#[utoipa::path(
    get,
    path = "/v1/health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    ),
    tag = "Service"
)]
pub async fn health_check() -> Json<HealthResponse> {
    let mut components = BTreeMap::new();
    components.insert("pattern_engine".to_string(), "ready".to_string());
    components.insert("query_generator".to_string(), "ready".to_string());
    components.insert("visualization".to_string(), "ready".to_string());

    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        components,
    })
}
