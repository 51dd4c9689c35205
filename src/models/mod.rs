//! Request and response types for the service surface
//!
//! JSON payloads mirror the engines' data model; every operation answers
//! `{"result": ...}` on success and `{"error": "..."}` on input-shape
//! failures.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::services::query::QueryContext;
use crate::services::visualization::{
    DataShape, LayoutConstraints, RecommendationContext, Widget,
};

/// Health check response
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub components: std::collections::BTreeMap<String, String>,
}

/// Pattern analysis request: frame data as a row array or column map
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzePatternsRequest {
    pub data: Value,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Detector subset: "statistical", "timeseries", "anomaly", "correlation"
    #[serde(default)]
    pub detector_types: Option<Vec<String>>,
    #[serde(default)]
    pub context: Option<Value>,
}

/// Query generation request
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateQueryRequest {
    pub natural_query: String,
    #[serde(default)]
    pub context: Option<QueryContext>,
}

/// Query suggestion request
#[derive(Debug, Clone, Deserialize)]
pub struct SuggestQueriesRequest {
    pub partial_query: String,
    #[serde(default)]
    pub context: Option<QueryContext>,
}

/// Query explanation request
#[derive(Debug, Clone, Deserialize)]
pub struct ExplainQueryRequest {
    pub query: String,
}

/// Chart recommendation request: a precomputed shape, or raw frame data
/// to run the shape analyzer on
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendChartsRequest {
    #[serde(default)]
    pub data_shape: Option<DataShape>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub context: Option<RecommendationContext>,
}

/// Layout optimization request
#[derive(Debug, Clone, Deserialize)]
pub struct OptimizeLayoutRequest {
    pub widgets: Vec<Widget>,
    #[serde(default)]
    pub constraints: Option<LayoutConstraints>,
    /// "grid" | "masonry" | "flow" | "fixed" | "responsive"
    #[serde(default)]
    pub strategy: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_analyze_request_accepts_minimal_payload() {
        let request: AnalyzePatternsRequest = serde_json::from_value(json!({
            "data": [{"value": 1.0}],
        }))
        .unwrap();
        assert!(request.columns.is_none());
        assert!(request.context.is_none());
    }

    #[test]
    fn test_recommend_request_with_shape_or_data() {
        let with_data: RecommendChartsRequest =
            serde_json::from_value(json!({"data": {"v": [1, 2, 3]}})).unwrap();
        assert!(with_data.data.is_some());
        assert!(with_data.data_shape.is_none());
    }

    #[test]
    fn test_layout_request_parses_widgets() {
        let request: OptimizeLayoutRequest = serde_json::from_value(json!({
            "widgets": [{
                "id": "w1",
                "title": "Errors",
                "chart_type": "billboard",
                "data_query": "SELECT count(*) FROM TransactionError",
            }],
            "strategy": "masonry",
        }))
        .unwrap();
        assert_eq!(request.widgets.len(), 1);
        assert_eq!(request.strategy.as_deref(), Some("masonry"));
    }
}
