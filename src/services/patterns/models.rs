//! Pattern detection models
//!
//! A pattern is a named, confidence-scored observation about one or more
//! columns, identified by (type, sorted column set, canonical parameter
//! JSON). Patterns are created inside a single detector invocation and
//! never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;

use crate::services::frame::Frame;

/// The closed set of detectable pattern types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    // Distribution
    NormalDistribution,
    SkewedDistribution,
    BimodalDistribution,
    UniformDistribution,
    PowerLaw,
    // Trend
    TrendLinear,
    TrendExponential,
    // Seasonality and cycles
    Seasonal,
    Cyclic,
    // Stationarity
    Stationary,
    NonStationary,
    // Outliers and anomalies
    Outlier,
    AnomalyPoint,
    AnomalyCollective,
    AnomalyContextual,
    ChangePoint,
    // Correlation
    LinearCorrelation,
    NonLinearCorrelation,
    LagCorrelation,
    NetworkCorrelation,
    Causality,
    // Data quality
    MissingData,
    DuplicateData,
    InconsistentData,
    Imbalance,
}

impl PatternType {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternType::NormalDistribution => "normal_distribution",
            PatternType::SkewedDistribution => "skewed_distribution",
            PatternType::BimodalDistribution => "bimodal_distribution",
            PatternType::UniformDistribution => "uniform_distribution",
            PatternType::PowerLaw => "power_law",
            PatternType::TrendLinear => "trend_linear",
            PatternType::TrendExponential => "trend_exponential",
            PatternType::Seasonal => "seasonal",
            PatternType::Cyclic => "cyclic",
            PatternType::Stationary => "stationary",
            PatternType::NonStationary => "non_stationary",
            PatternType::Outlier => "outlier",
            PatternType::AnomalyPoint => "anomaly_point",
            PatternType::AnomalyCollective => "anomaly_collective",
            PatternType::AnomalyContextual => "anomaly_contextual",
            PatternType::ChangePoint => "change_point",
            PatternType::LinearCorrelation => "linear_correlation",
            PatternType::NonLinearCorrelation => "non_linear_correlation",
            PatternType::LagCorrelation => "lag_correlation",
            PatternType::NetworkCorrelation => "network_correlation",
            PatternType::Causality => "causality",
            PatternType::MissingData => "missing_data",
            PatternType::DuplicateData => "duplicate_data",
            PatternType::InconsistentData => "inconsistent_data",
            PatternType::Imbalance => "imbalance",
        }
    }

    /// Fixed ranking weight used by the engine's composite score
    pub fn importance(self) -> f64 {
        match self {
            PatternType::AnomalyPoint => 1.0,
            PatternType::AnomalyCollective | PatternType::ChangePoint => 0.9,
            PatternType::TrendExponential | PatternType::MissingData => 0.8,
            PatternType::TrendLinear | PatternType::Seasonal | PatternType::LagCorrelation => 0.7,
            PatternType::LinearCorrelation | PatternType::NonLinearCorrelation => 0.6,
            PatternType::BimodalDistribution => 0.5,
            PatternType::SkewedDistribution => 0.4,
            PatternType::NormalDistribution => 0.3,
            _ => 0.5,
        }
    }
}

/// Estimated business impact of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    #[default]
    Medium,
    High,
}

impl Impact {
    pub fn weight(self) -> f64 {
        match self {
            Impact::High => 1.0,
            Impact::Medium => 0.5,
            Impact::Low => 0.2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Impact::Low => "low",
            Impact::Medium => "medium",
            Impact::High => "high",
        }
    }
}

/// Evidence supporting a detected pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternEvidence {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistical_tests: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_points: Option<Vec<Value>>,
}

impl PatternEvidence {
    pub fn new(description: impl Into<String>) -> Self {
        Self { description: description.into(), statistical_tests: None, data_points: None }
    }

    pub fn with_tests(mut self, tests: Map<String, Value>) -> Self {
        self.statistical_tests = Some(tests);
        self
    }

    pub fn with_data_points(mut self, points: Vec<Value>) -> Self {
        self.data_points = Some(points);
        self
    }
}

/// A detected pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub confidence: f64,
    pub description: String,
    pub columns: Vec<String>,
    pub parameters: Map<String, Value>,
    pub evidence: Vec<PatternEvidence>,
    pub detected_at: DateTime<Utc>,
    pub impact: Impact,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    pub visual_hints: Map<String, Value>,
}

impl Pattern {
    /// Deduplication key: (type, sorted column set, canonical parameters)
    pub fn dedup_key(&self) -> String {
        let mut columns = self.columns.clone();
        columns.sort();
        format!(
            "{}|{}|{}",
            self.pattern_type.as_str(),
            columns.join(","),
            canonical_json(&Value::Object(self.parameters.clone()))
        )
    }

    /// Numeric parameter lookup with a default fallback
    pub fn param_f64(&self, key: &str, default: f64) -> f64 {
        self.parameters.get(key).and_then(Value::as_f64).unwrap_or(default)
    }
}

/// Render a JSON value with object keys sorted at every level, so equal
/// parameter maps always produce equal strings
pub fn canonical_json(value: &Value) -> String {
    fn write(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(key).unwrap_or_default());
                    out.push(':');
                    write(&map[key.as_str()], out);
                }
                out.push('}');
            },
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            },
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}

/// Context passed into every detector invocation
///
/// Callers may send arbitrary extra keys; they are tolerated and kept in
/// `extra` rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatternContext {
    #[serde(default)]
    pub data_profile: Map<String, Value>,
    #[serde(default)]
    pub business_context: Option<Map<String, Value>>,
    #[serde(default)]
    pub detection_params: Option<Map<String, Value>>,
    #[serde(default)]
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Soft deadline observed cooperatively by detectors
    #[serde(skip)]
    pub soft_deadline: Option<Instant>,
}

impl PatternContext {
    /// Whether the soft deadline has passed
    pub fn deadline_expired(&self) -> bool {
        self.soft_deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Common knobs shared by all detectors
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Minimum non-null values per column before a detector engages
    pub min_samples: usize,
    /// Patterns below this confidence are not emitted
    pub confidence_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { min_samples: 30, confidence_threshold: 0.7 }
    }
}

/// Detector contract: a pure function from frame and columns to patterns
///
/// Implementations never panic across this boundary. On internal
/// numerical failure they return the patterns computed so far.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pattern types this detector may emit
    fn supported_types(&self) -> &'static [PatternType];

    fn detect(&self, frame: &Frame, columns: &[String], context: &PatternContext) -> Vec<Pattern>;
}

/// A high-level insight synthesised from the final pattern list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub insight_type: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub affected_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub recommendations: Vec<String>,
}

/// An actionable recommendation with its provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: String,
    pub category: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub actions: Vec<String>,
}

/// Executive summary of an analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_patterns: usize,
    pub pattern_types: Map<String, Value>,
    pub high_impact_count: usize,
    pub high_confidence_count: usize,
    pub columns_with_patterns: usize,
    pub data_characteristics: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Metadata attached to every analysis result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub analysis_time_seconds: f64,
    pub data_shape: (usize, usize),
    pub columns_analyzed: Vec<String>,
    pub detectors_used: Vec<String>,
    pub patterns_found: usize,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
}

/// Full result of a pattern engine run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub patterns: Vec<Pattern>,
    pub summary: AnalysisSummary,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<Recommendation>,
    pub metadata: AnalysisMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pattern_with_params(params: Value) -> Pattern {
        Pattern {
            pattern_type: PatternType::Outlier,
            confidence: 0.9,
            description: "test".to_string(),
            columns: vec!["b".to_string(), "a".to_string()],
            parameters: params.as_object().unwrap().clone(),
            evidence: vec![PatternEvidence::new("e")],
            detected_at: Utc::now(),
            impact: Impact::Medium,
            recommendations: vec![],
            visual_hints: Map::new(),
        }
    }

    #[test]
    fn test_dedup_key_ignores_column_order_and_key_order() {
        let p1 = pattern_with_params(json!({"x": 1, "y": 2}));
        let mut p2 = pattern_with_params(json!({"y": 2, "x": 1}));
        p2.columns = vec!["a".to_string(), "b".to_string()];

        assert_eq!(p1.dedup_key(), p2.dedup_key());
    }

    #[test]
    fn test_dedup_key_differs_on_parameters() {
        let p1 = pattern_with_params(json!({"x": 1}));
        let p2 = pattern_with_params(json!({"x": 2}));
        assert_ne!(p1.dedup_key(), p2.dedup_key());
    }

    #[test]
    fn test_canonical_json_nested() {
        let a = json!({"b": {"d": 1, "c": [1, 2]}, "a": true});
        assert_eq!(canonical_json(&a), r#"{"a":true,"b":{"c":[1,2],"d":1}}"#);
    }

    #[test]
    fn test_pattern_type_serialization() {
        assert_eq!(
            serde_json::to_string(&PatternType::AnomalyPoint).unwrap(),
            "\"anomaly_point\""
        );
        let parsed: PatternType = serde_json::from_str("\"trend_linear\"").unwrap();
        assert_eq!(parsed, PatternType::TrendLinear);
    }

    #[test]
    fn test_context_tolerates_unknown_fields() {
        let ctx: PatternContext = serde_json::from_value(json!({
            "data_profile": {},
            "data_source": "audit-log",
        }))
        .unwrap();
        assert_eq!(ctx.extra.get("data_source"), Some(&json!("audit-log")));
    }
}
