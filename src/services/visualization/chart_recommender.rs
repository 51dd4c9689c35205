//! Rule-driven chart recommender
//!
//! A fixed catalog of rules maps data-shape conditions and the caller's
//! visualization goal onto chart types. Every recommendation comes out
//! fully configured: axes, grouping and per-chart settings.

use serde_json::json;

use super::models::{
    ChartRecommendation, ChartType, DataShape, DistributionType, RecommendationContext,
    VisualizationGoal,
};
use crate::services::frame::Dtype;

/// Conditions a rule checks against the shape; unset fields always pass
#[derive(Debug, Clone, Copy, Default)]
struct RuleConditions {
    has_time_series: Option<bool>,
    /// Inclusive range over primary metric count
    metric_count: Option<(usize, usize)>,
    /// Inclusive range over row count
    data_points: Option<(usize, usize)>,
    has_continuous_numeric: bool,
    has_categorical: bool,
    /// Inclusive range over the largest categorical cardinality
    category_count: Option<(usize, usize)>,
    has_correlation: bool,
    distribution_focus: bool,
    has_grouping: bool,
    group_count: Option<(usize, usize)>,
    has_threshold: bool,
    high_cardinality: bool,
    multiple_attributes: bool,
    is_process_data: bool,
}

struct RecommendationRule {
    name: &'static str,
    conditions: RuleConditions,
    chart_types: &'static [ChartType],
    goal: VisualizationGoal,
    confidence_base: f64,
}

const MAX: usize = usize::MAX;

/// The fixed recommendation catalog
fn rule_catalog() -> Vec<RecommendationRule> {
    vec![
        RecommendationRule {
            name: "timeseries_single_metric",
            conditions: RuleConditions {
                has_time_series: Some(true),
                metric_count: Some((1, 1)),
                data_points: Some((10, MAX)),
                ..RuleConditions::default()
            },
            chart_types: &[ChartType::TimeseriesLine, ChartType::TimeseriesArea],
            goal: VisualizationGoal::Trend,
            confidence_base: 0.9,
        },
        RecommendationRule {
            name: "timeseries_multiple_metrics",
            conditions: RuleConditions {
                has_time_series: Some(true),
                metric_count: Some((2, 5)),
                data_points: Some((10, MAX)),
                ..RuleConditions::default()
            },
            chart_types: &[ChartType::TimeseriesLine, ChartType::TimeseriesStacked],
            goal: VisualizationGoal::Comparison,
            confidence_base: 0.85,
        },
        RecommendationRule {
            name: "distribution_continuous",
            conditions: RuleConditions {
                has_continuous_numeric: true,
                distribution_focus: true,
                ..RuleConditions::default()
            },
            chart_types: &[ChartType::Histogram, ChartType::BoxPlot],
            goal: VisualizationGoal::Distribution,
            confidence_base: 0.9,
        },
        RecommendationRule {
            name: "distribution_violin",
            conditions: RuleConditions {
                has_continuous_numeric: true,
                has_grouping: true,
                group_count: Some((2, 10)),
                ..RuleConditions::default()
            },
            chart_types: &[ChartType::Violin],
            goal: VisualizationGoal::Distribution,
            confidence_base: 0.8,
        },
        RecommendationRule {
            name: "comparison_categorical",
            conditions: RuleConditions {
                has_categorical: true,
                category_count: Some((2, 20)),
                metric_count: Some((1, 1)),
                ..RuleConditions::default()
            },
            chart_types: &[ChartType::Bar, ChartType::Pie],
            goal: VisualizationGoal::Comparison,
            confidence_base: 0.85,
        },
        RecommendationRule {
            name: "comparison_stacked",
            conditions: RuleConditions {
                has_categorical: true,
                category_count: Some((2, 10)),
                metric_count: Some((2, 5)),
                ..RuleConditions::default()
            },
            chart_types: &[ChartType::StackedBar],
            goal: VisualizationGoal::Composition,
            confidence_base: 0.8,
        },
        RecommendationRule {
            name: "correlation_scatter",
            conditions: RuleConditions {
                has_correlation: true,
                metric_count: Some((2, 2)),
                ..RuleConditions::default()
            },
            chart_types: &[ChartType::Scatter],
            goal: VisualizationGoal::Correlation,
            confidence_base: 0.9,
        },
        RecommendationRule {
            name: "correlation_heatmap",
            conditions: RuleConditions {
                has_correlation: true,
                metric_count: Some((3, MAX)),
                ..RuleConditions::default()
            },
            chart_types: &[ChartType::Heatmap],
            goal: VisualizationGoal::Correlation,
            confidence_base: 0.85,
        },
        RecommendationRule {
            name: "single_value_billboard",
            conditions: RuleConditions {
                metric_count: Some((1, 1)),
                data_points: Some((1, 1)),
                ..RuleConditions::default()
            },
            chart_types: &[ChartType::Billboard],
            goal: VisualizationGoal::Comparison,
            confidence_base: 0.95,
        },
        RecommendationRule {
            name: "single_value_gauge",
            conditions: RuleConditions {
                metric_count: Some((1, 1)),
                data_points: Some((1, 1)),
                has_threshold: true,
                ..RuleConditions::default()
            },
            chart_types: &[ChartType::Gauge, ChartType::Bullet],
            goal: VisualizationGoal::Deviation,
            confidence_base: 0.9,
        },
        RecommendationRule {
            name: "table_detailed",
            conditions: RuleConditions {
                high_cardinality: true,
                multiple_attributes: true,
                ..RuleConditions::default()
            },
            chart_types: &[ChartType::Table],
            goal: VisualizationGoal::Ranking,
            confidence_base: 0.8,
        },
        RecommendationRule {
            name: "funnel_process",
            conditions: RuleConditions {
                is_process_data: true,
                ..RuleConditions::default()
            },
            chart_types: &[ChartType::Funnel],
            goal: VisualizationGoal::Composition,
            confidence_base: 0.85,
        },
    ]
}

#[derive(Debug, Clone)]
pub struct ChartRecommenderConfig {
    pub max_recommendations: usize,
}

impl Default for ChartRecommenderConfig {
    fn default() -> Self {
        Self { max_recommendations: 5 }
    }
}

pub struct ChartRecommender {
    config: ChartRecommenderConfig,
    rules: Vec<RecommendationRule>,
}

impl ChartRecommender {
    pub fn new(config: ChartRecommenderConfig) -> Self {
        Self { config, rules: rule_catalog() }
    }

    pub fn recommend(
        &self,
        shape: &DataShape,
        context: Option<&RecommendationContext>,
    ) -> Vec<ChartRecommendation> {
        let default_context = RecommendationContext::default();
        let context = context.unwrap_or(&default_context);
        let goal = context
            .visualization_goal
            .unwrap_or_else(|| infer_goal(shape));

        tracing::info!("Recommending charts for goal: {:?}", goal);

        let mut recommendations: Vec<ChartRecommendation> = self
            .rules
            .iter()
            .filter(|rule| rule.goal == goal && rule_applies(&rule.conditions, shape, context, goal))
            .map(|rule| self.create_recommendation(rule, shape, context))
            .collect();

        recommendations.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        recommendations.retain(|r| !context.excluded_charts.contains(&r.chart_type));
        recommendations.truncate(self.config.max_recommendations);

        if recommendations.is_empty() {
            recommendations = fallback_recommendations(shape);
        }
        recommendations
    }

    fn create_recommendation(
        &self,
        rule: &RecommendationRule,
        shape: &DataShape,
        context: &RecommendationContext,
    ) -> ChartRecommendation {
        let chart_type = rule
            .chart_types
            .iter()
            .copied()
            .find(|ct| context.preferred_charts.contains(ct))
            .or_else(|| rule.chart_types.first().copied())
            .unwrap_or(ChartType::Table);

        let mut confidence = rule.confidence_base;
        if context.preferred_charts.contains(&chart_type) {
            confidence *= 1.1;
        }
        if shape.row_count > context.max_data_points
            && matches!(chart_type, ChartType::Scatter | ChartType::Table)
        {
            confidence *= 0.8;
        }
        if shape.data_quality_score > 0.9 {
            confidence *= 1.05;
        } else if shape.data_quality_score < 0.5 {
            confidence *= 0.9;
        }
        confidence = confidence.clamp(0.1, 0.99);

        let mut recommendation = ChartRecommendation {
            chart_type,
            confidence,
            reasoning: build_reasoning(shape, chart_type),
            x_axis: None,
            y_axis: Vec::new(),
            group_by: None,
            settings: serde_json::Map::new(),
            advantages: Vec::new(),
            limitations: Vec::new(),
            use_cases: Vec::new(),
        };
        configure_chart(&mut recommendation, shape);
        add_pros_cons(&mut recommendation, shape);
        add_use_cases(&mut recommendation);
        recommendation
    }
}

impl Default for ChartRecommender {
    fn default() -> Self {
        Self::new(ChartRecommenderConfig::default())
    }
}

fn rule_applies(
    conditions: &RuleConditions,
    shape: &DataShape,
    context: &RecommendationContext,
    goal: VisualizationGoal,
) -> bool {
    if let Some(required) = conditions.has_time_series
        && required != shape.has_time_series
    {
        return false;
    }
    if let Some((lo, hi)) = conditions.metric_count {
        let count = shape.primary_metrics.len();
        if count < lo || count > hi {
            return false;
        }
    }
    if let Some((lo, hi)) = conditions.data_points {
        if shape.row_count < lo || shape.row_count > hi {
            return false;
        }
    }
    if conditions.has_continuous_numeric
        && !shape
            .column_characteristics
            .iter()
            .any(|c| c.data_type == Dtype::NumericContinuous)
    {
        return false;
    }
    if conditions.has_categorical && !shape.column_characteristics.iter().any(|c| c.is_categorical())
    {
        return false;
    }
    if let Some((lo, hi)) = conditions.category_count {
        let max_cardinality = shape
            .column_characteristics
            .iter()
            .filter(|c| c.is_categorical())
            .map(|c| c.cardinality)
            .max();
        if let Some(max_cardinality) = max_cardinality
            && (max_cardinality < lo || max_cardinality > hi)
        {
            return false;
        }
    }
    if conditions.has_correlation
        && !shape
            .column_characteristics
            .iter()
            .any(|c| !c.correlations.is_empty())
    {
        return false;
    }
    if conditions.distribution_focus {
        let interesting = goal == VisualizationGoal::Distribution
            || shape.column_characteristics.iter().any(|c| {
                c.data_type == Dtype::NumericContinuous
                    && c.numeric_stats
                        .as_ref()
                        .and_then(|s| s.distribution)
                        .is_some_and(|d| d != DistributionType::Unknown)
            });
        if !interesting {
            return false;
        }
    }
    if conditions.has_grouping && shape.primary_dimensions.is_empty() {
        return false;
    }
    if let Some((lo, hi)) = conditions.group_count {
        let group_cardinality = shape
            .primary_dimensions
            .iter()
            .filter_map(|d| shape.characteristics(d))
            .map(|c| c.cardinality)
            .max()
            .unwrap_or(0);
        if group_cardinality < lo || group_cardinality > hi {
            return false;
        }
    }
    if conditions.has_threshold && !context.has_threshold {
        return false;
    }
    if conditions.high_cardinality
        && !shape
            .column_characteristics
            .iter()
            .any(|c| c.is_categorical() && c.cardinality > 20)
    {
        return false;
    }
    if conditions.multiple_attributes && shape.column_count <= 3 {
        return false;
    }
    if conditions.is_process_data {
        let process_like = shape.column_characteristics.iter().any(|c| {
            let lower = c.name.to_lowercase();
            lower.contains("step") || lower.contains("stage") || lower.contains("funnel")
        });
        if !process_like {
            return false;
        }
    }
    true
}

/// Goal inference ladder: time series, multiple metrics, strong
/// correlation, metric plus dimension, then comparison
fn infer_goal(shape: &DataShape) -> VisualizationGoal {
    if shape.has_time_series {
        return VisualizationGoal::Trend;
    }
    if shape.primary_metrics.len() > 1 {
        return VisualizationGoal::Comparison;
    }
    if shape
        .column_characteristics
        .iter()
        .any(|c| c.correlations.values().any(|r| r.abs() > 0.7))
    {
        return VisualizationGoal::Correlation;
    }
    if !shape.primary_dimensions.is_empty() && shape.primary_metrics.len() == 1 {
        return VisualizationGoal::Ranking;
    }
    VisualizationGoal::Comparison
}

fn configure_chart(recommendation: &mut ChartRecommendation, shape: &DataShape) {
    match recommendation.chart_type {
        ChartType::TimeseriesLine | ChartType::TimeseriesArea | ChartType::TimeseriesStacked => {
            recommendation.x_axis =
                Some(shape.time_column.clone().unwrap_or_else(|| "timestamp".to_string()));
            recommendation.y_axis = shape.primary_metrics.iter().take(3).cloned().collect();
            if shape.row_count > 1000 {
                recommendation.settings.insert("bucket_size".into(), json!("auto"));
            }
            if recommendation.chart_type == ChartType::TimeseriesStacked {
                recommendation.settings.insert("stack_type".into(), json!("normal"));
            }
        },
        ChartType::Bar | ChartType::StackedBar => {
            recommendation.x_axis = shape.primary_dimensions.first().cloned();
            recommendation.y_axis = shape.primary_metrics.iter().take(1).cloned().collect();
            if let Some(x_axis) = &recommendation.x_axis
                && shape.characteristics(x_axis).is_some_and(|c| c.cardinality > 10)
            {
                recommendation.settings.insert("orientation".into(), json!("horizontal"));
            }
        },
        ChartType::Scatter => {
            // The two most correlated metrics make the best axes
            if let Some(first) = shape.primary_metrics.first() {
                recommendation.x_axis = Some(first.clone());
                let best = shape
                    .characteristics(first)
                    .map(|c| &c.correlations)
                    .and_then(|correlations| {
                        correlations
                            .iter()
                            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
                            .map(|(name, _)| name.clone())
                    });
                recommendation.y_axis = match best {
                    Some(other) => vec![other],
                    None => shape.primary_metrics.iter().skip(1).take(1).cloned().collect(),
                };
            }
        },
        ChartType::Pie => {
            recommendation.group_by = shape.primary_dimensions.first().cloned();
            recommendation.y_axis = shape.primary_metrics.iter().take(1).cloned().collect();
            recommendation.settings.insert("max_slices".into(), json!(8));
            recommendation.settings.insert("other_bucket".into(), json!(true));
        },
        ChartType::Heatmap => {
            let dims: Vec<String> = shape.primary_dimensions.iter().take(2).cloned().collect();
            if dims.len() >= 2 {
                recommendation.x_axis = Some(dims[0].clone());
                recommendation.group_by = Some(dims[1].clone());
            }
            recommendation.y_axis = shape.primary_metrics.iter().take(1).cloned().collect();
        },
        ChartType::Billboard | ChartType::Gauge | ChartType::Bullet => {
            recommendation.y_axis = shape.primary_metrics.iter().take(1).cloned().collect();
            recommendation.settings.insert("show_comparison".into(), json!(true));
            recommendation
                .settings
                .insert("comparison_type".into(), json!("previous_period"));
        },
        ChartType::Table => {
            let columns: Vec<String> = shape
                .primary_dimensions
                .iter()
                .take(3)
                .chain(shape.primary_metrics.iter().take(5))
                .cloned()
                .collect();
            recommendation.settings.insert("columns".into(), json!(columns));
            recommendation.settings.insert("sortable".into(), json!(true));
            recommendation
                .settings
                .insert("pagination".into(), json!(shape.row_count > 100));
        },
        ChartType::Histogram | ChartType::BoxPlot | ChartType::Violin => {
            let continuous = shape
                .column_characteristics
                .iter()
                .find(|c| c.data_type == Dtype::NumericContinuous)
                .map(|c| c.name.clone());
            recommendation.y_axis = continuous.into_iter().collect();
            if recommendation.chart_type == ChartType::Violin {
                recommendation.group_by = shape.primary_dimensions.first().cloned();
            }
        },
        _ => {},
    }
}

fn build_reasoning(shape: &DataShape, chart_type: ChartType) -> String {
    let mut reasons: Vec<String> = Vec::new();

    if shape.has_time_series {
        reasons.push(format!(
            "Data contains time series with {} data points",
            shape.row_count
        ));
    }
    match shape.primary_metrics.len() {
        0 => {},
        1 => reasons.push(format!("Single metric '{}' to visualize", shape.primary_metrics[0])),
        n => reasons.push(format!("{} metrics available for comparison", n)),
    }
    if !shape.primary_dimensions.is_empty() {
        reasons.push(format!(
            "{} dimensions available for grouping",
            shape.primary_dimensions.len()
        ));
    }

    for char in &shape.column_characteristics {
        if let Some(distribution) = char.numeric_stats.as_ref().and_then(|s| s.distribution)
            && distribution != DistributionType::Unknown
        {
            reasons.push(format!("'{}' shows {:?} distribution", char.name, distribution));
            break;
        }
    }

    let strong: Vec<String> = shape
        .column_characteristics
        .iter()
        .flat_map(|c| {
            c.correlations
                .iter()
                .filter(|(_, r)| r.abs() > 0.7)
                .map(move |(other, r)| format!("'{}' and '{}' (r={:.2})", c.name, other, r))
        })
        .take(2)
        .collect();
    if !strong.is_empty() {
        reasons.push(format!("Strong correlations found: {}", strong.join(", ")));
    }

    let chart_reason = match chart_type {
        ChartType::TimeseriesLine | ChartType::Line => "Best for showing trends over time",
        ChartType::Bar => "Ideal for comparing categories",
        ChartType::Pie => "Shows composition of the whole",
        ChartType::Scatter => "Reveals relationships between variables",
        ChartType::Heatmap => "Displays patterns across two dimensions",
        ChartType::Histogram => "Shows distribution of values",
        ChartType::Billboard => "Highlights a single important metric",
        ChartType::Table => "Provides detailed view of all data",
        _ => "",
    };
    if !chart_reason.is_empty() {
        reasons.push(chart_reason.to_string());
    }

    reasons.join(". ")
}

fn add_pros_cons(recommendation: &mut ChartRecommendation, shape: &DataShape) {
    let (advantages, limitations): (&[&str], &[&str]) = match recommendation.chart_type {
        ChartType::TimeseriesLine | ChartType::Line => (
            &["Excellent for showing trends", "Easy to read and understand", "Supports multiple series"],
            &["Can become cluttered with many lines", "Not suitable for categorical comparisons"],
        ),
        ChartType::Bar | ChartType::StackedBar => (
            &["Clear comparison between categories", "Shows exact values well"],
            &["Limited to reasonable number of categories", "Not ideal for continuous data"],
        ),
        ChartType::Pie => (
            &["Shows part-to-whole relationships", "Easy to understand percentages"],
            &["Limited to single data series", "Hard to compare similar-sized slices"],
        ),
        ChartType::Scatter => (
            &["Shows relationships between variables", "Identifies clusters and outliers"],
            &["Can be hard to read with many points", "Requires numeric data"],
        ),
        ChartType::Heatmap => (
            &["Visualizes patterns in large datasets", "Compact representation"],
            &["Color interpretation can vary", "Limited to 2-3 dimensions"],
        ),
        ChartType::Table => (
            &["Shows exact values", "Supports sorting and filtering"],
            &["Not visually engaging", "Patterns hard to spot"],
        ),
        ChartType::Billboard => (
            &["Clear metric display", "Good for dashboards"],
            &["Single metric only"],
        ),
        _ => (&[], &[]),
    };
    recommendation.advantages = advantages.iter().map(|s| s.to_string()).collect();
    recommendation.limitations = limitations.iter().map(|s| s.to_string()).collect();

    if shape.data_quality_score < 0.7 {
        recommendation
            .limitations
            .push("Data quality issues may affect accuracy".to_string());
    }
    if shape.row_count > 10_000
        && matches!(recommendation.chart_type, ChartType::Scatter | ChartType::TimeseriesLine)
    {
        recommendation
            .limitations
            .push("Large dataset may require sampling or aggregation".to_string());
    }
}

fn add_use_cases(recommendation: &mut ChartRecommendation) {
    let use_cases: &[&str] = match recommendation.chart_type {
        ChartType::TimeseriesLine | ChartType::Line => &[
            "Monitoring metrics over time",
            "Comparing trends between different series",
            "Identifying seasonal patterns",
        ],
        ChartType::Bar => &["Comparing performance across teams/services", "Ranking by a metric"],
        ChartType::Pie => &["Showing market share", "Displaying resource allocation"],
        ChartType::Scatter => &["Analyzing correlation between metrics", "Identifying outliers"],
        ChartType::Heatmap => &["Finding patterns in time-based data", "Correlation matrices"],
        ChartType::Histogram => &["Understanding data distribution", "Setting thresholds"],
        ChartType::Billboard => &["KPI dashboards", "Real-time monitoring"],
        ChartType::Table => &["Detailed drill-downs", "Multi-attribute analysis"],
        _ => &[],
    };
    recommendation.use_cases = use_cases.iter().map(|s| s.to_string()).collect();
}

/// Table plus billboard when no rule fires
fn fallback_recommendations(shape: &DataShape) -> Vec<ChartRecommendation> {
    let mut recommendations = vec![ChartRecommendation {
        chart_type: ChartType::Table,
        confidence: 0.5,
        reasoning: "Table view provides detailed access to all data".to_string(),
        x_axis: None,
        y_axis: Vec::new(),
        group_by: None,
        settings: serde_json::Map::new(),
        advantages: vec!["Shows all data".to_string(), "Sortable".to_string()],
        limitations: vec!["Not visually engaging".to_string()],
        use_cases: vec!["Data exploration".to_string(), "Detailed analysis".to_string()],
    }];

    if let Some(metric) = shape.primary_metrics.first() {
        recommendations.push(ChartRecommendation {
            chart_type: ChartType::Billboard,
            confidence: 0.4,
            reasoning: "Billboard highlights key metrics".to_string(),
            x_axis: None,
            y_axis: vec![metric.clone()],
            group_by: None,
            settings: serde_json::Map::new(),
            advantages: vec!["Clear metric display".to_string()],
            limitations: vec!["Single metric only".to_string()],
            use_cases: vec!["KPI monitoring".to_string()],
        });
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::super::shape_analyzer::ShapeAnalyzer;
    use super::*;
    use crate::services::frame::Frame;
    use serde_json::{Value, json};

    fn timeseries_shape() -> DataShape {
        let rows: Vec<Value> = (0..200)
            .map(|i| {
                json!({
                    "timestamp": format!("2024-01-01 {:02}:{:02}:00", (i / 60) % 24, i % 60),
                    "latency": 100.0 + (i % 17) as f64 * 3.0,
                })
            })
            .collect();
        let frame = Frame::from_json(&json!(rows)).unwrap();
        ShapeAnalyzer::default().analyze(&frame, None)
    }

    #[test]
    fn test_timeseries_recommended_for_time_data() {
        let shape = timeseries_shape();
        let recommendations = ChartRecommender::default().recommend(&shape, None);

        assert!(!recommendations.is_empty());
        assert_eq!(recommendations[0].chart_type, ChartType::TimeseriesLine);
        assert_eq!(recommendations[0].x_axis.as_deref(), Some("timestamp"));
        assert_eq!(recommendations[0].y_axis, vec!["latency"]);
    }

    #[test]
    fn test_confidence_sorted_and_bounded() {
        let shape = timeseries_shape();
        let recommendations = ChartRecommender::default().recommend(&shape, None);

        for pair in recommendations.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
        for rec in &recommendations {
            assert!((0.1..=0.99).contains(&rec.confidence));
        }
        assert!(recommendations.len() <= 5);
    }

    #[test]
    fn test_excluded_charts_filtered() {
        let shape = timeseries_shape();
        let context = RecommendationContext {
            visualization_goal: Some(VisualizationGoal::Trend),
            excluded_charts: vec![ChartType::TimeseriesLine],
            ..RecommendationContext::default()
        };
        let recommendations = ChartRecommender::default().recommend(&shape, Some(&context));
        assert!(
            recommendations
                .iter()
                .all(|r| r.chart_type != ChartType::TimeseriesLine)
        );
    }

    #[test]
    fn test_preferred_chart_boosts_confidence() {
        let shape = timeseries_shape();
        let preferred = RecommendationContext {
            visualization_goal: Some(VisualizationGoal::Trend),
            preferred_charts: vec![ChartType::TimeseriesArea],
            ..RecommendationContext::default()
        };
        let recommendations = ChartRecommender::default().recommend(&shape, Some(&preferred));
        assert_eq!(recommendations[0].chart_type, ChartType::TimeseriesArea);
    }

    #[test]
    fn test_fallback_when_nothing_fires() {
        let shape = DataShape {
            row_count: 5,
            column_count: 1,
            column_characteristics: vec![],
            has_time_series: false,
            time_column: None,
            primary_metrics: vec![],
            primary_dimensions: vec![],
            data_quality_score: 1.0,
            warnings: vec![],
        };
        let recommendations = ChartRecommender::default().recommend(&shape, None);
        assert_eq!(recommendations[0].chart_type, ChartType::Table);
    }

    #[test]
    fn test_goal_inference_correlation() {
        let mut shape = timeseries_shape();
        shape.has_time_series = false;
        shape.time_column = None;
        shape.primary_metrics = vec!["latency".to_string()];
        shape.column_characteristics[1]
            .correlations
            .insert("throughput".to_string(), 0.93);
        assert_eq!(infer_goal(&shape), VisualizationGoal::Correlation);
    }

    #[test]
    fn test_pie_settings_cap_slices() {
        let shape = DataShape {
            row_count: 50,
            column_count: 2,
            column_characteristics: vec![
                DataCharacteristicsFixture::categorical("service", 12),
                DataCharacteristicsFixture::numeric("count"),
            ],
            has_time_series: false,
            time_column: None,
            primary_metrics: vec!["count".to_string()],
            primary_dimensions: vec!["service".to_string()],
            data_quality_score: 1.0,
            warnings: vec![],
        };
        let context = RecommendationContext {
            visualization_goal: Some(VisualizationGoal::Comparison),
            preferred_charts: vec![ChartType::Pie],
            ..RecommendationContext::default()
        };
        let recommendations = ChartRecommender::default().recommend(&shape, Some(&context));
        let pie = recommendations
            .iter()
            .find(|r| r.chart_type == ChartType::Pie)
            .expect("pie recommendation");
        assert_eq!(pie.settings["max_slices"], json!(8));
        assert_eq!(pie.group_by.as_deref(), Some("service"));
    }

    struct DataCharacteristicsFixture;
    impl DataCharacteristicsFixture {
        fn categorical(name: &str, cardinality: usize) -> super::super::models::DataCharacteristics {
            super::super::models::DataCharacteristics {
                name: name.to_string(),
                data_type: Dtype::CategoricalNominal,
                cardinality,
                null_percentage: 0.0,
                unique_percentage: cardinality as f64 / 50.0,
                numeric_stats: None,
                temporal_stats: None,
                categorical_stats: None,
                correlations: Default::default(),
            }
        }

        fn numeric(name: &str) -> super::super::models::DataCharacteristics {
            super::super::models::DataCharacteristics {
                name: name.to_string(),
                data_type: Dtype::NumericContinuous,
                cardinality: 40,
                null_percentage: 0.0,
                unique_percentage: 0.8,
                numeric_stats: None,
                temporal_stats: None,
                categorical_stats: None,
                correlations: Default::default(),
            }
        }
    }
}
