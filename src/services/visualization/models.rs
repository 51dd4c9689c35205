//! Visualization models: data shapes, chart recommendations, widgets
//! and dashboard layouts

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::services::frame::Dtype;

/// Distribution labels attached to numeric columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionType {
    Normal,
    SkewedLeft,
    SkewedRight,
    Bimodal,
    Uniform,
    Exponential,
    PowerLaw,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub distribution: Option<DistributionType>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub outlier_percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TemporalStats {
    /// RFC 3339 bounds of the column
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub time_range: Option<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub frequency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CategoricalStats {
    /// Top categories with their share of rows
    #[serde(default)]
    pub top_categories: Vec<(String, f64)>,
    /// "single_value" | "dominant" | "balanced" | "imbalanced"
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub distribution: Option<String>,
}

/// Per-column characteristics produced by the shape analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataCharacteristics {
    pub name: String,
    pub data_type: Dtype,
    pub cardinality: usize,
    pub null_percentage: f64,
    pub unique_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub numeric_stats: Option<NumericStats>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub temporal_stats: Option<TemporalStats>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub categorical_stats: Option<CategoricalStats>,
    /// Other numeric columns with |Pearson r| above the analyzer threshold
    #[serde(default)]
    pub correlations: BTreeMap<String, f64>,
}

impl DataCharacteristics {
    pub fn is_numeric(&self) -> bool {
        self.data_type.is_numeric()
    }

    pub fn is_categorical(&self) -> bool {
        self.data_type.is_categorical()
    }
}

/// Overall shape of a dataset, the input to chart recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataShape {
    pub row_count: usize,
    pub column_count: usize,
    #[serde(rename = "columns")]
    pub column_characteristics: Vec<DataCharacteristics>,
    pub has_time_series: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub time_column: Option<String>,
    #[serde(default)]
    pub primary_metrics: Vec<String>,
    #[serde(default)]
    pub primary_dimensions: Vec<String>,
    #[serde(default)]
    pub data_quality_score: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl DataShape {
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.column_characteristics
            .iter()
            .filter(|c| c.is_numeric())
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn categorical_columns(&self) -> Vec<&str> {
        self.column_characteristics
            .iter()
            .filter(|c| c.is_categorical())
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn characteristics(&self, name: &str) -> Option<&DataCharacteristics> {
        self.column_characteristics.iter().find(|c| c.name == name)
    }
}

/// Chart types available on the dashboarding surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Line,
    Area,
    Bar,
    StackedBar,
    Pie,
    Table,
    Billboard,
    Histogram,
    Heatmap,
    Scatter,
    Funnel,
    TimeseriesLine,
    TimeseriesArea,
    TimeseriesStacked,
    BoxPlot,
    Violin,
    Gauge,
    Bullet,
    Sparkline,
    Markdown,
}

/// What the visualization is supposed to communicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationGoal {
    Comparison,
    Trend,
    Distribution,
    Relationship,
    Composition,
    Ranking,
    Deviation,
    Correlation,
    Geographic,
}

/// A fully configured chart recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartRecommendation {
    pub chart_type: ChartType,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub x_axis: Option<String>,
    #[serde(default)]
    pub y_axis: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub advantages: Vec<String>,
    #[serde(default)]
    pub limitations: Vec<String>,
    #[serde(default)]
    pub use_cases: Vec<String>,
}

/// Context for chart recommendation
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationContext {
    #[serde(default)]
    pub visualization_goal: Option<VisualizationGoal>,
    #[serde(default)]
    pub preferred_charts: Vec<ChartType>,
    #[serde(default)]
    pub excluded_charts: Vec<ChartType>,
    #[serde(default = "default_max_data_points")]
    pub max_data_points: usize,
    #[serde(default)]
    pub has_threshold: bool,
}

impl Default for RecommendationContext {
    fn default() -> Self {
        Self {
            visualization_goal: None,
            preferred_charts: Vec::new(),
            excluded_charts: Vec::new(),
            max_data_points: default_max_data_points(),
            has_threshold: false,
        }
    }
}

fn default_max_data_points() -> usize {
    1000
}

/// Standard widget footprints in grid units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WidgetSize {
    Small,
    Medium,
    Large,
    Wide,
    Tall,
    Xlarge,
    FullWidth,
}

impl WidgetSize {
    pub fn width(self) -> usize {
        match self {
            WidgetSize::Small | WidgetSize::Tall => 1,
            WidgetSize::Medium | WidgetSize::Large => 2,
            WidgetSize::Wide | WidgetSize::Xlarge => 3,
            WidgetSize::FullWidth => 4,
        }
    }

    pub fn height(self) -> usize {
        match self {
            WidgetSize::Small | WidgetSize::Medium | WidgetSize::Wide | WidgetSize::FullWidth => 1,
            WidgetSize::Large | WidgetSize::Tall | WidgetSize::Xlarge => 2,
        }
    }

    pub fn area(self) -> usize {
        self.width() * self.height()
    }
}

/// Widget priority, highest first in placement order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WidgetPriority {
    Optional,
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl WidgetPriority {
    pub fn value(self) -> u8 {
        match self {
            WidgetPriority::Critical => 5,
            WidgetPriority::High => 4,
            WidgetPriority::Medium => 3,
            WidgetPriority::Low => 2,
            WidgetPriority::Optional => 1,
        }
    }
}

/// Dashboard widget definition as supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Widget {
    pub id: String,
    pub title: String,
    pub chart_type: ChartType,
    pub data_query: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size: Option<WidgetSize>,
    /// (x, y) in grid units, honored by the fixed strategy
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub position: Option<(usize, usize)>,
    #[serde(default)]
    pub priority: WidgetPriority,
    #[serde(default)]
    pub related_widgets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub min_size: Option<WidgetSize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_size: Option<WidgetSize>,
    #[serde(default)]
    pub fixed_position: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: usize,
    pub y: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub width: usize,
    pub height: usize,
}

/// A widget placed on the grid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetPlacement {
    pub widget_id: String,
    pub position: GridPosition,
    pub size: GridSize,
}

impl WidgetPlacement {
    pub fn new(widget_id: &str, x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            widget_id: widget_id.to_string(),
            position: GridPosition { x, y },
            size: GridSize { width, height },
        }
    }

    /// Whether two placements share any grid cell
    pub fn overlaps(&self, other: &WidgetPlacement) -> bool {
        let ax2 = self.position.x + self.size.width;
        let ay2 = self.position.y + self.size.height;
        let bx2 = other.position.x + other.size.width;
        let by2 = other.position.y + other.size.height;
        self.position.x < bx2
            && other.position.x < ax2
            && self.position.y < by2
            && other.position.y < ay2
    }
}

/// Placement strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LayoutStrategy {
    #[default]
    Grid,
    Masonry,
    Flow,
    Fixed,
    Responsive,
}

impl LayoutStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "grid" => Some(LayoutStrategy::Grid),
            "masonry" => Some(LayoutStrategy::Masonry),
            "flow" => Some(LayoutStrategy::Flow),
            "fixed" => Some(LayoutStrategy::Fixed),
            "responsive" => Some(LayoutStrategy::Responsive),
            _ => None,
        }
    }
}

/// Constraints applied during layout optimization
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConstraints {
    pub max_columns: usize,
    pub max_rows: usize,
    pub mobile_friendly: bool,
    pub tablet_friendly: bool,
}

impl Default for LayoutConstraints {
    fn default() -> Self {
        Self { max_columns: 4, max_rows: 20, mobile_friendly: false, tablet_friendly: true }
    }
}

/// Optimized dashboard layout with quality metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardLayout {
    pub strategy: LayoutStrategy,
    pub grid_columns: usize,
    pub grid_rows: usize,
    pub placements: Vec<WidgetPlacement>,
    pub space_utilization: f64,
    pub visual_balance: f64,
    pub relationship_score: f64,
    pub overall_score: f64,
    #[serde(default)]
    pub optimization_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_widget_size_dimensions() {
        assert_eq!((WidgetSize::Large.width(), WidgetSize::Large.height()), (2, 2));
        assert_eq!((WidgetSize::FullWidth.width(), WidgetSize::FullWidth.height()), (4, 1));
        assert_eq!(WidgetSize::Xlarge.area(), 6);
    }

    #[test]
    fn test_widget_deserialization_with_defaults() {
        let widget: Widget = serde_json::from_value(json!({
            "id": "w1",
            "title": "Throughput",
            "chart_type": "timeseries_line",
            "data_query": "SELECT count(*) FROM Transaction TIMESERIES",
            "size": "LARGE",
            "priority": "CRITICAL",
        }))
        .unwrap();

        assert_eq!(widget.size, Some(WidgetSize::Large));
        assert_eq!(widget.priority, WidgetPriority::Critical);
        assert!(!widget.fixed_position);
        assert!(widget.related_widgets.is_empty());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(WidgetPriority::Critical > WidgetPriority::Medium);
        assert_eq!(WidgetPriority::Critical.value(), 5);
        assert_eq!(WidgetPriority::Optional.value(), 1);
    }

    #[test]
    fn test_placement_overlap() {
        let a = WidgetPlacement::new("a", 0, 0, 2, 2);
        let b = WidgetPlacement::new("b", 1, 1, 2, 2);
        let c = WidgetPlacement::new("c", 2, 0, 1, 1);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_data_shape_deserializes_from_minimal_payload() {
        let shape: DataShape = serde_json::from_value(json!({
            "row_count": 10,
            "column_count": 1,
            "columns": [{
                "name": "value",
                "data_type": "numeric_continuous",
                "cardinality": 10,
                "null_percentage": 0.0,
                "unique_percentage": 1.0,
            }],
            "has_time_series": false,
        }))
        .unwrap();
        assert_eq!(shape.numeric_columns(), vec!["value"]);
        assert!(shape.primary_metrics.is_empty());
    }
}
