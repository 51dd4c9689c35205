//! Visualization intelligence: shape analysis, chart recommendation and
//! dashboard layout optimization

pub mod chart_recommender;
pub mod layout_optimizer;
pub mod models;
pub mod shape_analyzer;

pub use chart_recommender::{ChartRecommender, ChartRecommenderConfig};
pub use layout_optimizer::{LayoutOptimizer, LayoutOptimizerConfig};
pub use models::{
    CategoricalStats, ChartRecommendation, ChartType, DashboardLayout, DataCharacteristics,
    DataShape, DistributionType, GridPosition, GridSize, LayoutConstraints, LayoutStrategy,
    NumericStats, RecommendationContext, TemporalStats, VisualizationGoal, Widget,
    WidgetPlacement, WidgetPriority, WidgetSize,
};
pub use shape_analyzer::{ShapeAnalyzer, ShapeAnalyzerConfig};
