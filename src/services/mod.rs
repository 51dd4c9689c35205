//! Core services: the tabular frame plus the three analytical engines
//! and the upstream telemetry collaborator

pub mod frame;
pub mod patterns;
pub mod query;
pub mod upstream;
pub mod visualization;

pub use frame::{Column, Dtype, Frame};
pub use patterns::{PatternEngine, PatternEngineConfig};
pub use query::{QueryGenerator, QueryGeneratorConfig};
pub use upstream::{TelemetryBackend, TelemetryClient};
pub use visualization::{
    ChartRecommender, ChartRecommenderConfig, LayoutOptimizer, LayoutOptimizerConfig,
    ShapeAnalyzer, ShapeAnalyzerConfig,
};
