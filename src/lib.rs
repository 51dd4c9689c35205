//! Lumen
//!
//! Observability intelligence service: turns raw tabular telemetry and
//! natural-language questions into ranked patterns, cost-optimized
//! telemetry queries, and chart and dashboard recommendations.

use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use services::{
    ChartRecommender, ChartRecommenderConfig, LayoutOptimizer, PatternEngine,
    PatternEngineConfig, QueryGenerator, QueryGeneratorConfig, ShapeAnalyzer, TelemetryClient,
};

use services::patterns::Sensitivity;
use services::query::{OptimizerMode, QueryBuilderConfig, QueryOptimizerConfig};
use services::visualization::{LayoutOptimizerConfig, ShapeAnalyzerConfig};

/// Application shared state
///
/// The engines are stateless across requests apart from their bounded
/// internal caches, so a single `Arc` of each serves every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,

    pub pattern_engine: Arc<PatternEngine>,
    pub query_generator: Arc<QueryGenerator>,
    pub shape_analyzer: Arc<ShapeAnalyzer>,
    pub chart_recommender: Arc<ChartRecommender>,
    pub layout_optimizer: Arc<LayoutOptimizer>,

    pub telemetry_client: Arc<TelemetryClient>,
}

impl AppState {
    /// Wire the engines from configuration
    pub fn from_config(config: Config) -> Self {
        let pattern_engine = Arc::new(PatternEngine::new(PatternEngineConfig {
            parallel_execution: true,
            max_workers: config.server.worker_pool_size,
            confidence_threshold: config.patterns.min_confidence,
            pattern_limit: config.patterns.pattern_limit,
            cache_enabled: config.patterns.enable_caching,
            cache_size: config.patterns.cache_size,
            sensitivity: Sensitivity::default(),
            deadline: Some(Duration::from_secs(config.performance.request_timeout_secs)),
            categorical_column_limit: 50,
            enable_pattern_detection: config.patterns.enable_pattern_detection,
            enable_anomaly_detection: config.patterns.enable_anomaly_detection,
        }));

        let query_generator = Arc::new(QueryGenerator::new(QueryGeneratorConfig {
            cache_size: config.query.cache_size,
            history_size: config.query.history_size,
            enable_caching: config.query.enable_caching,
            builder: QueryBuilderConfig::default(),
            optimizer: QueryOptimizerConfig {
                mode: OptimizerMode::parse(&config.query.optimizer_mode),
                aggressive: false,
            },
        }));

        let telemetry_client = Arc::new(TelemetryClient::new(config.upstream.clone()));

        Self {
            pattern_engine,
            query_generator,
            shape_analyzer: Arc::new(ShapeAnalyzer::new(ShapeAnalyzerConfig::default())),
            chart_recommender: Arc::new(ChartRecommender::default()),
            layout_optimizer: Arc::new(LayoutOptimizer::new(LayoutOptimizerConfig::default())),
            telemetry_client,
            config,
        }
    }
}
