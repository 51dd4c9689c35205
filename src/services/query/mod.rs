//! Query pipeline: natural language to optimized telemetry queries

pub mod builder;
pub mod generator;
pub mod intent_parser;
pub mod models;
pub mod optimizer;

pub use builder::{QueryBuilder, QueryBuilderConfig, escape_field, unescape_field, validate_query};
pub use generator::{QueryGenerator, QueryGeneratorConfig};
pub use intent_parser::IntentParser;
pub use models::{
    AggregationType, EntityKind, FilterOperator, IntentType, OrderDirection, QueryContext,
    QueryEntity, QueryFilter, QueryIntent, QueryResult, QueryType, SchemaInfo, TimeRange,
    TimeRangeType,
};
pub use optimizer::{OptimizerMode, QueryOptimizer, QueryOptimizerConfig};
